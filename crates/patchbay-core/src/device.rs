//! Audio devices as reported by a backend.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whether a device produces or consumes audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Source: microphones, line-ins, monitors
    Capture,
    /// Sink: speakers, headphones
    Playback,
}

impl DeviceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Playback => "playback",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "capture" => Some(Self::Capture),
            "playback" => Some(Self::Playback),
            _ => None,
        }
    }
}

/// A device exposed by an audio backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Backend that owns the device
    pub backend: String,
    /// Backend-specific device name
    pub name: String,
    /// Human readable name
    pub nice_name: String,
    /// Capture or playback
    pub device_type: DeviceType,
    /// Sample format, e.g. `s16le`
    pub format: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

/// A device discovered earlier and kept in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDevice {
    pub id: i64,
    #[serde(flatten)]
    pub device: AudioDevice,
    /// Whether the device was listed in the last discovery round
    pub active: bool,
    pub updated_at: String,
}

/// Device enumeration for one backend.
pub trait AudioBackend: Send + Sync {
    /// Backend identifier, e.g. `pulseaudio`.
    fn name(&self) -> &str;

    /// List the devices currently available.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be queried.
    fn list_devices(&self) -> Result<Vec<AudioDevice>>;
}
