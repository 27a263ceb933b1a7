//! Device listing for PulseAudio.

use std::sync::Arc;

use tracing::debug;

use patchbay_core::{AudioBackend, AudioDevice, DeviceType};

use crate::BACKEND_NAME;
use crate::pactl::{ModuleHost, PactlEntry};

/// Sources are listed as capture devices and sinks as playback devices.
pub struct PulseBackend {
    host: Arc<dyn ModuleHost>,
}

impl PulseBackend {
    #[must_use]
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self { host }
    }
}

fn to_device(entry: PactlEntry, device_type: DeviceType) -> AudioDevice {
    AudioDevice {
        backend: BACKEND_NAME.to_string(),
        nice_name: entry.name.clone(),
        name: entry.name,
        device_type,
        format: entry.sample_spec.format,
        sample_rate: entry.sample_spec.rate,
        channels: entry.sample_spec.channels,
    }
}

impl AudioBackend for PulseBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn list_devices(&self) -> patchbay_core::Result<Vec<AudioDevice>> {
        let mut devices: Vec<AudioDevice> =
            self.host.list_sources()?.into_iter().map(|e| to_device(e, DeviceType::Capture)).collect();
        devices.extend(self.host.list_sinks()?.into_iter().map(|e| to_device(e, DeviceType::Playback)));

        debug!(count = devices.len(), "Listed PulseAudio devices");
        Ok(devices)
    }
}
