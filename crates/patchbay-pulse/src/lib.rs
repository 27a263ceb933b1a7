//! Patchbay PulseAudio - backend plugin for PulseAudio servers.
//!
//! Devices are listed and modules loaded through `pactl`, one process per
//! call. The plugin contributes three node types:
//!
//! - `pulseaudio.device` binds a slot to an existing source or sink
//! - `pulseaudio.tunnel` creates a local endpoint for a remote server
//! - `pulseaudio.pipe` loops audio from a source into a sink

pub mod backend;
pub mod device_node;
pub mod error;
pub mod pactl;
pub mod pipe_node;
pub mod plugin;
mod state;
pub mod tunnel_node;

#[cfg(test)]
mod testing;

pub use backend::PulseBackend;
pub use error::{PulseError, PulseResult};
pub use pactl::{ModuleHost, PactlEntry, PactlHost, SampleSpec};
pub use plugin::PulsePlugin;

/// Backend name used in device handles and the device catalog.
pub const BACKEND_NAME: &str = "pulseaudio";
