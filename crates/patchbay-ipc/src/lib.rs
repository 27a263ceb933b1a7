//! Patchbay IPC - Unix socket protocol and client library.
//!
//! This crate defines the request/response protocol between the daemon and its
//! clients, the events pushed to subscribers, and a client library for talking
//! to the daemon.

pub mod client;
pub mod error;
pub mod events;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use error::{IpcError, IpcResult};
pub use events::{DevicesChangedData, Event, EventType, JobEventData, PipelineChangedData};
pub use messages::{ErrorInfo, Method, Request, Response};
pub use server::{IpcServer, RequestEnvelope};

use std::path::PathBuf;

/// Get the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/patchbay/daemon.sock` or falls back to
/// `/run/user/$UID/patchbay/daemon.sock`.
#[must_use]
#[allow(unsafe_code)] // libc::getuid() is safe to call
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("patchbay/daemon.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/patchbay/daemon.sock"))
    }
}
