//! Periodic device discovery.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use patchbay_core::AudioBackend;
use patchbay_db::Database;
use patchbay_ipc::{DevicesChangedData, Event, EventType};

/// Refresh the device catalog from every backend once.
///
/// A backend that cannot be listed is skipped and keeps its previous entries.
/// A disabled backend is not queried and its devices are marked inactive.
pub fn discover_once(db: &Database, backends: &[Arc<dyn AudioBackend>], events: &broadcast::Sender<Event>) {
    for backend in backends {
        let enabled = match db.backend_enabled(backend.name()) {
            Ok(enabled) => enabled,
            Err(e) => {
                error!(backend = backend.name(), error = %e, "Failed to read backend preference");
                continue;
            }
        };
        let devices = if enabled {
            match backend.list_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Device listing failed");
                    continue;
                }
            }
        } else {
            debug!(backend = backend.name(), "Backend disabled, not polled");
            Vec::new()
        };
        if let Err(e) = db.sync_devices(backend.name(), &devices) {
            error!(backend = backend.name(), error = %e, "Failed to store devices");
            continue;
        }
        debug!(backend = backend.name(), count = devices.len(), "Devices synced");

        let data = DevicesChangedData { backend: backend.name().to_string(), count: devices.len() };
        match Event::new(EventType::DevicesChanged, &data) {
            Ok(event) => {
                let _ = events.send(event);
            }
            Err(e) => warn!(error = %e, "Failed to encode event"),
        }
    }
}

/// Run discovery every `interval` until `shutdown` is cancelled.
pub async fn run(
    db_path: PathBuf,
    backends: Vec<Arc<dyn AudioBackend>>,
    interval: Duration,
    events: broadcast::Sender<Event>,
    shutdown: CancellationToken,
) {
    info!(backends = backends.len(), interval_secs = interval.as_secs(), "Device discovery started");
    let backends = Arc::new(backends);
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let db_path = db_path.clone();
        let backends = Arc::clone(&backends);
        let events = events.clone();
        let round = tokio::task::spawn_blocking(move || {
            let db = Database::open_at(&db_path)?;
            discover_once(&db, &backends, &events);
            Ok::<_, patchbay_db::DbError>(())
        });
        match round.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Discovery round failed"),
            Err(e) => error!(error = %e, "Discovery task panicked"),
        }
    }
    info!("Device discovery stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::{AudioDevice, DeviceType};

    struct StaticBackend(&'static str, Vec<AudioDevice>);

    impl AudioBackend for StaticBackend {
        fn name(&self) -> &str {
            self.0
        }

        fn list_devices(&self) -> patchbay_core::Result<Vec<AudioDevice>> {
            Ok(self.1.clone())
        }
    }

    struct BrokenBackend;

    impl AudioBackend for BrokenBackend {
        fn name(&self) -> &str {
            "broken"
        }

        fn list_devices(&self) -> patchbay_core::Result<Vec<AudioDevice>> {
            Err(patchbay_core::Error::Backend("Connection refused".into()))
        }
    }

    fn device(name: &str, device_type: DeviceType) -> AudioDevice {
        AudioDevice {
            backend: "pulseaudio".into(),
            name: name.into(),
            nice_name: name.into(),
            device_type,
            format: "s16le".into(),
            sample_rate: 48000,
            channels: 2,
        }
    }

    #[test]
    fn test_discovery_skips_failing_backend() {
        let db = Database::open_in_memory().expect("Failed to open database");
        let (tx, mut rx) = broadcast::channel(8);
        let backends: Vec<Arc<dyn AudioBackend>> = vec![
            Arc::new(BrokenBackend),
            Arc::new(StaticBackend(
                "pulseaudio",
                vec![device("mic", DeviceType::Capture), device("speakers", DeviceType::Playback)],
            )),
        ];

        discover_once(&db, &backends, &tx);

        let devices = db.list_devices().expect("Failed to list devices");
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.active));

        let event = rx.try_recv().expect("Expected a devices event");
        assert_eq!(event.event, EventType::DevicesChanged);
        assert_eq!(event.data["backend"], "pulseaudio");
        assert_eq!(event.data["count"], 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_backend_is_not_polled() {
        let db = Database::open_in_memory().expect("Failed to open database");
        let (tx, _rx) = broadcast::channel(8);
        let pulse: Vec<Arc<dyn AudioBackend>> =
            vec![Arc::new(StaticBackend("pulseaudio", vec![device("mic", DeviceType::Capture)]))];
        discover_once(&db, &pulse, &tx);

        db.set_backend_enabled("pulseaudio", false).unwrap();
        let broken: Vec<Arc<dyn AudioBackend>> = vec![Arc::new(BrokenBackend)];
        db.set_backend_enabled("broken", false).unwrap();
        discover_once(&db, &broken, &tx);
        discover_once(&db, &pulse, &tx);

        let devices = db.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert!(!devices[0].active);

        db.set_backend_enabled("pulseaudio", true).unwrap();
        discover_once(&db, &pulse, &tx);
        assert!(db.list_devices().unwrap()[0].active);
    }
}
