//! Requests served on the blocking thread pool.
//!
//! These requests call into an audio backend, which can stall on an external
//! process. The main loop hands them off here and replies once they finish.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use patchbay_core::pipeline::PipelineId;
use patchbay_core::{AudioBackend, ManagerRegistry, build_graph, validate};
use patchbay_db::Database;
use patchbay_ipc::{ErrorInfo, Event};

use crate::discovery::discover_once;
use crate::server::RequestError;

/// A request that must not run on the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingRequest {
    /// Build and validate a pipeline's graph
    ValidatePipeline(PipelineId),
    /// Run one discovery round
    DiscoverDevices,
}

/// Everything needed to serve a [`BlockingRequest`].
pub struct BlockingHandler {
    db_path: PathBuf,
    registry: Arc<ManagerRegistry>,
    backends: Vec<Arc<dyn AudioBackend>>,
    events: broadcast::Sender<Event>,
}

impl BlockingHandler {
    #[must_use]
    pub fn new(
        db_path: PathBuf,
        registry: Arc<ManagerRegistry>,
        backends: Vec<Arc<dyn AudioBackend>>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self { db_path, registry, backends, events }
    }

    /// Serve a request against a fresh connection.
    pub fn handle(&self, request: BlockingRequest) -> Result<Value, ErrorInfo> {
        let result = Database::open_at(&self.db_path)
            .map_err(RequestError::from)
            .and_then(|db| serve(&db, &self.registry, &self.backends, &self.events, request));
        result.map_err(|e| {
            let error = ErrorInfo::from(e);
            if error.code == ErrorInfo::INTERNAL {
                warn!(?request, message = %error.message, "Request failed");
            } else {
                debug!(code = error.code, message = %error.message, "Request rejected");
            }
            error
        })
    }
}

/// Serve one blocking request.
///
/// # Errors
/// Returns [`RequestError`] when the pipeline is missing or the store fails.
pub fn serve(
    db: &Database,
    registry: &ManagerRegistry,
    backends: &[Arc<dyn AudioBackend>],
    events: &broadcast::Sender<Event>,
    request: BlockingRequest,
) -> Result<Value, RequestError> {
    match request {
        BlockingRequest::ValidatePipeline(id) => {
            db.get_pipeline(id)?;
            let graph = build_graph(db.load_snapshot(id)?, registry)?;
            Ok(serde_json::to_value(validate(&graph))?)
        }

        BlockingRequest::DiscoverDevices => {
            discover_once(db, backends, events);
            let devices = db.list_devices()?;
            let active = devices.iter().filter(|d| d.active).count();
            Ok(json!({
                "total_devices": devices.len(),
                "active_devices": active,
                "inactive_devices": devices.len() - active,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeHost};
    use patchbay_pulse::pactl::MockModuleHost;
    use patchbay_pulse::{ModuleHost, PactlEntry, PulseBackend, SampleSpec};

    fn entry(index: u32, name: &str) -> PactlEntry {
        PactlEntry {
            index,
            name: name.into(),
            driver: "module-alsa-card.c".into(),
            sample_spec: SampleSpec { format: "s16le".into(), channels: 2, rate: 48000 },
            state: "RUNNING".into(),
        }
    }

    fn pulse(host: MockModuleHost) -> Vec<Arc<dyn AudioBackend>> {
        vec![Arc::new(PulseBackend::new(Arc::new(host) as Arc<dyn ModuleHost>))]
    }

    #[test]
    fn test_discover_devices_reports_counts() {
        let db = Database::open_in_memory().expect("Failed to open database");
        let registry = ManagerRegistry::new();
        let (tx, mut rx) = broadcast::channel(8);

        let mut host = MockModuleHost::new();
        host.expect_list_sources().times(1).returning(|| Ok(vec![entry(0, "mic"), entry(1, "line_in")]));
        host.expect_list_sinks().times(1).returning(|| Ok(vec![entry(0, "speakers")]));
        let value = serve(&db, &registry, &pulse(host), &tx, BlockingRequest::DiscoverDevices).unwrap();
        assert_eq!(value, json!({ "total_devices": 3, "active_devices": 3, "inactive_devices": 0 }));
        assert!(rx.try_recv().is_ok());

        let mut host = MockModuleHost::new();
        host.expect_list_sources().times(1).returning(|| Ok(vec![entry(0, "mic")]));
        host.expect_list_sinks().times(1).returning(|| Ok(Vec::new()));
        let value = serve(&db, &registry, &pulse(host), &tx, BlockingRequest::DiscoverDevices).unwrap();
        assert_eq!(value, json!({ "total_devices": 3, "active_devices": 1, "inactive_devices": 2 }));
    }

    #[test]
    fn test_discover_devices_skips_disabled_backend() {
        let db = Database::open_in_memory().expect("Failed to open database");
        let registry = ManagerRegistry::new();
        let (tx, _rx) = broadcast::channel(8);
        db.set_backend_enabled(patchbay_pulse::BACKEND_NAME, false).unwrap();

        // Any call on a mock without expectations panics
        let value = serve(&db, &registry, &pulse(MockModuleHost::new()), &tx, BlockingRequest::DiscoverDevices)
            .expect("Discovery failed");
        assert_eq!(value["total_devices"], 0);
    }

    #[test]
    fn test_validate_reports_results() {
        let db = Database::open_in_memory().expect("Failed to open database");
        let host = Arc::new(FakeHost::with_devices(&["mic"], &["speakers"]));
        let registry = testing::registry(&host);
        let pipeline_id = testing::loopback_pipeline(&db, &registry);
        let (tx, _rx) = broadcast::channel(8);

        let value = serve(&db, &registry, &[], &tx, BlockingRequest::ValidatePipeline(pipeline_id)).unwrap();
        assert_eq!(value["graph_errors"], json!([]));

        let error = serve(&db, &registry, &[], &tx, BlockingRequest::ValidatePipeline(999)).unwrap_err();
        assert_eq!(error.code(), ErrorInfo::NOT_FOUND);
    }

    #[test]
    fn test_handler_opens_its_own_connection() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("patchbay.db");
        let host = Arc::new(FakeHost::with_devices(&["mic"], &["speakers"]));
        let registry = Arc::new(testing::registry(&host));
        let pipeline_id = {
            let db = Database::open_at(&path).expect("Failed to open database");
            testing::loopback_pipeline(&db, &registry)
        };
        let (tx, _rx) = broadcast::channel(8);

        let handler = BlockingHandler::new(path, registry, Vec::new(), tx);
        let value = handler.handle(BlockingRequest::ValidatePipeline(pipeline_id)).expect("Validation failed");
        assert_eq!(value["graph_errors"], json!([]));
        let error = handler.handle(BlockingRequest::ValidatePipeline(pipeline_id + 1)).unwrap_err();
        assert_eq!(error.code, ErrorInfo::NOT_FOUND);
    }
}
