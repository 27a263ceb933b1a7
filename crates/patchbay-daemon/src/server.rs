//! Request handling for the IPC server.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use patchbay_core::pipeline::PipelineId;
use patchbay_core::{ApplyDirection, ManagerRegistry, Node, Pipeline, Slot};
use patchbay_db::{Database, DbError, PipelineUpdate};
use patchbay_ipc::{ErrorInfo, Method};

use crate::blocking::BlockingRequest;
use crate::worker::JobMessage;

/// Follow-up work for the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Hand a job to the worker pool
    Enqueue(JobMessage),
    /// Serve the request on the blocking pool and reply from there
    Offload(BlockingRequest),
    /// Stop the daemon
    Shutdown,
}

/// Outcome of one request.
#[derive(Debug)]
pub struct HandleResult {
    /// `None` when the reply comes from [`Command::Offload`]
    pub response: Option<Result<Value, ErrorInfo>>,
    pub command: Option<Command>,
}

/// Why a request could not be served.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Core(#[from] patchbay_core::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}

impl RequestError {
    /// Status code reported to the client.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Db(DbError::NotFound(_)) | Self::UnknownBackend(_) => ErrorInfo::NOT_FOUND,
            Self::Db(DbError::Conflict(_) | DbError::InvalidReference(_)) | Self::BadRequest(_) => {
                ErrorInfo::BAD_REQUEST
            }
            Self::Db(DbError::Core(e)) | Self::Core(e) => core_code(e),
            Self::Db(_) | Self::Json(_) => ErrorInfo::INTERNAL,
        }
    }
}

fn core_code(err: &patchbay_core::Error) -> i32 {
    use patchbay_core::Error;
    match err {
        Error::PipelineActive(_) | Error::PipelineStale(_) => ErrorInfo::CONFLICT,
        Error::PipelineNotFound(_) | Error::NodeNotFound(_) | Error::SlotNotFound(_) | Error::JobNotFound(_) => {
            ErrorInfo::NOT_FOUND
        }
        e if e.is_client_error() => ErrorInfo::BAD_REQUEST,
        _ => ErrorInfo::INTERNAL,
    }
}

impl From<RequestError> for ErrorInfo {
    fn from(err: RequestError) -> Self {
        ErrorInfo::new(err.code(), err.to_string())
    }
}

type Outcome = Result<(Value, Option<Command>), RequestError>;

/// A node together with its current slots.
#[derive(Debug, Serialize)]
struct NodeView {
    #[serde(flatten)]
    node: Node,
    slots: Vec<Slot>,
}

fn reply(value: impl Serialize) -> Outcome {
    Ok((serde_json::to_value(value)?, None))
}

fn success() -> Outcome {
    Ok((json!({ "success": true }), None))
}

fn offload(request: BlockingRequest) -> Outcome {
    Ok((Value::Null, Some(Command::Offload(request))))
}

/// Serves requests against the store and the node type registry.
pub struct RequestHandler {
    db: Database,
    registry: Arc<ManagerRegistry>,
    /// Names of the audio backends discovery knows about
    backends: Vec<String>,
}

impl RequestHandler {
    #[must_use]
    pub fn new(db: Database, registry: Arc<ManagerRegistry>, backends: Vec<String>) -> Self {
        Self { db, registry, backends }
    }

    /// Handle an IPC request and return a response value.
    pub fn handle_request(&self, method: &Method) -> HandleResult {
        match self.dispatch(method) {
            Ok((_, Some(Command::Offload(request)))) => {
                HandleResult { response: None, command: Some(Command::Offload(request)) }
            }
            Ok((value, command)) => HandleResult { response: Some(Ok(value)), command },
            Err(e) => {
                let error = ErrorInfo::from(e);
                if error.code == ErrorInfo::INTERNAL {
                    warn!(?method, message = %error.message, "Request failed");
                } else {
                    debug!(code = error.code, message = %error.message, "Request rejected");
                }
                HandleResult { response: Some(Err(error)), command: None }
            }
        }
    }

    fn dispatch(&self, method: &Method) -> Outcome {
        match method {
            Method::ListPipelines => reply(self.db.list_pipelines()?),

            Method::GetPipeline { id } => {
                let pipeline = self.db.get_pipeline(*id)?;
                let snapshot = self.db.load_snapshot(*id)?;
                reply(json!({
                    "pipeline": pipeline,
                    "nodes": snapshot.nodes,
                    "slots": snapshot.slots,
                    "edges": snapshot.edges,
                }))
            }

            Method::CreatePipeline { name, description, enabled } => {
                if name.trim().is_empty() {
                    return Err(RequestError::BadRequest("Pipeline name must not be empty".to_string()));
                }
                let pipeline = self.db.create_pipeline(name, description, *enabled)?;
                info!(pipeline_id = pipeline.id, name = %pipeline.name, "Pipeline created");
                reply(pipeline)
            }

            Method::UpdatePipeline { id, name, description, enabled } => {
                self.writable_pipeline(*id)?;
                if name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                    return Err(RequestError::BadRequest("Pipeline name must not be empty".to_string()));
                }
                let update =
                    PipelineUpdate { name: name.clone(), description: description.clone(), enabled: *enabled };
                reply(self.db.update_pipeline(*id, &update)?)
            }

            Method::DeletePipeline { id } => {
                let pipeline = self.writable_pipeline(*id)?;
                self.db.delete_pipeline(pipeline.id)?;
                info!(pipeline_id = pipeline.id, name = %pipeline.name, "Pipeline deleted");
                success()
            }

            Method::ListNodes { pipeline_id } => {
                self.db.get_pipeline(*pipeline_id)?;
                let nodes = self
                    .db
                    .list_nodes(*pipeline_id)?
                    .into_iter()
                    .map(|node| -> Result<NodeView, DbError> {
                        Ok(NodeView { slots: self.db.list_slots(node.id)?, node })
                    })
                    .collect::<Result<Vec<_>, DbError>>()?;
                reply(nodes)
            }

            Method::CreateNode { pipeline_id, type_tag, config } => {
                self.writable_pipeline(*pipeline_id)?;
                self.registry.resolve(type_tag)?.schema().check_config(config)?;

                let node = self.db.create_node(*pipeline_id, type_tag, config)?;
                match self.reconcile(&node) {
                    Ok(slots) => {
                        info!(pipeline_id, node_id = node.id, type_tag = %node.type_tag, "Node created");
                        reply(NodeView { node, slots })
                    }
                    Err(e) => {
                        self.db.delete_node(node.id)?;
                        Err(e)
                    }
                }
            }

            Method::UpdateNode { id, config } => {
                let current = self.db.get_node(*id)?;
                self.writable_pipeline(current.pipeline_id)?;
                self.registry.resolve(&current.type_tag)?.schema().check_config(config)?;

                let node = self.db.update_node_config(*id, config)?;
                match self.reconcile(&node) {
                    Ok(slots) => reply(NodeView { node, slots }),
                    Err(e) => {
                        self.db.update_node_config(*id, &current.config)?;
                        Err(e)
                    }
                }
            }

            Method::DeleteNode { id } => {
                let node = self.db.get_node(*id)?;
                self.writable_pipeline(node.pipeline_id)?;
                self.db.delete_node(node.id)?;
                info!(pipeline_id = node.pipeline_id, node_id = node.id, "Node deleted");
                success()
            }

            Method::CreateEdge { pipeline_id, slot_a, slot_b } => {
                self.writable_pipeline(*pipeline_id)?;
                reply(self.db.create_edge(*pipeline_id, *slot_a, *slot_b)?)
            }

            Method::DeleteEdge { id } => {
                let (edge, pipeline_id) = self.db.get_edge(*id)?;
                self.writable_pipeline(pipeline_id)?;
                self.db.delete_edge(edge.id)?;
                success()
            }

            Method::DeleteEdgeBetween { pipeline_id, slot_a, slot_b } => {
                self.writable_pipeline(*pipeline_id)?;
                let edge = self.db.find_edge_between(*pipeline_id, *slot_a, *slot_b)?;
                self.db.delete_edge(edge.id)?;
                success()
            }

            Method::ValidatePipeline { id } => offload(BlockingRequest::ValidatePipeline(*id)),

            Method::ApplyPipeline { id } => self.enqueue(*id, ApplyDirection::Apply),

            Method::UnapplyPipeline { id } => self.enqueue(*id, ApplyDirection::Unapply),

            Method::ListJobs { pipeline_id } => {
                self.db.get_pipeline(*pipeline_id)?;
                reply(self.db.list_jobs(*pipeline_id)?)
            }

            Method::GetJob { id } => {
                let job = self.db.get_job(*id)?;
                let events = self.db.list_events(job.id)?;
                reply(json!({ "job": job, "events": events }))
            }

            Method::ListNodeTypes => reply(self.registry.schemas()),

            Method::ListDevices => reply(self.db.list_devices()?),

            Method::DiscoverDevices => offload(BlockingRequest::DiscoverDevices),

            Method::DeleteDevice { id } => {
                self.db.delete_device(*id)?;
                info!(device_id = id, "Device forgotten");
                success()
            }

            Method::ListBackends => {
                let backends = self
                    .backends
                    .iter()
                    .map(|name| -> Result<Value, DbError> {
                        Ok(json!({ "name": name, "enabled": self.db.backend_enabled(name)? }))
                    })
                    .collect::<Result<Vec<_>, DbError>>()?;
                reply(backends)
            }

            Method::SetBackendEnabled { name, enabled } => {
                if !self.backends.contains(name) {
                    return Err(RequestError::UnknownBackend(name.clone()));
                }
                self.db.set_backend_enabled(name, *enabled)?;
                info!(backend = %name, enabled, "Backend preference changed");
                success()
            }

            // Subscriptions are tracked per connection by the IPC server
            Method::Subscribe { .. } | Method::Unsubscribe { .. } => success(),

            Method::Shutdown => {
                info!("Shutdown requested via IPC");
                Ok((json!({ "success": true }), Some(Command::Shutdown)))
            }
        }
    }

    fn writable_pipeline(&self, id: PipelineId) -> Result<Pipeline, RequestError> {
        let pipeline = self.db.get_pipeline(id)?;
        pipeline.ensure_writable()?;
        Ok(pipeline)
    }

    fn reconcile(&self, node: &Node) -> Result<Vec<Slot>, RequestError> {
        let (_, manager) = self.registry.manager_for(node)?;
        let slots = self.db.reconcile_slots(node.id, &manager.slot_schematics())?;
        self.db.bind_node_device(node.id, manager.bound_device().as_ref())?;
        Ok(slots)
    }

    /// Fail a job that could not be handed to the worker pool.
    pub fn abandon_job(&self, message: JobMessage, reason: &str) {
        if let Err(e) = self.db.fail_job(message.job_id, reason) {
            error!(job_id = message.job_id, error = %e, "Failed to record abandoned job");
        }
    }

    fn enqueue(&self, id: PipelineId, direction: ApplyDirection) -> Outcome {
        let pipeline = self.db.get_pipeline(id)?;
        let job = self.db.create_job(pipeline.id, direction)?;
        info!(pipeline = %pipeline.name, job_id = job.id, direction = direction.as_str(), "Job queued");

        let message = JobMessage { pipeline_id: pipeline.id, job_id: job.id, direction };
        Ok((serde_json::to_value(&job)?, Some(Command::Enqueue(message))))
    }
}
