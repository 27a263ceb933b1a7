//! IPC message types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use patchbay_core::job::JobId;
use patchbay_core::pipeline::{EdgeId, NodeId, PipelineId};
use patchbay_core::slot::SlotId;

use crate::events::EventType;

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

impl Response {
    #[must_use]
    pub fn ok(id: u64, value: Value) -> Self {
        Self { id, result: Ok(value) }
    }

    #[must_use]
    pub fn error(id: u64, error: ErrorInfo) -> Self {
        Self { id, result: Err(error) }
    }
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Invalid input or a reference to something that cannot be used.
    pub const BAD_REQUEST: i32 = 400;
    /// The referenced entity does not exist.
    pub const NOT_FOUND: i32 = 404;
    /// The pipeline is active or stale and cannot be edited.
    pub const CONFLICT: i32 = 409;
    /// Failure inside the daemon.
    pub const INTERNAL: i32 = 500;

    /// Create a new error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

fn default_enabled() -> bool {
    true
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    // Pipelines
    /// List all pipelines
    ListPipelines,
    /// Get a pipeline with its nodes, slots and edges
    GetPipeline { id: PipelineId },
    /// Create a pipeline
    CreatePipeline {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    /// Change a pipeline's name, description or enabled flag
    UpdatePipeline {
        id: PipelineId,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        enabled: Option<bool>,
    },
    /// Delete a pipeline with everything in it
    DeletePipeline { id: PipelineId },

    // Nodes and edges
    /// List a pipeline's nodes with their slots
    ListNodes { pipeline_id: PipelineId },
    /// Add a node to a pipeline
    CreateNode {
        pipeline_id: PipelineId,
        type_tag: String,
        #[serde(default)]
        config: Map<String, Value>,
    },
    /// Replace a node's configuration
    UpdateNode { id: NodeId, config: Map<String, Value> },
    /// Remove a node and its edges
    DeleteNode { id: NodeId },
    /// Connect two slots
    CreateEdge { pipeline_id: PipelineId, slot_a: SlotId, slot_b: SlotId },
    /// Remove a connection
    DeleteEdge { id: EdgeId },
    /// Remove the connection between two slots, in either orientation
    DeleteEdgeBetween { pipeline_id: PipelineId, slot_a: SlotId, slot_b: SlotId },

    // Apply
    /// Run the validator over a pipeline
    ValidatePipeline { id: PipelineId },
    /// Queue a job realizing the pipeline
    ApplyPipeline { id: PipelineId },
    /// Queue a job tearing the pipeline down
    UnapplyPipeline { id: PipelineId },
    /// List a pipeline's jobs, newest first
    ListJobs { pipeline_id: PipelineId },
    /// Get a job with its events, newest first
    GetJob { id: JobId },

    // Catalog
    /// List registered node types and their fields
    ListNodeTypes,
    /// List known audio devices
    ListDevices,
    /// Run one discovery round now and report the catalog counts
    DiscoverDevices,
    /// Forget a device no node refers to
    DeleteDevice { id: i64 },
    /// List audio backends and whether discovery polls them
    ListBackends,
    /// Turn discovery of one backend on or off
    SetBackendEnabled { name: String, enabled: bool },

    // Subscriptions
    /// Subscribe to event types
    Subscribe { events: Vec<EventType> },
    /// Unsubscribe from event types
    Unsubscribe { events: Vec<EventType> },

    // System
    /// Request graceful shutdown
    Shutdown,
}
