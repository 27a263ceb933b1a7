//! IPC event types (server to client).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use patchbay_core::job::JobId;
use patchbay_core::pipeline::PipelineId;
use patchbay_core::{ApplyEvent, PipelineFlags};

use crate::error::IpcResult;

/// Event sent from daemon to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    pub data: Value,
}

impl Event {
    /// Build an event from typed data.
    ///
    /// # Errors
    /// Returns an error if the data cannot be serialized.
    pub fn new(event: EventType, data: &impl Serialize) -> IpcResult<Self> {
        Ok(Self { event, data: serde_json::to_value(data)? })
    }
}

/// Types of events that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// An apply job appended an event to its trail
    JobEvent,
    /// A pipeline's active/stale flags changed
    PipelineChanged,
    /// A discovery round updated the device catalog
    DevicesChanged,
}

/// Job event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEventData {
    pub pipeline_id: PipelineId,
    pub job_id: JobId,
    pub event: ApplyEvent,
}

/// Pipeline flags changed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineChangedData {
    pub pipeline_id: PipelineId,
    #[serde(flatten)]
    pub flags: PipelineFlags,
}

/// Device catalog update data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesChangedData {
    pub backend: String,
    /// Devices listed in this round
    pub count: usize,
}
