//! Apply jobs and their event trail.

use serde::{Deserialize, Serialize};

use crate::pipeline::{NodeId, PipelineId};

pub type JobId = i64;
pub type EventId = i64;

/// Lifecycle of one apply or unapply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Started,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    /// Terminal jobs are immutable.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "STARTED" => Some(Self::Started),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Whether a job realizes or tears down a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyDirection {
    Apply,
    Unapply,
}

impl ApplyDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Unapply => "unapply",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "apply" => Some(Self::Apply),
            "unapply" => Some(Self::Unapply),
            _ => None,
        }
    }
}

/// One apply or unapply attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyJob {
    pub id: JobId,
    pub pipeline_id: PipelineId,
    pub direction: ApplyDirection,
    pub status: JobStatus,
    pub created_at: String,
}

/// Kind of entry in a job's audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Start,
    Success,
    Failure,
    StartedNode,
    CompletedNode,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::StartedNode => "STARTED_NODE",
            Self::CompletedNode => "COMPLETED_NODE",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "START" => Some(Self::Start),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            "STARTED_NODE" => Some(Self::StartedNode),
            "COMPLETED_NODE" => Some(Self::CompletedNode),
            _ => None,
        }
    }
}

/// Error payload attached to a FAILURE event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    /// Pipeline-wide errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub graph_errors: Vec<String>,
    /// Errors raised by or reported for individual nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_errors: Vec<String>,
}

impl EventData {
    #[must_use]
    pub fn graph_error(message: impl Into<String>) -> Self {
        Self { graph_errors: vec![message.into()], node_errors: Vec::new() }
    }

    #[must_use]
    pub fn node_error(message: impl Into<String>) -> Self {
        Self { graph_errors: Vec::new(), node_errors: vec![message.into()] }
    }
}

/// An event to be appended to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub node_id: Option<NodeId>,
    pub data: Option<EventData>,
}

impl NewEvent {
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self { event_type, node_id: None, data: None }
    }

    #[must_use]
    pub fn for_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = Some(data);
        self
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyEvent {
    pub id: EventId,
    pub job_id: JobId,
    pub event_type: EventType,
    /// Null once the node has been deleted
    pub node_id: Option<NodeId>,
    pub data: Option<EventData>,
    pub created_at: String,
}
