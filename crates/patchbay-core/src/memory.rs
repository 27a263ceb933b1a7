//! In-memory ledger and node state store.
//!
//! Used for dry runs and tests; the daemon persists both in SQLite.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::apply::ApplyLedger;
use crate::error::{Error, Result};
use crate::job::{ApplyDirection, ApplyEvent, ApplyJob, EventType, JobId, JobStatus, NewEvent};
use crate::manager::NodeStateStore;
use crate::pipeline::{NodeId, PipelineFlags, PipelineId};

#[derive(Default)]
struct LedgerInner {
    jobs: Vec<ApplyJob>,
    events: Vec<ApplyEvent>,
    flags: HashMap<PipelineId, PipelineFlags>,
}

/// Job ledger kept in memory.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<LedgerInner>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track flags for a pipeline.
    pub fn insert_pipeline(&self, pipeline: PipelineId, flags: PipelineFlags) {
        self.inner.lock().flags.insert(pipeline, flags);
    }

    /// Create a job in STARTED state together with its START event.
    pub fn create_job(&self, pipeline_id: PipelineId, direction: ApplyDirection) -> ApplyJob {
        let mut inner = self.inner.lock();
        let job = ApplyJob {
            id: JobId::try_from(inner.jobs.len()).unwrap_or(JobId::MAX) + 1,
            pipeline_id,
            direction,
            status: JobStatus::Started,
            created_at: String::new(),
        };
        inner.jobs.push(job.clone());
        push_event(&mut inner, job.id, NewEvent::new(EventType::Start));
        job
    }

    #[must_use]
    pub fn job(&self, job: JobId) -> Option<ApplyJob> {
        self.inner.lock().jobs.iter().find(|j| j.id == job).cloned()
    }

    /// Events of a job in the order they were appended.
    #[must_use]
    pub fn events(&self, job: JobId) -> Vec<ApplyEvent> {
        self.inner.lock().events.iter().filter(|e| e.job_id == job).cloned().collect()
    }

    #[must_use]
    pub fn flags(&self, pipeline: PipelineId) -> Option<PipelineFlags> {
        self.inner.lock().flags.get(&pipeline).copied()
    }
}

fn push_event(inner: &mut LedgerInner, job_id: JobId, event: NewEvent) {
    let id = i64::try_from(inner.events.len()).unwrap_or(i64::MAX) + 1;
    inner.events.push(ApplyEvent {
        id,
        job_id,
        event_type: event.event_type,
        node_id: event.node_id,
        data: event.data,
        created_at: String::new(),
    });
}

impl ApplyLedger for MemoryLedger {
    fn set_job_status(&self, job: JobId, status: JobStatus) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner.jobs.iter_mut().find(|j| j.id == job).ok_or(Error::JobNotFound(job))?;
        if entry.status.is_terminal() {
            return Err(Error::JobFinished(job));
        }
        entry.status = status;
        Ok(())
    }

    fn append_event(&self, job: JobId, event: NewEvent) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.jobs.iter().any(|j| j.id == job) {
            return Err(Error::JobNotFound(job));
        }
        push_event(&mut inner, job, event);
        Ok(())
    }

    fn set_pipeline_flags(&self, pipeline: PipelineId, flags: PipelineFlags) -> Result<()> {
        self.inner.lock().flags.insert(pipeline, flags);
        Ok(())
    }
}

/// Node runtime state kept in memory.
#[derive(Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<NodeId, Value>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeStateStore for MemoryStateStore {
    fn load(&self, node: NodeId) -> Result<Option<Value>> {
        Ok(self.states.lock().get(&node).cloned())
    }

    fn save(&self, node: NodeId, state: &Value) -> Result<()> {
        self.states.lock().insert(node, state.clone());
        Ok(())
    }

    fn clear(&self, node: NodeId) -> Result<()> {
        self.states.lock().remove(&node);
        Ok(())
    }
}
