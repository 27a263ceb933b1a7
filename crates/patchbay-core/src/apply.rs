//! Applying and unapplying pipelines.
//!
//! One run drives one [`ApplyJob`] from STARTED to a terminal status, invoking
//! each node's manager in dependency order and recording every step in the
//! job's event trail. A failing node aborts the run and marks the pipeline
//! stale; nodes that already ran are not rolled back.

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::graph::NodeIndex;
use crate::job::{ApplyDirection, ApplyJob, EventData, EventType, JobId, JobStatus, NewEvent};
use crate::manager::{ApplyContext, NodeStateStore};
use crate::pipeline::{NodeRole, Pipeline, PipelineFlags, PipelineId};
use crate::pipeline_graph::PipelineGraph;
use crate::validation::{validate, validate_structure};

pub const MSG_MULTIPLE_ROOTS: &str = "Multiple roots found";

/// Where a run records its progress.
pub trait ApplyLedger {
    /// Move a job to a new status.
    ///
    /// # Errors
    /// Returns an error if the ledger cannot be written.
    fn set_job_status(&self, job: JobId, status: JobStatus) -> Result<()>;

    /// Append an event to a job's trail.
    ///
    /// # Errors
    /// Returns an error if the ledger cannot be written.
    fn append_event(&self, job: JobId, event: NewEvent) -> Result<()>;

    /// Persist a pipeline's `active` and `stale` flags.
    ///
    /// # Errors
    /// Returns an error if the ledger cannot be written.
    fn set_pipeline_flags(&self, pipeline: PipelineId, flags: PipelineFlags) -> Result<()>;
}

/// Node execution order for a run.
///
/// Breadth-first from `root`, then device nodes before processing nodes, each
/// group keeping traversal order. Unapply is the exact reverse.
#[must_use]
pub fn apply_order(graph: &PipelineGraph, root: NodeIndex, direction: ApplyDirection) -> Vec<NodeIndex> {
    let visited = graph.breadth_first(root);
    let (mut order, processing): (Vec<_>, Vec<_>) =
        visited.into_iter().partition(|&index| graph.node(index).role == NodeRole::Device);
    order.extend(processing);
    if direction == ApplyDirection::Unapply {
        order.reverse();
    }
    order
}

/// Tunables for [`Orchestrator`].
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// Validate the graph before touching anything
    pub validate_before_run: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self { validate_before_run: true }
    }
}

/// Runs apply jobs.
pub struct Orchestrator<'a> {
    ledger: &'a dyn ApplyLedger,
    state: &'a dyn NodeStateStore,
    options: OrchestratorOptions,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(ledger: &'a dyn ApplyLedger, state: &'a dyn NodeStateStore, options: OrchestratorOptions) -> Self {
        Self { ledger, state, options }
    }

    /// Drive `job` to completion against `graph`.
    ///
    /// Node failures are not errors of this function: they are recorded in the
    /// job trail and reported through the returned status.
    ///
    /// # Errors
    /// Returns [`Error::JobFinished`] if the job is already terminal, or an
    /// error from the ledger.
    pub fn run(&self, pipeline: &Pipeline, job: &ApplyJob, graph: &PipelineGraph) -> Result<JobStatus> {
        if job.status.is_terminal() {
            return Err(Error::JobFinished(job.id));
        }
        let direction = job.direction;
        info!(pipeline = %pipeline.name, job_id = job.id, direction = direction.as_str(), "Starting job");
        self.ledger.set_job_status(job.id, JobStatus::Running)?;

        if graph.is_empty() {
            debug!(job_id = job.id, "Pipeline has no nodes");
            return self.succeed(job.id);
        }

        if self.options.validate_before_run {
            let result = match direction {
                ApplyDirection::Apply => validate(graph),
                ApplyDirection::Unapply => validate_structure(graph),
            };
            if !result.valid() {
                warn!(job_id = job.id, graph_errors = ?result.graph_errors, "Pipeline failed validation");
                let data = EventData { graph_errors: result.graph_errors.clone(), node_errors: result.node_messages() };
                return self.fail(job.id, NewEvent::new(EventType::Failure).with_data(data));
            }
        }

        let roots = graph.roots();
        let root = match roots.as_slice() {
            [] => return self.succeed(job.id),
            [root] => *root,
            _ => {
                warn!(job_id = job.id, roots = roots.len(), "Multiple roots found");
                self.mark_stale(pipeline)?;
                let data = EventData::graph_error(MSG_MULTIPLE_ROOTS);
                return self.fail(job.id, NewEvent::new(EventType::Failure).with_data(data));
            }
        };

        let ctx = ApplyContext::new(self.state);
        for index in apply_order(graph, root, direction) {
            let node = &graph.node(index).node;
            self.ledger.append_event(job.id, NewEvent::new(EventType::StartedNode).for_node(node.id))?;
            debug!(job_id = job.id, node_id = node.id, type_tag = %node.type_tag, "Running node");

            let manager = &graph.node(index).manager;
            let outcome = match direction {
                ApplyDirection::Apply => manager.apply(index, graph, ctx),
                ApplyDirection::Unapply => manager.unapply(index, graph, ctx),
            };

            if let Err(e) = outcome {
                error!(job_id = job.id, node_id = node.id, error = %e, "Node failed");
                self.mark_stale(pipeline)?;
                let event = NewEvent::new(EventType::Failure)
                    .for_node(node.id)
                    .with_data(EventData::node_error(e.to_string()));
                return self.fail(job.id, event);
            }

            self.ledger.append_event(job.id, NewEvent::new(EventType::CompletedNode).for_node(node.id))?;
        }

        let active = direction == ApplyDirection::Apply;
        self.ledger.set_pipeline_flags(pipeline.id, PipelineFlags { active, stale: false })?;
        info!(pipeline = %pipeline.name, job_id = job.id, active, "Job finished");
        self.succeed(job.id)
    }

    fn succeed(&self, job: JobId) -> Result<JobStatus> {
        self.ledger.append_event(job, NewEvent::new(EventType::Success))?;
        self.ledger.set_job_status(job, JobStatus::Success)?;
        Ok(JobStatus::Success)
    }

    fn fail(&self, job: JobId, event: NewEvent) -> Result<JobStatus> {
        self.ledger.append_event(job, event)?;
        self.ledger.set_job_status(job, JobStatus::Failed)?;
        Ok(JobStatus::Failed)
    }

    fn mark_stale(&self, pipeline: &Pipeline) -> Result<()> {
        self.ledger.set_pipeline_flags(pipeline.id, PipelineFlags { active: pipeline.active, stale: true })
    }
}
