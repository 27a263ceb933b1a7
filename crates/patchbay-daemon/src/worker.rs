//! Worker pool running apply and unapply jobs.
//!
//! Jobs arrive on a bounded queue. Each worker takes one message at a time and
//! drives it to completion on the blocking thread pool with its own database
//! connection, so jobs for different pipelines run side by side.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use patchbay_core::job::JobId;
use patchbay_core::pipeline::PipelineId;
use patchbay_core::{
    ApplyDirection, ApplyLedger, EventData, EventType as JobEventType, JobStatus, ManagerRegistry, NewEvent,
    Orchestrator, OrchestratorOptions, PipelineFlags, build_graph,
};
use patchbay_db::Database;
use patchbay_ipc::{Event, EventType, JobEventData, PipelineChangedData};

/// Queue capacity before `ApplyPipeline` requests wait for a free slot.
const QUEUE_CAPACITY: usize = 64;

/// Failure recorded for a job cut off by a daemon restart.
const INTERRUPTED: &str = "Daemon stopped while the job was running";

/// One queued run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobMessage {
    pub pipeline_id: PipelineId,
    pub job_id: JobId,
    pub direction: ApplyDirection,
}

/// Everything a worker needs to run a job.
pub struct JobRunner {
    db_path: PathBuf,
    registry: Arc<ManagerRegistry>,
    options: OrchestratorOptions,
    events: broadcast::Sender<Event>,
}

impl JobRunner {
    #[must_use]
    pub fn new(
        db_path: PathBuf,
        registry: Arc<ManagerRegistry>,
        options: OrchestratorOptions,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self { db_path, registry, options, events }
    }

    /// Run one job against a fresh connection.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or written.
    pub fn run(&self, message: JobMessage) -> patchbay_core::Result<JobStatus> {
        let db = Database::open_at(&self.db_path)?;
        run_job(&db, &self.registry, self.options, &self.events, message)
    }
}

/// Drive a queued job to a terminal status.
///
/// Jobs that already finished are left alone and their status returned. A
/// pipeline whose graph cannot be built fails the job without touching the
/// pipeline's flags.
///
/// # Errors
/// Returns an error if the job or pipeline cannot be loaded or the ledger
/// cannot be written.
pub fn run_job(
    db: &Database,
    registry: &ManagerRegistry,
    options: OrchestratorOptions,
    events: &broadcast::Sender<Event>,
    message: JobMessage,
) -> patchbay_core::Result<JobStatus> {
    let job = db.get_job(message.job_id)?;
    if job.status.is_terminal() {
        debug!(job_id = job.id, status = job.status.as_str(), "Skipping finished job");
        return Ok(job.status);
    }

    let pipeline = db.get_pipeline(job.pipeline_id)?;
    let ledger = BroadcastLedger::new(db, pipeline.id, events);

    let graph = match build_graph(db.load_snapshot(pipeline.id)?, registry) {
        Ok(graph) => graph,
        Err(e) => {
            warn!(pipeline = %pipeline.name, job_id = job.id, error = %e, "Could not build pipeline graph");
            let event = NewEvent::new(JobEventType::Failure).with_data(EventData::graph_error(e.to_string()));
            ledger.append_event(job.id, event)?;
            ledger.set_job_status(job.id, JobStatus::Failed)?;
            return Ok(JobStatus::Failed);
        }
    };

    Orchestrator::new(&ledger, db, options).run(&pipeline, &job, &graph)
}

/// Sort out jobs left unfinished by an earlier run of the daemon.
///
/// Jobs that never started are returned to be queued again. A job cut off
/// mid-run is failed and its pipeline marked stale, as the live route is in
/// an unknown state.
///
/// # Errors
/// Returns an error if the jobs cannot be listed or the ledger cannot be
/// written.
pub fn recover_jobs(db: &Database, events: &broadcast::Sender<Event>) -> patchbay_core::Result<Vec<JobMessage>> {
    let mut pending = Vec::new();
    for job in db.list_unfinished_jobs()? {
        match job.status {
            JobStatus::Started => {
                pending.push(JobMessage { pipeline_id: job.pipeline_id, job_id: job.id, direction: job.direction });
            }
            JobStatus::Running => {
                warn!(pipeline_id = job.pipeline_id, job_id = job.id, "Job was interrupted by a restart");
                let ledger = BroadcastLedger::new(db, job.pipeline_id, events);
                let event = NewEvent::new(JobEventType::Failure).with_data(EventData::graph_error(INTERRUPTED));
                ledger.append_event(job.id, event)?;
                ledger.set_job_status(job.id, JobStatus::Failed)?;
                let active = db.get_pipeline(job.pipeline_id)?.active;
                ledger.set_pipeline_flags(job.pipeline_id, PipelineFlags { active, stale: true })?;
            }
            JobStatus::Success | JobStatus::Failed => {}
        }
    }
    Ok(pending)
}

/// Ledger that writes to the database and tells subscribers about it.
pub struct BroadcastLedger<'a> {
    db: &'a Database,
    pipeline_id: PipelineId,
    events: &'a broadcast::Sender<Event>,
}

impl<'a> BroadcastLedger<'a> {
    #[must_use]
    pub fn new(db: &'a Database, pipeline_id: PipelineId, events: &'a broadcast::Sender<Event>) -> Self {
        Self { db, pipeline_id, events }
    }

    fn publish(&self, event: EventType, data: &impl serde::Serialize) {
        match Event::new(event, data) {
            // No receivers just means nobody is connected
            Ok(event) => {
                let _ = self.events.send(event);
            }
            Err(e) => warn!(error = %e, "Failed to encode event"),
        }
    }
}

impl ApplyLedger for BroadcastLedger<'_> {
    fn set_job_status(&self, job: JobId, status: JobStatus) -> patchbay_core::Result<()> {
        Ok(self.db.set_job_status(job, status)?)
    }

    fn append_event(&self, job: JobId, event: NewEvent) -> patchbay_core::Result<()> {
        let event = self.db.append_event(job, &event)?;
        self.publish(EventType::JobEvent, &JobEventData { pipeline_id: self.pipeline_id, job_id: job, event });
        Ok(())
    }

    fn set_pipeline_flags(&self, pipeline: PipelineId, flags: PipelineFlags) -> patchbay_core::Result<()> {
        self.db.set_pipeline_flags(pipeline, flags)?;
        self.publish(EventType::PipelineChanged, &PipelineChangedData { pipeline_id: pipeline, flags });
        Ok(())
    }
}

/// A fixed set of workers sharing one queue.
pub struct WorkerPool {
    sender: mpsc::Sender<JobMessage>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `count` workers. They stop when `shutdown` is cancelled, after
    /// finishing the job in hand.
    #[must_use]
    pub fn spawn(count: usize, runner: Arc<JobRunner>, shutdown: &CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..count)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let runner = Arc::clone(&runner);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { work(worker, &receiver, runner, &shutdown).await })
            })
            .collect();
        info!(count, "Worker pool started");

        Self { sender, workers }
    }

    /// Handle for queueing jobs.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<JobMessage> {
        self.sender.clone()
    }

    /// Close the queue and wait for every worker to stop.
    pub async fn join(self) {
        drop(self.sender);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn work(
    worker: usize,
    receiver: &Mutex<mpsc::Receiver<JobMessage>>,
    runner: Arc<JobRunner>,
    shutdown: &CancellationToken,
) {
    loop {
        let message = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            }
        };

        debug!(worker, job_id = message.job_id, direction = message.direction.as_str(), "Picked up job");
        let runner = Arc::clone(&runner);
        match tokio::task::spawn_blocking(move || runner.run(message)).await {
            Ok(Ok(status)) => {
                info!(worker, pipeline_id = message.pipeline_id, job_id = message.job_id, status = status.as_str(), "Job done");
            }
            Ok(Err(e)) => error!(worker, job_id = message.job_id, error = %e, "Job could not be run"),
            Err(e) => error!(worker, job_id = message.job_id, error = %e, "Job panicked"),
        }
    }
    debug!(worker, "Worker exiting");
}
