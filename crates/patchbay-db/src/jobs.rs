//! Apply jobs and their event trail.

use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use patchbay_core::job::{EventId, JobId};
use patchbay_core::pipeline::PipelineId;
use patchbay_core::{
    ApplyDirection, ApplyEvent, ApplyJob, ApplyLedger, EventData, EventType, JobStatus, NewEvent, PipelineFlags,
};

use crate::{Database, DbError, DbResult, json_column, parse_column};

const JOB_COLUMNS: &str = "id, pipeline_id, direction, status, created_at";
const EVENT_COLUMNS: &str = "id, job_id, event_type, node_id, data, created_at";

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<ApplyJob> {
    let direction: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(ApplyJob {
        id: row.get(0)?,
        pipeline_id: row.get(1)?,
        direction: parse_column(2, &direction, ApplyDirection::parse)?,
        status: parse_column(3, &status, JobStatus::parse)?,
        created_at: row.get(4)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ApplyEvent> {
    let event_type: String = row.get(2)?;
    let data: Option<String> = row.get(4)?;
    Ok(ApplyEvent {
        id: row.get(0)?,
        job_id: row.get(1)?,
        event_type: parse_column(2, &event_type, EventType::parse)?,
        node_id: row.get(3)?,
        data: data.as_deref().map(|d| json_column::<EventData>(4, d)).transpose()?,
        created_at: row.get(5)?,
    })
}

impl Database {
    /// Create a job in STARTED state together with its START event.
    pub fn create_job(&self, pipeline: PipelineId, direction: ApplyDirection) -> DbResult<ApplyJob> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO apply_jobs (pipeline_id, direction, status) VALUES (?, ?, ?)",
            params![pipeline, direction.as_str(), JobStatus::Started.as_str()],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO apply_events (job_id, event_type) VALUES (?, ?)",
            params![id, EventType::Start.as_str()],
        )?;
        tx.commit()?;

        debug!(job_id = id, pipeline_id = pipeline, direction = direction.as_str(), "Created job");
        self.get_job(id)
    }

    /// Load a job.
    pub fn get_job(&self, id: JobId) -> DbResult<ApplyJob> {
        self.conn
            .query_row(&format!("SELECT {JOB_COLUMNS} FROM apply_jobs WHERE id = ?"), [id], job_from_row)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("job {id}")))
    }

    /// List a pipeline's jobs, newest first.
    pub fn list_jobs(&self, pipeline: PipelineId) -> DbResult<Vec<ApplyJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM apply_jobs WHERE pipeline_id = ? ORDER BY created_at DESC, id DESC"
        ))?;
        let jobs = stmt.query_map([pipeline], job_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// List jobs of every pipeline that have not reached a terminal status,
    /// oldest first.
    pub fn list_unfinished_jobs(&self) -> DbResult<Vec<ApplyJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM apply_jobs WHERE status IN (?, ?) ORDER BY created_at, id"
        ))?;
        let jobs = stmt
            .query_map(params![JobStatus::Started.as_str(), JobStatus::Running.as_str()], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// List a job's events, newest first.
    pub fn list_events(&self, job: JobId) -> DbResult<Vec<ApplyEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM apply_events WHERE job_id = ? ORDER BY created_at DESC, id DESC"
        ))?;
        let events = stmt.query_map([job], event_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Load a single event.
    pub fn get_event(&self, id: EventId) -> DbResult<ApplyEvent> {
        self.conn
            .query_row(&format!("SELECT {EVENT_COLUMNS} FROM apply_events WHERE id = ?"), [id], event_from_row)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("event {id}")))
    }

    /// Move a job to a new status. Terminal jobs are immutable.
    pub fn set_job_status(&self, id: JobId, status: JobStatus) -> DbResult<()> {
        let current = self.get_job(id)?;
        if current.status.is_terminal() {
            return Err(patchbay_core::Error::JobFinished(id).into());
        }
        self.conn.execute("UPDATE apply_jobs SET status = ? WHERE id = ?", params![status.as_str(), id])?;
        Ok(())
    }

    /// Append an event to a job and return it.
    pub fn append_event(&self, job: JobId, event: &NewEvent) -> DbResult<ApplyEvent> {
        let data = event.data.as_ref().map(serde_json::to_string).transpose()?;
        self.conn.execute(
            "INSERT INTO apply_events (job_id, event_type, node_id, data) VALUES (?, ?, ?, ?)",
            params![job, event.event_type.as_str(), event.node_id, data],
        )?;
        self.get_event(self.conn.last_insert_rowid())
    }

    /// Append a FAILURE event carrying `reason` and mark the job FAILED.
    pub fn fail_job(&self, id: JobId, reason: &str) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.append_event(id, &NewEvent::new(EventType::Failure).with_data(EventData::graph_error(reason)))?;
        self.set_job_status(id, JobStatus::Failed)?;
        tx.commit()?;
        debug!(job_id = id, reason, "Job failed");
        Ok(())
    }
}

impl ApplyLedger for Database {
    fn set_job_status(&self, job: JobId, status: JobStatus) -> patchbay_core::Result<()> {
        Ok(Database::set_job_status(self, job, status)?)
    }

    fn append_event(&self, job: JobId, event: NewEvent) -> patchbay_core::Result<()> {
        Database::append_event(self, job, &event)?;
        Ok(())
    }

    fn set_pipeline_flags(&self, pipeline: PipelineId, flags: PipelineFlags) -> patchbay_core::Result<()> {
        Ok(Database::set_pipeline_flags(self, pipeline, flags)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::Map;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_create_job_logs_start() {
        let db = test_db();
        let p = db.create_pipeline("studio", "", true).unwrap();

        let job = db.create_job(p.id, ApplyDirection::Apply).expect("Failed to create job");
        assert_eq!(job.status, JobStatus::Started);
        assert_eq!(job.direction, ApplyDirection::Apply);

        let events = db.list_events(job.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Start);
        assert!(events[0].data.is_none());
    }

    #[test]
    fn test_events_newest_first() {
        let db = test_db();
        let p = db.create_pipeline("studio", "", true).unwrap();
        let job = db.create_job(p.id, ApplyDirection::Apply).unwrap();
        db.append_event(job.id, &NewEvent::new(EventType::Failure).with_data(EventData::graph_error("boom")))
            .unwrap();

        let events = db.list_events(job.id).unwrap();
        assert_eq!(events[0].event_type, EventType::Failure);
        assert_eq!(events[0].data, Some(EventData::graph_error("boom")));
        assert_eq!(events[1].event_type, EventType::Start);
    }

    #[test]
    fn test_jobs_newest_first() {
        let db = test_db();
        let p = db.create_pipeline("studio", "", true).unwrap();
        let first = db.create_job(p.id, ApplyDirection::Apply).unwrap();
        let second = db.create_job(p.id, ApplyDirection::Unapply).unwrap();

        let ids: Vec<_> = db.list_jobs(p.id).unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_list_unfinished_jobs() {
        let db = test_db();
        let studio = db.create_pipeline("studio", "", true).unwrap();
        let stage = db.create_pipeline("stage", "", true).unwrap();
        let queued = db.create_job(studio.id, ApplyDirection::Apply).unwrap();
        let running = db.create_job(stage.id, ApplyDirection::Unapply).unwrap();
        db.set_job_status(running.id, JobStatus::Running).unwrap();
        let done = db.create_job(studio.id, ApplyDirection::Apply).unwrap();
        db.set_job_status(done.id, JobStatus::Success).unwrap();

        let jobs = db.list_unfinished_jobs().expect("Failed to list unfinished jobs");
        let ids: Vec<_> = jobs.iter().map(|j| (j.id, j.status)).collect();
        assert_eq!(ids, vec![(queued.id, JobStatus::Started), (running.id, JobStatus::Running)]);
    }

    #[test]
    fn test_fail_job_records_reason() {
        let db = test_db();
        let p = db.create_pipeline("studio", "", true).unwrap();
        let job = db.create_job(p.id, ApplyDirection::Apply).unwrap();

        db.fail_job(job.id, "Worker pool is gone").expect("Failed to fail job");
        assert_eq!(db.get_job(job.id).unwrap().status, JobStatus::Failed);
        let events = db.list_events(job.id).unwrap();
        assert_eq!(events[0].data, Some(EventData::graph_error("Worker pool is gone")));

        // A finished job keeps its trail untouched
        assert!(db.fail_job(job.id, "again").is_err());
        assert_eq!(db.list_events(job.id).unwrap().len(), 2);
    }

    #[test]
    fn test_terminal_job_rejects_status_change() {
        let db = test_db();
        let p = db.create_pipeline("studio", "", true).unwrap();
        let job = db.create_job(p.id, ApplyDirection::Apply).unwrap();
        db.set_job_status(job.id, JobStatus::Failed).unwrap();

        assert_matches!(
            db.set_job_status(job.id, JobStatus::Running),
            Err(DbError::Core(patchbay_core::Error::JobFinished(_)))
        );
    }

    #[test]
    fn test_deleting_node_keeps_event_trail() {
        let db = test_db();
        let p = db.create_pipeline("studio", "", true).unwrap();
        let node = db.create_node(p.id, "pulseaudio.pipe", &Map::new()).unwrap();
        let job = db.create_job(p.id, ApplyDirection::Apply).unwrap();
        db.append_event(job.id, &NewEvent::new(EventType::StartedNode).for_node(node.id)).unwrap();

        db.delete_node(node.id).unwrap();

        let events = db.list_events(job.id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].node_id, None);
    }

    #[test]
    fn test_deleting_pipeline_drops_jobs() {
        let db = test_db();
        let p = db.create_pipeline("studio", "", true).unwrap();
        let job = db.create_job(p.id, ApplyDirection::Apply).unwrap();

        db.delete_pipeline(p.id).unwrap();
        assert_matches!(db.get_job(job.id), Err(DbError::NotFound(_)));
    }
}
