pub mod derive;
pub mod embed;
pub mod fetch;
pub mod segment;
pub mod transcribe;

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

/// Per-artifact failure taxonomy. Stage loops catch these, record them in
/// the run report, and continue with the next artifact — no stage error is
/// fatal to the run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("collaborator failed: {0}")]
    Collaborator(String),
    #[error("audio I/O failed: {0}")]
    Audio(String),
}

impl From<rusqlite::Error> for StageError {
    fn from(e: rusqlite::Error) -> Self {
        StageError::Store(e.to_string())
    }
}

impl StageError {
    /// Classify an error from a repository call as a store failure.
    pub fn store(e: anyhow::Error) -> Self {
        StageError::Store(format!("{e:#}"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub item: String,
    pub reason: String,
}

/// What one stage invocation did: every artifact it saw was either
/// processed, skipped by the idempotency guard, or failed with a reason.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<StageFailure>,
    pub duration_secs: f64,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        StageReport {
            stage,
            processed: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            duration_secs: 0.0,
        }
    }

    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, item: &str, err: &StageError) {
        self.failed += 1;
        self.failures.push(StageFailure {
            item: item.to_string(),
            reason: err.to_string(),
        });
    }

    pub fn status(&self) -> &'static str {
        if self.failed > 0 && self.processed == 0 {
            "failed"
        } else {
            "completed"
        }
    }
}

/// Record the start of a stage run. Returns the run ID.
pub fn start_stage_run(conn: &Connection, stage: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO stage_runs (stage, started_at, status)
         VALUES (?1, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'), 'running')",
        [stage],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Complete a stage run with final counts.
pub fn complete_stage_run(conn: &Connection, run_id: i64, report: &StageReport) -> Result<()> {
    conn.execute(
        "UPDATE stage_runs SET
            completed_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now'),
            processed = ?2,
            skipped = ?3,
            failed = ?4,
            status = ?5
         WHERE run_id = ?1",
        rusqlite::params![
            run_id,
            report.processed,
            report.skipped,
            report.failed,
            report.status()
        ],
    )?;
    Ok(())
}
