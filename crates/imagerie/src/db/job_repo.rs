//! Job repository over the `jobs` table and its stages.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{stage_repo, Database, DatabaseError};
use crate::jobs::{JobRecord, JobStatus};

// ─── Helpers ────────────────────────────────────────────────────────────────

pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

pub(crate) fn parse_optional_timestamp(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.map(parse_timestamp)
}

// ─── Outcomes ───────────────────────────────────────────────────────────────

/// Result of an atomic counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// The increment was applied; carries the counter's new value.
    Applied(u64),
    JobNotFound,
    StageNotFound,
    /// The job is terminal; the increment was dropped.
    JobTerminal(JobStatus),
    /// The increment would push `completed + failed` past the sealed total.
    WouldExceedTotal { processed: u64, total: u64 },
    /// The amount does not fit the stored counters.
    OutOfRange(u64),
}

impl IncrementOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, IncrementOutcome::Applied(_))
    }
}

// ─── Port ───────────────────────────────────────────────────────────────────

/// Persistence operations the progress engine needs from the document store.
pub trait JobRepository: Send + Sync {
    fn create_job(&self, job: &JobRecord) -> Result<(), DatabaseError>;

    fn get_job(&self, id: &str) -> Result<Option<JobRecord>, DatabaseError>;

    /// Writes every lifecycle field of `job` if its stored version still
    /// equals `job.version`, bumping the version. Counters and the error
    /// list are not written. Returns `false` on a version conflict or a
    /// missing row.
    fn update_job(&self, job: &JobRecord) -> Result<bool, DatabaseError>;

    /// Atomically adds `by` to a stage's completed counter.
    fn increment_stage(
        &self,
        job_id: &str,
        stage: &str,
        by: u64,
    ) -> Result<IncrementOutcome, DatabaseError>;

    /// Atomically adds `by` to a stage's failed counter and appends `error`.
    fn record_stage_failure(
        &self,
        job_id: &str,
        stage: &str,
        by: u64,
        error: &str,
    ) -> Result<IncrementOutcome, DatabaseError>;

    /// Atomically adds to the overall counters of a single-stage job.
    fn increment_items(
        &self,
        job_id: &str,
        completed: u64,
        failed: u64,
    ) -> Result<IncrementOutcome, DatabaseError>;

    /// [`update_job`](Self::update_job) that also appends `error` to the
    /// error list, in the same transaction and under the same version bump.
    fn update_job_with_error(&self, job: &JobRecord, error: &str) -> Result<bool, DatabaseError>;

    /// Ids of every job not yet in a terminal state.
    fn list_active_ids(&self) -> Result<Vec<String>, DatabaseError>;

    /// Sets the durable stale flag unless it is already set. Returns `true`
    /// only for the call that set it.
    fn mark_stale(&self, job_id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError>;
}

// ─── SQLite adapter ─────────────────────────────────────────────────────────

/// [`JobRepository`] backed by the shared SQLite [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteJobRepository {
    db: Database,
}

impl SqliteJobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn job_from_row(row: &Row<'_>) -> Result<(JobRecord, String, String), rusqlite::Error> {
    let status: String = row.get("status")?;
    let errors: String = row.get("errors")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let started_at: Option<String> = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let estimated: Option<String> = row.get("estimated_completion")?;
    let stale: Option<String> = row.get("stale_flagged_at")?;

    let job = JobRecord {
        id: row.get("id")?,
        job_type: row.get("job_type")?,
        is_multi_stage: row.get("is_multi_stage")?,
        collection_id: row.get("collection_id")?,
        stages: Vec::new(),
        status: JobStatus::Pending,
        total_items: row.get::<_, i64>("total_items")? as u64,
        completed_items: row.get::<_, i64>("completed_items")? as u64,
        failed_items: row.get::<_, i64>("failed_items")? as u64,
        errors: Vec::new(),
        message: row.get("message")?,
        version: row.get("version")?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        started_at: parse_optional_timestamp(started_at.as_deref()),
        completed_at: parse_optional_timestamp(completed_at.as_deref()),
        estimated_completion: parse_optional_timestamp(estimated.as_deref()),
        stale_flagged_at: parse_optional_timestamp(stale.as_deref()),
    };
    Ok((job, status, errors))
}

fn load_job(conn: &Connection, id: &str) -> Result<Option<JobRecord>, DatabaseError> {
    let row = conn
        .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], job_from_row)
        .optional()?;

    let Some((mut job, status, errors)) = row else {
        return Ok(None);
    };

    job.status = JobStatus::parse(&status).ok_or(DatabaseError::UnknownValue {
        field: "job status",
        value: status,
    })?;
    job.errors = serde_json::from_str(&errors).map_err(|e| DatabaseError::Json {
        column: "errors",
        source: e,
    })?;
    job.stages = stage_repo::load_all(conn, id)?;
    Ok(Some(job))
}

fn job_status(conn: &Connection, id: &str) -> Result<Option<JobStatus>, DatabaseError> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |r| {
            r.get(0)
        })
        .optional()?;
    match status {
        None => Ok(None),
        Some(s) => JobStatus::parse(&s)
            .map(Some)
            .ok_or(DatabaseError::UnknownValue {
                field: "job status",
                value: s,
            }),
    }
}

/// Works out why a guarded stage increment matched no row.
fn diagnose_stage_rejection(
    conn: &Connection,
    job_id: &str,
    stage: &str,
    by: u64,
) -> Result<IncrementOutcome, DatabaseError> {
    let Some(status) = job_status(conn, job_id)? else {
        return Ok(IncrementOutcome::JobNotFound);
    };
    if status.is_terminal() {
        return Ok(IncrementOutcome::JobTerminal(status));
    }
    match stage_repo::counters(conn, job_id, stage)? {
        None => Ok(IncrementOutcome::StageNotFound),
        Some((completed, failed, total, _)) => Ok(IncrementOutcome::WouldExceedTotal {
            processed: completed.saturating_add(failed).saturating_add(by),
            total,
        }),
    }
}

fn append_error_sql(conn: &Connection, job_id: &str, error: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET errors = json_insert(errors, '$[#]', ?2), version = version + 1,
         updated_at = ?3
         WHERE id = ?1",
        params![job_id, error, format_timestamp(Utc::now())],
    )?;
    Ok(changed > 0)
}

/// Versioned write of a job's lifecycle fields and stage rows, optionally
/// appending one error entry in the same statement.
fn write_job(
    conn: &Connection,
    job: &JobRecord,
    error: Option<&str>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET status = ?3, total_items = ?4, message = ?5,
         version = version + 1, updated_at = ?6, started_at = ?7, completed_at = ?8,
         estimated_completion = ?9,
         errors = CASE WHEN ?10 IS NULL THEN errors ELSE json_insert(errors, '$[#]', ?10) END
         WHERE id = ?1 AND version = ?2",
        params![
            job.id,
            job.version,
            job.status.as_str(),
            job.total_items as i64,
            job.message,
            format_timestamp(job.updated_at),
            job.started_at.map(format_timestamp),
            job.completed_at.map(format_timestamp),
            job.estimated_completion.map(format_timestamp),
            error,
        ],
    )?;
    if changed == 0 {
        return Ok(false);
    }
    for stage in &job.stages {
        stage_repo::write_lifecycle(conn, &job.id, stage)?;
    }
    Ok(true)
}

impl JobRepository for SqliteJobRepository {
    fn create_job(&self, job: &JobRecord) -> Result<(), DatabaseError> {
        let errors = serde_json::to_string(&job.errors).map_err(|e| DatabaseError::Json {
            column: "errors",
            source: e,
        })?;

        self.db.with_tx(|conn| {
            conn.execute(
                "INSERT INTO jobs (id, job_type, is_multi_stage, collection_id, status,
                 total_items, completed_items, failed_items, errors, message, version,
                 created_at, updated_at, started_at, completed_at, estimated_completion,
                 stale_flagged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    job.id,
                    job.job_type,
                    job.is_multi_stage,
                    job.collection_id,
                    job.status.as_str(),
                    job.total_items as i64,
                    job.completed_items as i64,
                    job.failed_items as i64,
                    errors,
                    job.message,
                    job.version,
                    format_timestamp(job.created_at),
                    format_timestamp(job.updated_at),
                    job.started_at.map(format_timestamp),
                    job.completed_at.map(format_timestamp),
                    job.estimated_completion.map(format_timestamp),
                    job.stale_flagged_at.map(format_timestamp),
                ],
            )?;
            stage_repo::insert_all(conn, &job.id, &job.stages)
        })
    }

    fn get_job(&self, id: &str) -> Result<Option<JobRecord>, DatabaseError> {
        self.db.with_conn(|conn| load_job(conn, id))
    }

    fn update_job(&self, job: &JobRecord) -> Result<bool, DatabaseError> {
        self.db.with_tx(|conn| write_job(conn, job, None))
    }

    fn update_job_with_error(&self, job: &JobRecord, error: &str) -> Result<bool, DatabaseError> {
        self.db.with_tx(|conn| write_job(conn, job, Some(error)))
    }

    fn increment_stage(
        &self,
        job_id: &str,
        stage: &str,
        by: u64,
    ) -> Result<IncrementOutcome, DatabaseError> {
        let Ok(amount) = i64::try_from(by) else {
            return Ok(IncrementOutcome::OutOfRange(by));
        };
        self.db.with_conn(|conn| {
            match stage_repo::increment_completed(conn, job_id, stage, amount)? {
                Some(value) => Ok(IncrementOutcome::Applied(value)),
                None => diagnose_stage_rejection(conn, job_id, stage, by),
            }
        })
    }

    fn record_stage_failure(
        &self,
        job_id: &str,
        stage: &str,
        by: u64,
        error: &str,
    ) -> Result<IncrementOutcome, DatabaseError> {
        let Ok(amount) = i64::try_from(by) else {
            return Ok(IncrementOutcome::OutOfRange(by));
        };
        self.db.with_tx(|conn| {
            match stage_repo::increment_failed(conn, job_id, stage, amount)? {
                Some(value) => {
                    append_error_sql(conn, job_id, error)?;
                    Ok(IncrementOutcome::Applied(value))
                }
                None => diagnose_stage_rejection(conn, job_id, stage, by),
            }
        })
    }

    fn increment_items(
        &self,
        job_id: &str,
        completed: u64,
        failed: u64,
    ) -> Result<IncrementOutcome, DatabaseError> {
        let amounts = completed.checked_add(failed).and_then(|by| {
            Some((
                i64::try_from(completed).ok()?,
                i64::try_from(failed).ok()?,
                i64::try_from(by).ok()?,
            ))
        });
        let Some((completed, failed, by)) = amounts else {
            return Ok(IncrementOutcome::OutOfRange(completed.saturating_add(failed)));
        };
        self.db.with_conn(|conn| {
            let value: Option<i64> = conn
                .query_row(
                    "UPDATE jobs SET completed_items = completed_items + ?2,
                     failed_items = failed_items + ?3
                     WHERE id = ?1 AND is_multi_stage = 0
                       AND ?4 <= 9223372036854775807 - completed_items - failed_items
                       AND status NOT IN ('completed', 'failed', 'cancelled')
                       AND (total_items = 0 OR completed_items + failed_items + ?4 <= total_items)
                     RETURNING completed_items",
                    params![job_id, completed, failed, by],
                    |r| r.get(0),
                )
                .optional()?;

            if let Some(value) = value {
                return Ok(IncrementOutcome::Applied(value as u64));
            }

            let row: Option<(String, bool, i64, i64, i64)> = conn
                .query_row(
                    "SELECT status, is_multi_stage, completed_items, failed_items, total_items
                     FROM jobs WHERE id = ?1",
                    params![job_id],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )
                .optional()?;

            match row {
                None => Ok(IncrementOutcome::JobNotFound),
                Some((_, true, ..)) => Ok(IncrementOutcome::StageNotFound),
                Some((status, false, done, failed_so_far, total)) => {
                    match JobStatus::parse(&status) {
                        Some(s) if s.is_terminal() => Ok(IncrementOutcome::JobTerminal(s)),
                        _ => Ok(IncrementOutcome::WouldExceedTotal {
                            processed: (done.saturating_add(failed_so_far) as u64)
                                .saturating_add(by as u64),
                            total: total as u64,
                        }),
                    }
                }
            }
        })
    }

    fn list_active_ids(&self) -> Result<Vec<String>, DatabaseError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM jobs
                 WHERE status NOT IN ('completed', 'failed', 'cancelled')
                 ORDER BY created_at ASC",
            )?;
            let ids = stmt
                .query_map([], |r| r.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    fn mark_stale(&self, job_id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE jobs SET stale_flagged_at = ?2
                 WHERE id = ?1 AND stale_flagged_at IS NULL",
                params![job_id, format_timestamp(at)],
            )?;
            Ok(changed > 0)
        })
    }
}
