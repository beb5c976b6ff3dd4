//! Stage rows in the `job_stages` table.
//!
//! These helpers take a bare `Connection` so that the job repository can
//! run them inside its own transaction.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::job_repo::{format_timestamp, parse_optional_timestamp};
use super::DatabaseError;
use crate::jobs::{StageState, StageStatus};

const TERMINAL_JOB_STATUSES: &str = "('completed', 'failed', 'cancelled')";

fn stage_from_row(row: &Row<'_>) -> Result<(StageState, String), rusqlite::Error> {
    let status: String = row.get("status")?;
    let started_at: Option<String> = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let stage = StageState {
        name: row.get("name")?,
        status: StageStatus::Pending,
        total: row.get::<_, i64>("total")? as u64,
        completed: row.get::<_, i64>("completed")? as u64,
        failed: row.get::<_, i64>("failed")? as u64,
        sealed: row.get("sealed")?,
        started_at: parse_optional_timestamp(started_at.as_deref()),
        completed_at: parse_optional_timestamp(completed_at.as_deref()),
        message: row.get("message")?,
    };
    Ok((stage, status))
}

/// Inserts the ordered stage list of a freshly created job.
pub fn insert_all(
    conn: &Connection,
    job_id: &str,
    stages: &[StageState],
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO job_stages (job_id, position, name, status, total, completed, failed,
         sealed, message, started_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for (position, stage) in stages.iter().enumerate() {
        stmt.execute(params![
            job_id,
            position as i64,
            stage.name,
            stage.status.as_str(),
            stage.total as i64,
            stage.completed as i64,
            stage.failed as i64,
            stage.sealed,
            stage.message,
            stage.started_at.map(format_timestamp),
            stage.completed_at.map(format_timestamp),
        ])?;
    }
    Ok(())
}

/// Loads a job's stages in their creation order.
pub fn load_all(conn: &Connection, job_id: &str) -> Result<Vec<StageState>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM job_stages WHERE job_id = ?1 ORDER BY position ASC")?;
    let rows = stmt
        .query_map(params![job_id], stage_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(mut stage, status)| {
            stage.status = StageStatus::parse(&status).ok_or(DatabaseError::UnknownValue {
                field: "stage status",
                value: status,
            })?;
            Ok(stage)
        })
        .collect()
}

/// Writes a stage's lifecycle fields. Counters are deliberately left out:
/// they only ever change through [`increment_completed`] and
/// [`increment_failed`].
pub fn write_lifecycle(
    conn: &Connection,
    job_id: &str,
    stage: &StageState,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE job_stages SET status = ?3, total = ?4, sealed = ?5, message = ?6,
         started_at = ?7, completed_at = ?8
         WHERE job_id = ?1 AND name = ?2",
        params![
            job_id,
            stage.name,
            stage.status.as_str(),
            stage.total as i64,
            stage.sealed,
            stage.message,
            stage.started_at.map(format_timestamp),
            stage.completed_at.map(format_timestamp),
        ],
    )?;
    Ok(())
}

/// Adds `by` to a stage's completed counter in one statement.
///
/// Returns the new value, or `None` when the guard rejected the update
/// (missing row, terminal job, a non-positive `by`, or a sum that would
/// exceed a sealed total or the column's range).
pub fn increment_completed(
    conn: &Connection,
    job_id: &str,
    stage: &str,
    by: i64,
) -> Result<Option<u64>, DatabaseError> {
    let sql = format!(
        "UPDATE job_stages SET completed = completed + ?3
         WHERE job_id = ?1 AND name = ?2 AND ?3 > 0
           AND ?3 <= {} - completed - failed
           AND (sealed = 0 OR completed + failed + ?3 <= total)
           AND EXISTS (SELECT 1 FROM jobs WHERE id = ?1 AND status NOT IN {})
         RETURNING completed",
        i64::MAX,
        TERMINAL_JOB_STATUSES
    );
    let value: Option<i64> = conn
        .query_row(&sql, params![job_id, stage, by], |r| r.get(0))
        .optional()?;
    Ok(value.map(|v| v as u64))
}

/// Adds `by` to a stage's failed counter in one statement. Same guard as
/// [`increment_completed`].
pub fn increment_failed(
    conn: &Connection,
    job_id: &str,
    stage: &str,
    by: i64,
) -> Result<Option<u64>, DatabaseError> {
    let sql = format!(
        "UPDATE job_stages SET failed = failed + ?3
         WHERE job_id = ?1 AND name = ?2 AND ?3 > 0
           AND ?3 <= {} - completed - failed
           AND (sealed = 0 OR completed + failed + ?3 <= total)
           AND EXISTS (SELECT 1 FROM jobs WHERE id = ?1 AND status NOT IN {})
         RETURNING failed",
        i64::MAX,
        TERMINAL_JOB_STATUSES
    );
    let value: Option<i64> = conn
        .query_row(&sql, params![job_id, stage, by], |r| r.get(0))
        .optional()?;
    Ok(value.map(|v| v as u64))
}

/// Reads `(completed, failed, total, sealed)` for diagnostics after a
/// rejected increment.
pub fn counters(
    conn: &Connection,
    job_id: &str,
    stage: &str,
) -> Result<Option<(u64, u64, u64, bool)>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT completed, failed, total, sealed FROM job_stages
             WHERE job_id = ?1 AND name = ?2",
            params![job_id, stage],
            |r| {
                Ok((
                    r.get::<_, i64>(0)? as u64,
                    r.get::<_, i64>(1)? as u64,
                    r.get::<_, i64>(2)? as u64,
                    r.get::<_, bool>(3)?,
                ))
            },
        )
        .optional()?;
    Ok(row)
}
