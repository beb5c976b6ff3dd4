//! Versioned schema upgrades.
//!
//! Each step runs in its own transaction together with its `_migrations`
//! bookkeeping row, so a crash mid-upgrade leaves the file at the last
//! complete version.

use rusqlite::{params, Connection, OptionalExtension};

use super::error::DatabaseError;

/// One schema step. `skip_if_column` names a `(table, column)` that, when
/// already present, marks the step as satisfied without running its SQL.
struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
    skip_if_column: Option<(&'static str, &'static str)>,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "jobs",
        sql: include_str!("sql/001_create_jobs.sql"),
        skip_if_column: None,
    },
    Step {
        version: 2,
        name: "job_stages",
        sql: include_str!("sql/002_create_job_stages.sql"),
        skip_if_column: None,
    },
    Step {
        version: 3,
        name: "collections",
        sql: include_str!("sql/003_create_collections.sql"),
        skip_if_column: None,
    },
    Step {
        version: 4,
        name: "jobs.stale_flagged_at",
        sql: include_str!("sql/004_add_stale_flag.sql"),
        skip_if_column: Some(("jobs", "stale_flagged_at")),
    },
];

/// Highest version this build knows about.
pub fn latest_version() -> u32 {
    STEPS.last().map(|s| s.version).unwrap_or(0)
}

/// Version recorded in the file, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn
        .query_row("SELECT MAX(version) FROM _migrations", [], |r| {
            r.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Brings the schema up to [`latest_version`].
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let from = schema_version(conn)?;
    if from > latest_version() {
        return Err(DatabaseError::Migration {
            version: from,
            reason: format!(
                "database schema is newer than this build (latest known: {})",
                latest_version()
            ),
        });
    }

    for step in STEPS.iter().filter(|s| s.version > from) {
        apply(conn, step)?;
    }
    Ok(())
}

fn apply(conn: &Connection, step: &Step) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: step.version,
        reason: e.to_string(),
    };

    let satisfied = match step.skip_if_column {
        Some((table, column)) => has_column(conn, table, column)?,
        None => false,
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    if satisfied {
        log::debug!("Schema v{} ({}) already present", step.version, step.name);
    } else {
        log::info!("Upgrading schema to v{} ({})", step.version, step.name);
        tx.execute_batch(step.sql).map_err(failed)?;
    }
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        params![step.version, step.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
