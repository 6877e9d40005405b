//! SQLite schema for the work database.
//!
//! Stores enqueued periodic work specs and the history of their runs.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Work specs and runs
// =============================================================================

/// One row per unique work name
const WORK_SPECS_TABLE_V1: Table = Table {
    name: "work_specs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // UUID
        sqlite_column!("unique_name", &SqlType::Text, non_null = true),
        sqlite_column!("worker_name", &SqlType::Text, non_null = true),
        sqlite_column!("interval_secs", &SqlType::Integer, non_null = true),
        sqlite_column!("constraints", &SqlType::Text, non_null = true), // JSON
        sqlite_column!("backoff_policy", &SqlType::Text, non_null = true),
        sqlite_column!("backoff_delay_secs", &SqlType::Integer, non_null = true),
        sqlite_column!("state", &SqlType::Text, non_null = true),
        sqlite_column!(
            "run_attempt_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("period_start_at", &SqlType::Text, non_null = true),
        sqlite_column!("next_run_at", &SqlType::Text, non_null = true),
        sqlite_column!("enqueued_at", &SqlType::Text, non_null = true),
        sqlite_column!("last_outcome", &SqlType::Text),
    ],
    indices: &[("idx_work_specs_state", "state")],
    unique_constraints: &[&["unique_name"]],
};

/// History of every run attempt
const WORK_RUNS_TABLE_V1: Table = Table {
    name: "work_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("work_id", &SqlType::Text, non_null = true),
        sqlite_column!("unique_name", &SqlType::Text, non_null = true),
        sqlite_column!("attempt", &SqlType::Integer, non_null = true),
        sqlite_column!("started_at", &SqlType::Text, non_null = true),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("outcome", &SqlType::Text, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("triggered_by", &SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_work_runs_unique_name", "unique_name, id DESC"),
        ("idx_work_runs_outcome", "outcome"),
    ],
    unique_constraints: &[],
};

pub const WORK_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[WORK_SPECS_TABLE_V1, WORK_RUNS_TABLE_V1],
    migration: None,
}];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_v1_schema_creates_successfully() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = &WORK_VERSIONED_SCHEMAS[0];
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();
    }

    #[test]
    fn test_unique_name_is_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        WORK_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        let insert = |id: &str| {
            conn.execute(
                "INSERT INTO work_specs (id, unique_name, worker_name, interval_secs, constraints,
                    backoff_policy, backoff_delay_secs, state, period_start_at, next_run_at, enqueued_at)
                 VALUES (?1, 'sync', 'worker', 86400, '{}', 'exponential', 30, 'enqueued', 'x', 'x', 'x')",
                [id],
            )
        };

        insert("a").unwrap();
        assert!(insert("b").is_err());
    }
}
