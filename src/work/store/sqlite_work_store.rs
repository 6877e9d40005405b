use super::models::{RunOutcome, ScheduleUpdate, WorkRun, WorkSpec, WorkState};
use super::schema::WORK_VERSIONED_SCHEMAS;
use super::{EnqueueResult, WorkStore};
use crate::sqlite_persistence::open_versioned;
use crate::work::backoff::{BackoffCriteria, BackoffPolicy};
use crate::work::request::{EnqueueOutcome, ExistingPeriodicWorkPolicy};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const SPEC_COLUMNS: &str = "id, unique_name, worker_name, interval_secs, constraints, backoff_policy,
    backoff_delay_secs, state, run_attempt_count, period_start_at, next_run_at, enqueued_at,
    last_outcome";

const RUN_COLUMNS: &str =
    "id, work_id, unique_name, attempt, started_at, finished_at, outcome, error_message, triggered_by";

pub struct SqliteWorkStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWorkStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), WORK_VERSIONED_SCHEMAS, "work")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn insert_spec(conn: &Connection, spec: &WorkSpec) -> Result<()> {
        let constraints = serde_json::to_string(&spec.constraints)?;
        conn.execute(
            &format!(
                "INSERT INTO work_specs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                SPEC_COLUMNS
            ),
            params![
                spec.id,
                spec.unique_name,
                spec.worker_name,
                spec.repeat_interval.as_secs() as i64,
                constraints,
                spec.backoff.policy.as_str(),
                spec.backoff.initial_delay.as_secs() as i64,
                spec.state.as_str(),
                spec.run_attempt_count,
                Self::format_datetime(&spec.period_start_at),
                Self::format_datetime(&spec.next_run_at),
                Self::format_datetime(&spec.enqueued_at),
                spec.last_outcome.map(|o| o.as_str()),
            ],
        )?;
        Ok(())
    }

    fn row_to_spec(row: &rusqlite::Row) -> rusqlite::Result<WorkSpec> {
        let constraints_json: String = row.get("constraints")?;
        let constraints = serde_json::from_str(&constraints_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?;

        let state_str: String = row.get("state")?;
        let state = WorkState::parse(&state_str).unwrap_or(WorkState::Enqueued);

        let policy_str: String = row.get("backoff_policy")?;
        let policy = BackoffPolicy::parse(&policy_str).unwrap_or_default();
        let backoff_delay_secs: i64 = row.get("backoff_delay_secs")?;
        let interval_secs: i64 = row.get("interval_secs")?;

        let period_start_at: String = row.get("period_start_at")?;
        let next_run_at: String = row.get("next_run_at")?;
        let enqueued_at: String = row.get("enqueued_at")?;
        let last_outcome: Option<String> = row.get("last_outcome")?;

        Ok(WorkSpec {
            id: row.get("id")?,
            unique_name: row.get("unique_name")?,
            worker_name: row.get("worker_name")?,
            repeat_interval: Duration::from_secs(interval_secs.max(0) as u64),
            constraints,
            backoff: BackoffCriteria::new(
                policy,
                Duration::from_secs(backoff_delay_secs.max(0) as u64),
            ),
            state,
            run_attempt_count: row.get("run_attempt_count")?,
            period_start_at: Self::parse_datetime(&period_start_at),
            next_run_at: Self::parse_datetime(&next_run_at),
            enqueued_at: Self::parse_datetime(&enqueued_at),
            last_outcome: last_outcome.as_deref().and_then(RunOutcome::parse),
        })
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<WorkRun> {
        let outcome_str: String = row.get("outcome")?;
        let outcome = RunOutcome::parse(&outcome_str).unwrap_or(RunOutcome::Failure);

        let started_at_str: String = row.get("started_at")?;
        let finished_at_str: Option<String> = row.get("finished_at")?;

        Ok(WorkRun {
            id: row.get("id")?,
            work_id: row.get("work_id")?,
            unique_name: row.get("unique_name")?,
            attempt: row.get("attempt")?,
            started_at: Self::parse_datetime(&started_at_str),
            finished_at: finished_at_str.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            }),
            outcome,
            error_message: row.get("error_message")?,
            triggered_by: row.get("triggered_by")?,
        })
    }
}

impl WorkStore for SqliteWorkStore {
    fn enqueue_unique(
        &self,
        spec: &WorkSpec,
        policy: ExistingPeriodicWorkPolicy,
    ) -> Result<EnqueueResult> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT id, state FROM work_specs WHERE unique_name = ?1",
                params![spec.unique_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let mut replaced_id = None;
        let outcome = match existing {
            None => EnqueueOutcome::Enqueued,
            Some((existing_id, state_str)) => {
                let is_active = WorkState::parse(&state_str)
                    .map(|s| s.is_active())
                    .unwrap_or(false);

                if is_active && policy == ExistingPeriodicWorkPolicy::Keep {
                    debug!(
                        "Keeping existing work {} ({}) for {}",
                        existing_id, state_str, spec.unique_name
                    );
                    return Ok(EnqueueResult {
                        outcome: EnqueueOutcome::KeptExisting,
                        replaced_id: None,
                    });
                }

                tx.execute("DELETE FROM work_specs WHERE id = ?1", params![existing_id])?;
                if is_active {
                    replaced_id = Some(existing_id);
                    EnqueueOutcome::Replaced
                } else {
                    EnqueueOutcome::Enqueued
                }
            }
        };

        Self::insert_spec(&tx, spec)?;
        tx.commit()?;

        Ok(EnqueueResult {
            outcome,
            replaced_id,
        })
    }

    fn get_work(&self, unique_name: &str) -> Result<Option<WorkSpec>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM work_specs WHERE unique_name = ?1",
            SPEC_COLUMNS
        ))?;

        let spec = stmt
            .query_row(params![unique_name], Self::row_to_spec)
            .optional()?;

        Ok(spec)
    }

    fn list_work(&self) -> Result<Vec<WorkSpec>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM work_specs ORDER BY unique_name",
            SPEC_COLUMNS
        ))?;

        let specs = stmt
            .query_map([], Self::row_to_spec)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(specs)
    }

    fn cancel_work(&self, unique_name: &str) -> Result<Option<String>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let active_id: Option<String> = tx
            .query_row(
                "SELECT id FROM work_specs WHERE unique_name = ?1 AND state != ?2",
                params![unique_name, WorkState::Cancelled.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = &active_id {
            tx.execute(
                "UPDATE work_specs SET state = ?1 WHERE id = ?2",
                params![WorkState::Cancelled.as_str(), id],
            )?;
        }
        tx.commit()?;

        Ok(active_id)
    }

    fn mark_running(&self, work_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE work_specs SET state = ?1 WHERE id = ?2 AND state = ?3",
            params![
                WorkState::Running.as_str(),
                work_id,
                WorkState::Enqueued.as_str()
            ],
        )?;
        Ok(count > 0)
    }

    fn finish_running(
        &self,
        work_id: &str,
        update: &ScheduleUpdate,
        outcome: RunOutcome,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE work_specs
             SET state = ?1, next_run_at = ?2, period_start_at = ?3, run_attempt_count = ?4,
                 last_outcome = ?5
             WHERE id = ?6 AND state = ?7",
            params![
                WorkState::Enqueued.as_str(),
                Self::format_datetime(&update.next_run_at),
                Self::format_datetime(&update.period_start_at),
                update.run_attempt_count,
                outcome.as_str(),
                work_id,
                WorkState::Running.as_str()
            ],
        )?;
        Ok(count > 0)
    }

    fn reset_running_work(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE work_specs SET state = ?1 WHERE state = ?2",
            params![WorkState::Enqueued.as_str(), WorkState::Running.as_str()],
        )?;
        if count > 0 {
            info!("Re-enqueued {} work spec(s) left running", count);
        }
        Ok(count)
    }

    fn record_run_start(&self, spec: &WorkSpec, triggered_by: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "INSERT INTO work_runs (work_id, unique_name, attempt, started_at, outcome, triggered_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                spec.id,
                spec.unique_name,
                spec.run_attempt_count,
                now,
                RunOutcome::Running.as_str(),
                triggered_by
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn record_run_finish(
        &self,
        run_id: i64,
        outcome: RunOutcome,
        error_message: Option<String>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "UPDATE work_runs SET finished_at = ?1, outcome = ?2, error_message = ?3 WHERE id = ?4",
            params![now, outcome.as_str(), error_message, run_id],
        )?;

        Ok(())
    }

    fn get_run_history(&self, unique_name: &str, limit: usize) -> Result<Vec<WorkRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM work_runs WHERE unique_name = ?1 ORDER BY id DESC LIMIT ?2",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![unique_name, limit as i64], Self::row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(runs)
    }

    fn get_last_run(&self, unique_name: &str) -> Result<Option<WorkRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM work_runs WHERE unique_name = ?1 ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        ))?;

        let run = stmt
            .query_row(params![unique_name], Self::row_to_run)
            .optional()?;

        Ok(run)
    }

    fn mark_interrupted_runs(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());

        let count = conn.execute(
            "UPDATE work_runs SET outcome = ?1, finished_at = ?2, error_message = ?3
             WHERE outcome = ?4",
            params![
                RunOutcome::Interrupted.as_str(),
                now,
                "Run was interrupted (process restart)",
                RunOutcome::Running.as_str()
            ],
        )?;

        Ok(count)
    }
}
