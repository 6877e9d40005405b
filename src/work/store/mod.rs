mod models;
mod schema;
mod sqlite_work_store;

pub use models::*;
pub use schema::WORK_VERSIONED_SCHEMAS;
pub use sqlite_work_store::SqliteWorkStore;

use crate::work::request::{EnqueueOutcome, ExistingPeriodicWorkPolicy};
use anyhow::Result;

/// What `enqueue_unique` did with a spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueResult {
    pub outcome: EnqueueOutcome,
    /// Id of the active spec removed by a replace.
    pub replaced_id: Option<String>,
}

pub trait WorkStore: Send + Sync {
    // Work specs
    /// Atomically apply `policy` and store `spec` under its unique name.
    fn enqueue_unique(
        &self,
        spec: &WorkSpec,
        policy: ExistingPeriodicWorkPolicy,
    ) -> Result<EnqueueResult>;
    fn get_work(&self, unique_name: &str) -> Result<Option<WorkSpec>>;
    /// All specs, ordered by unique name.
    fn list_work(&self) -> Result<Vec<WorkSpec>>;
    /// Returns the id of the active spec that is now cancelled, if there was one.
    fn cancel_work(&self, unique_name: &str) -> Result<Option<String>>;
    /// Move an enqueued spec to running. Returns false if it is no longer enqueued.
    fn mark_running(&self, work_id: &str) -> Result<bool>;
    /// Store the schedule computed after a run and move the spec back to
    /// enqueued. Returns false, leaving the row untouched, when the spec was
    /// cancelled or replaced while the run was in progress.
    fn finish_running(
        &self,
        work_id: &str,
        update: &ScheduleUpdate,
        outcome: RunOutcome,
    ) -> Result<bool>;
    /// Put specs left running by a previous process back in the queue.
    fn reset_running_work(&self) -> Result<usize>;

    // Run history
    fn record_run_start(&self, spec: &WorkSpec, triggered_by: &str) -> Result<i64>;
    fn record_run_finish(
        &self,
        run_id: i64,
        outcome: RunOutcome,
        error_message: Option<String>,
    ) -> Result<()>;
    /// Most recent runs first.
    fn get_run_history(&self, unique_name: &str, limit: usize) -> Result<Vec<WorkRun>>;
    fn get_last_run(&self, unique_name: &str) -> Result<Option<WorkRun>>;
    /// Mark runs still open from a previous process as interrupted.
    fn mark_interrupted_runs(&self) -> Result<usize>;
}
