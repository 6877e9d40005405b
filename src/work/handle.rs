use super::constraints::Constraints;
use super::error::WorkError;
use super::request::{EnqueueOutcome, ExistingPeriodicWorkPolicy, PeriodicWorkRequest};
use super::store::{WorkRun, WorkSpec, WorkStore};
use super::worker::Worker;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};

/// Information about enqueued work for queries.
#[derive(Debug, Clone, Serialize)]
pub struct WorkInfo {
    pub id: String,
    pub unique_name: String,
    pub worker_name: String,
    pub state: String,
    pub repeat_interval_secs: u64,
    pub constraints: Constraints,
    pub backoff_policy: String,
    pub initial_backoff_secs: u64,
    pub run_attempt_count: u32,
    pub next_run_at: String,
    pub enqueued_at: String,
    pub last_outcome: Option<String>,
    pub is_running: bool,
    pub last_run: Option<WorkRunInfo>,
}

/// Serializable run information.
#[derive(Debug, Clone, Serialize)]
pub struct WorkRunInfo {
    pub started_at: String,
    pub finished_at: Option<String>,
    pub outcome: String,
    pub attempt: u32,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

impl From<WorkRun> for WorkRunInfo {
    fn from(run: WorkRun) -> Self {
        WorkRunInfo {
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|dt| dt.to_rfc3339()),
            outcome: run.outcome.as_str().to_string(),
            attempt: run.attempt,
            error_message: run.error_message,
            triggered_by: run.triggered_by,
        }
    }
}

impl WorkInfo {
    fn from_spec(spec: WorkSpec, is_running: bool, last_run: Option<WorkRun>) -> Self {
        WorkInfo {
            id: spec.id,
            unique_name: spec.unique_name,
            worker_name: spec.worker_name,
            state: spec.state.as_str().to_string(),
            repeat_interval_secs: spec.repeat_interval.as_secs(),
            constraints: spec.constraints,
            backoff_policy: spec.backoff.policy.as_str().to_string(),
            initial_backoff_secs: spec.backoff.initial_delay.as_secs(),
            run_attempt_count: spec.run_attempt_count,
            next_run_at: spec.next_run_at.to_rfc3339(),
            enqueued_at: spec.enqueued_at.to_rfc3339(),
            last_outcome: spec.last_outcome.map(|o| o.as_str().to_string()),
            is_running,
            last_run: last_run.map(WorkRunInfo::from),
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    /// Re-evaluate due work now.
    Wake,
    /// Stop the in-progress run of this unique name if it belongs to `work_id`.
    Cancel {
        unique_name: String,
        work_id: String,
    },
    /// Start a run right away, ignoring timing and constraints.
    RunNow {
        unique_name: String,
        response: oneshot::Sender<Result<(), WorkError>>,
    },
}

/// Shared state between scheduler and manager.
pub struct SharedWorkState {
    /// Registered workers by name (set at registration, never changes)
    pub workers: HashMap<String, Arc<dyn Worker>>,
    /// Unique names with a run in progress
    pub running: HashSet<String>,
}

/// Handle to enqueue, cancel and inspect periodic work.
#[derive(Clone)]
pub struct WorkManager {
    /// Channel to send commands to the scheduler
    command_tx: mpsc::Sender<SchedulerCommand>,
    /// Shared state for reading workers and running work
    shared_state: Arc<RwLock<SharedWorkState>>,
    /// Durable specs and run history
    store: Arc<dyn WorkStore>,
}

impl WorkManager {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedWorkState>>,
        store: Arc<dyn WorkStore>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            store,
        }
    }

    /// Enqueue periodic work under `unique_name`, applying `policy` if work
    /// with that name is already active.
    pub async fn enqueue_unique_periodic_work(
        &self,
        unique_name: &str,
        policy: ExistingPeriodicWorkPolicy,
        request: PeriodicWorkRequest,
    ) -> Result<EnqueueOutcome, WorkError> {
        if unique_name.trim().is_empty() {
            return Err(WorkError::InvalidRequest(
                "unique name must not be empty".to_string(),
            ));
        }
        if !self.worker_exists(request.worker_name()).await {
            return Err(WorkError::UnknownWorker(request.worker_name().to_string()));
        }

        let spec = WorkSpec::from_request(unique_name, &request, Utc::now());
        let stored = self.store.enqueue_unique(&spec, policy)?;
        let outcome = stored.outcome;

        match outcome {
            EnqueueOutcome::Enqueued => {
                info!(
                    "Enqueued periodic work {} (worker: {}, every {:?})",
                    unique_name,
                    request.worker_name(),
                    request.repeat_interval()
                );
            }
            EnqueueOutcome::KeptExisting => {
                info!(
                    "Periodic work {} already enqueued, keeping existing and discarding new request",
                    unique_name
                );
                return Ok(outcome);
            }
            EnqueueOutcome::Replaced => {
                info!("Replaced periodic work {}", unique_name);
                if let Some(work_id) = stored.replaced_id {
                    self.stop_run(unique_name, work_id).await;
                }
            }
        }

        self.notify(SchedulerCommand::Wake);
        Ok(outcome)
    }

    /// Cancel the work enqueued under `unique_name`. Returns false if there was
    /// no active work under that name.
    pub async fn cancel_unique_work(&self, unique_name: &str) -> Result<bool, WorkError> {
        let Some(work_id) = self.store.cancel_work(unique_name)? else {
            return Ok(false);
        };
        info!("Cancelled periodic work {}", unique_name);
        self.stop_run(unique_name, work_id).await;
        Ok(true)
    }

    /// Get the work stored under `unique_name`. At most one entry is returned.
    pub async fn get_work_infos_for_unique_work(
        &self,
        unique_name: &str,
    ) -> Result<Vec<WorkInfo>, WorkError> {
        let Some(spec) = self.store.get_work(unique_name)? else {
            return Ok(Vec::new());
        };
        let is_running = self.is_running(unique_name).await;
        let last_run = self.store.get_last_run(unique_name)?;
        Ok(vec![WorkInfo::from_spec(spec, is_running, last_run)])
    }

    /// Get information about all stored work, sorted by unique name.
    pub async fn list_work(&self) -> Result<Vec<WorkInfo>, WorkError> {
        let specs = self.store.list_work()?;
        let state = self.shared_state.read().await;

        let mut infos = Vec::with_capacity(specs.len());
        for spec in specs {
            let is_running = state.running.contains(&spec.unique_name);
            let last_run = self.store.get_last_run(&spec.unique_name)?;
            infos.push(WorkInfo::from_spec(spec, is_running, last_run));
        }

        infos.sort_by(|a, b| a.unique_name.cmp(&b.unique_name));
        Ok(infos)
    }

    /// Trigger a run right away.
    pub async fn run_now(&self, unique_name: &str) -> Result<(), WorkError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::RunNow {
                unique_name: unique_name.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| WorkError::SchedulerUnavailable)?;

        response_rx
            .await
            .map_err(|_| WorkError::SchedulerUnavailable)?
    }

    /// Get run history, most recent first.
    pub fn get_run_history(
        &self,
        unique_name: &str,
        limit: usize,
    ) -> Result<Vec<WorkRun>, WorkError> {
        Ok(self.store.get_run_history(unique_name, limit)?)
    }

    /// Check if work is currently running.
    pub async fn is_running(&self, unique_name: &str) -> bool {
        let state = self.shared_state.read().await;
        state.running.contains(unique_name)
    }

    /// Check if a worker with the given name is registered.
    pub async fn worker_exists(&self, worker_name: &str) -> bool {
        let state = self.shared_state.read().await;
        state.workers.contains_key(worker_name)
    }

    /// Waits for room in the channel so the stop is never dropped.
    async fn stop_run(&self, unique_name: &str, work_id: String) {
        let cmd = SchedulerCommand::Cancel {
            unique_name: unique_name.to_string(),
            work_id,
        };
        if self.command_tx.send(cmd).await.is_err() {
            debug!("Scheduler not running, nothing to stop for {}", unique_name);
        }
    }

    fn notify(&self, cmd: SchedulerCommand) {
        if self.command_tx.try_send(cmd).is_err() {
            debug!("Scheduler not listening, it will pick up changes on its next pass");
        }
    }
}
