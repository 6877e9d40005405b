use super::constraints::DeviceMonitor;
use super::error::WorkError;
use super::handle::{SchedulerCommand, SharedWorkState, WorkManager};
use super::store::{RunOutcome, ScheduleUpdate, WorkSpec, WorkState, WorkStore};
use super::worker::{Worker, WorkerContext, WorkResult};
use crate::metrics;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing knobs for the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSettings {
    /// Longest a single run may take before it is cancelled and retried.
    pub execution_timeout: Duration,
    /// Longest the loop sleeps without looking at the store.
    pub max_idle: Duration,
    /// How soon due work held back by constraints is checked again.
    pub constraint_recheck: Duration,
    /// How long shutdown waits for running work.
    pub shutdown_grace: Duration,
}

impl Default for WorkSettings {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(10 * 60),
            max_idle: Duration::from_secs(60),
            constraint_recheck: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Admits, runs and reschedules periodic work.
pub struct WorkScheduler {
    /// Shared state accessible by WorkManager
    shared_state: Arc<RwLock<SharedWorkState>>,

    /// Task handles of in-progress runs, by unique name
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Spec id and cancellation token of in-progress runs, by unique name
    cancel_tokens: HashMap<String, (String, CancellationToken)>,

    store: Arc<dyn WorkStore>,

    device_monitor: Arc<dyn DeviceMonitor>,

    settings: WorkSettings,

    /// Receiver for commands from WorkManager
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Used by finished runs to wake the loop
    command_sender: mpsc::Sender<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,
}

impl WorkScheduler {
    pub fn new(
        store: Arc<dyn WorkStore>,
        device_monitor: Arc<dyn DeviceMonitor>,
        settings: WorkSettings,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        command_sender: mpsc::Sender<SchedulerCommand>,
        shutdown_token: CancellationToken,
        shared_state: Arc<RwLock<SharedWorkState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            cancel_tokens: HashMap::new(),
            store,
            device_monitor,
            settings,
            command_receiver,
            command_sender,
            shutdown_token,
        }
    }

    /// Register a worker under its name.
    pub async fn register_worker(&mut self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        info!("Registering worker: {} - {}", name, worker.description());
        let mut state = self.shared_state.write().await;
        state.workers.insert(name, worker);
    }

    pub async fn worker_count(&self) -> usize {
        self.shared_state.read().await.workers.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let worker_count = self.worker_count().await;
        info!("Starting work scheduler with {} registered workers", worker_count);

        match self.store.mark_interrupted_runs() {
            Ok(count) if count > 0 => {
                info!("Marked {} runs from previous process as interrupted", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to mark interrupted runs: {}", e);
            }
        }
        if let Err(e) = self.store.reset_running_work() {
            error!("Failed to re-enqueue running work: {}", e);
        }

        loop {
            self.cleanup_completed_runs().await;

            let sleep_duration = self.run_due_work().await;
            debug!("Scheduler sleeping for {:?}", sleep_duration);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {}
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Work scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Wake => {}
            SchedulerCommand::Cancel {
                unique_name,
                work_id,
            } => match self.cancel_tokens.get(&unique_name) {
                Some((running_id, token)) if *running_id == work_id => {
                    info!("Stopping running work: {}", unique_name);
                    token.cancel();
                }
                Some(_) => debug!(
                    "Ignoring stale cancel of {} ({}), a newer spec is running",
                    unique_name, work_id
                ),
                None => {}
            },
            SchedulerCommand::RunNow {
                unique_name,
                response,
            } => {
                let result = self.run_now(&unique_name).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger enqueued work by unique name.
    async fn run_now(&mut self, unique_name: &str) -> Result<(), WorkError> {
        let spec = self
            .store
            .get_work(unique_name)?
            .filter(|spec| spec.state.is_active())
            .ok_or_else(|| WorkError::NotFound(unique_name.to_string()))?;

        if self.shared_state.read().await.running.contains(unique_name) {
            return Err(WorkError::AlreadyRunning(unique_name.to_string()));
        }

        self.spawn_run(spec, "manual").await
    }

    /// Start every due, admissible spec and return how long to sleep before the
    /// next look.
    async fn run_due_work(&mut self) -> Duration {
        let specs = match self.store.list_work() {
            Ok(specs) => specs,
            Err(e) => {
                error!("Failed to load work specs: {}", e);
                return self.settings.max_idle;
            }
        };

        let now = Utc::now();
        let device = self.device_monitor.current_state();
        let mut next_wake = self.settings.max_idle;
        let mut due = Vec::new();

        {
            let state = self.shared_state.read().await;
            for spec in specs {
                if spec.state != WorkState::Enqueued || state.running.contains(&spec.unique_name)
                {
                    continue;
                }

                if spec.next_run_at > now {
                    let until = (spec.next_run_at - now).to_std().unwrap_or(Duration::ZERO);
                    next_wake = next_wake.min(until);
                    continue;
                }

                if !spec.constraints.is_satisfied_by(&device) {
                    debug!(
                        "Deferring work {}: unmet constraints {:?}",
                        spec.unique_name,
                        spec.constraints.unmet(&device)
                    );
                    metrics::record_constraint_deferral(&spec.unique_name);
                    next_wake = next_wake.min(self.settings.constraint_recheck);
                    continue;
                }

                due.push(spec);
            }
        }

        for spec in due {
            let unique_name = spec.unique_name.clone();
            if let Err(e) = self.spawn_run(spec, "schedule").await {
                warn!("Could not start work {}: {}", unique_name, e);
            }
        }

        next_wake
    }

    /// Spawn a run task for `spec`.
    async fn spawn_run(&mut self, spec: WorkSpec, triggered_by: &str) -> Result<(), WorkError> {
        let worker = {
            let state = self.shared_state.read().await;
            state
                .workers
                .get(&spec.worker_name)
                .cloned()
                .ok_or_else(|| WorkError::UnknownWorker(spec.worker_name.clone()))?
        };

        if !self.store.mark_running(&spec.id)? {
            return Err(WorkError::NotFound(spec.unique_name.clone()));
        }

        let run_id = match self.store.record_run_start(&spec, triggered_by) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to record run start for {}: {}", spec.unique_name, e);
                None
            }
        };

        info!(
            "Starting work: {} (run_id: {:?}, attempt: {}, triggered_by: {})",
            spec.unique_name, run_id, spec.run_attempt_count, triggered_by
        );

        let unique_name = spec.unique_name.clone();
        {
            let mut state = self.shared_state.write().await;
            state.running.insert(unique_name.clone());
        }
        metrics::set_work_running(&unique_name, true);

        let cancel_token = self.shutdown_token.child_token();
        self.cancel_tokens
            .insert(unique_name.clone(), (spec.id.clone(), cancel_token.clone()));

        let run = RunTask {
            spec,
            run_id,
            worker,
            cancel_token,
            execution_timeout: self.settings.execution_timeout,
            store: Arc::clone(&self.store),
            shared_state: Arc::clone(&self.shared_state),
            wake_tx: self.command_sender.clone(),
        };
        let handle = tokio::spawn(run.execute());

        self.running_handles.insert(unique_name, handle);
        Ok(())
    }

    /// Clean up handles for completed runs.
    async fn cleanup_completed_runs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        for unique_name in completed {
            if let Some(handle) = self.running_handles.remove(&unique_name) {
                let _ = handle.await;
            }
            self.cancel_tokens.remove(&unique_name);
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down work scheduler...");

        for (unique_name, (_, token)) in &self.cancel_tokens {
            debug!("Cancelling work: {}", unique_name);
            token.cancel();
        }

        for (unique_name, handle) in self.running_handles.drain() {
            if tokio::time::timeout(self.settings.shutdown_grace, handle)
                .await
                .is_err()
            {
                warn!("Work {} did not stop within {:?}", unique_name, self.settings.shutdown_grace);
            }
        }

        self.cancel_tokens.clear();
        info!("Work scheduler shutdown complete");
    }
}

/// Everything a single spawned run needs.
struct RunTask {
    spec: WorkSpec,
    run_id: Option<i64>,
    worker: Arc<dyn Worker>,
    cancel_token: CancellationToken,
    execution_timeout: Duration,
    store: Arc<dyn WorkStore>,
    shared_state: Arc<RwLock<SharedWorkState>>,
    wake_tx: mpsc::Sender<SchedulerCommand>,
}

impl RunTask {
    async fn execute(self) {
        let unique_name = self.spec.unique_name.clone();
        let start_time = Instant::now();

        let ctx = WorkerContext::new(
            self.cancel_token.clone(),
            unique_name.clone(),
            self.spec.run_attempt_count,
        );
        let worker = Arc::clone(&self.worker);
        let worker_ctx = ctx.clone();
        // Nested task so a panicking worker surfaces as a JoinError
        let mut worker_task = tokio::spawn(async move { worker.do_work(&worker_ctx).await });

        // None means the run was stopped before the worker reported a result
        let (result, error_message): (Option<WorkResult>, Option<String>) = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                worker_task.abort();
                (None, Some("Cancelled".to_string()))
            }
            joined = &mut worker_task => match joined {
                Ok(result) => (Some(result), ctx.error_message()),
                Err(e) => {
                    error!("Work {} panicked: {}", unique_name, e);
                    (Some(WorkResult::Failure), Some(format!("Task panic: {}", e)))
                }
            },
            _ = tokio::time::sleep(self.execution_timeout) => {
                self.cancel_token.cancel();
                worker_task.abort();
                warn!(
                    "Work {} exceeded its execution budget of {:?}",
                    unique_name, self.execution_timeout
                );
                (
                    Some(WorkResult::Retry),
                    Some(format!("Execution budget of {:?} exceeded", self.execution_timeout)),
                )
            }
        };

        let elapsed = start_time.elapsed();
        let outcome = result
            .map(RunOutcome::from)
            .unwrap_or(RunOutcome::Interrupted);

        match outcome {
            RunOutcome::Success => info!("Work {} succeeded in {:?}", unique_name, elapsed),
            RunOutcome::Interrupted => info!("Work {} was stopped after {:?}", unique_name, elapsed),
            _ => warn!(
                "Work {} finished with {} after {:?}: {}",
                unique_name,
                outcome.as_str(),
                elapsed,
                error_message.as_deref().unwrap_or("no details")
            ),
        }

        metrics::record_work_run(&unique_name, outcome.as_str(), elapsed);
        metrics::set_work_running(&unique_name, false);

        if let Some(run_id) = self.run_id {
            if let Err(e) = self.store.record_run_finish(run_id, outcome, error_message) {
                error!("Failed to record run finish for {}: {}", unique_name, e);
            }
        }

        let update = match result {
            Some(result) => self.spec.schedule_after(result, Utc::now()),
            None => ScheduleUpdate {
                next_run_at: self.spec.next_run_at,
                period_start_at: self.spec.period_start_at,
                run_attempt_count: self.spec.run_attempt_count,
            },
        };
        match self.store.finish_running(&self.spec.id, &update, outcome) {
            Ok(true) => debug!(
                "Next run of {} at {} (attempt {})",
                unique_name, update.next_run_at, update.run_attempt_count
            ),
            Ok(false) => info!(
                "Work {} was cancelled or replaced while running, not rescheduling it",
                unique_name
            ),
            Err(e) => error!("Failed to reschedule work {}: {}", unique_name, e),
        }

        {
            let mut state = self.shared_state.write().await;
            state.running.remove(&unique_name);
        }
        let _ = self.wake_tx.try_send(SchedulerCommand::Wake);
    }
}

/// Create a scheduler and its manager handle.
pub fn create_work_manager(
    store: Arc<dyn WorkStore>,
    device_monitor: Arc<dyn DeviceMonitor>,
    settings: WorkSettings,
    shutdown_token: CancellationToken,
) -> (WorkScheduler, WorkManager) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedWorkState {
        workers: HashMap::new(),
        running: HashSet::new(),
    }));

    let scheduler = WorkScheduler::new(
        store.clone(),
        device_monitor,
        settings,
        command_rx,
        command_tx.clone(),
        shutdown_token,
        Arc::clone(&shared_state),
    );

    let manager = WorkManager::new(command_tx, shared_state, store);

    (scheduler, manager)
}
