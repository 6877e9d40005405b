//! In-process daemon: work store, scheduler, refresh worker and bootstrap,
//! wired the way `main` wires them, with short scheduler timings.

use super::constants::RUN_TIMEOUT;
use devbyte_sync::refresh::{
    get_database, DatabaseVideo, DevByteRepositoryProvider, DevByteService, RefreshDataWorker,
    VideoDatabase, WORK_NAME,
};
use devbyte_sync::work::{
    create_work_manager, BackoffCriteria, DeviceState, NetworkState, RunOutcome, SdkLevel,
    SqliteWorkStore, StaticDeviceMonitor, WorkManager, WorkRun, WorkSettings,
};
use devbyte_sync::Application;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestDaemon {
    pub work_manager: WorkManager,
    videos_db_path: PathBuf,
    shutdown_token: CancellationToken,
    scheduler_task: Option<JoinHandle<()>>,
    _temp_dir: TempDir,
}

impl TestDaemon {
    /// A device that satisfies every refresh constraint.
    pub fn good_device() -> DeviceState {
        DeviceState {
            network: NetworkState {
                connected: true,
                metered: false,
                roaming: false,
            },
            battery_low: false,
            charging: true,
            idle: true,
            storage_low: false,
        }
    }

    /// Start the scheduler and run the bootstrap against `playlist_url`.
    pub async fn start(playlist_url: &str, device: DeviceState) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteWorkStore::new(temp_dir.path().join("work.db"))
                .expect("Failed to open work store"),
        );
        let settings = WorkSettings {
            execution_timeout: Duration::from_secs(10),
            max_idle: Duration::from_millis(200),
            constraint_recheck: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(2),
        };

        let shutdown_token = CancellationToken::new();
        let (mut scheduler, work_manager) = create_work_manager(
            store,
            Arc::new(StaticDeviceMonitor::new(device)),
            settings,
            shutdown_token.clone(),
        );

        let videos_db_path = temp_dir.path().join("videos.db");
        let service =
            DevByteService::new(playlist_url.to_string(), 5).expect("Failed to build client");
        let provider = Arc::new(DevByteRepositoryProvider::new(
            videos_db_path.clone(),
            service,
        ));
        scheduler
            .register_worker(Arc::new(RefreshDataWorker::new(provider)))
            .await;

        let scheduler_task = tokio::spawn(async move { scheduler.run().await });

        let application = Application::new(
            work_manager.clone(),
            Arc::new(SdkLevel(34)),
            BackoffCriteria::default(),
        );
        application
            .on_create()
            .expect("Bootstrap should run")
            .await
            .expect("Bootstrap task panicked");

        Self {
            work_manager,
            videos_db_path,
            shutdown_token,
            scheduler_task: Some(scheduler_task),
            _temp_dir: temp_dir,
        }
    }

    /// Wait for the first refresh run to finish and return it.
    ///
    /// # Panics
    ///
    /// Panics if no run finishes within [`RUN_TIMEOUT`].
    pub async fn wait_for_finished_run(&self) -> WorkRun {
        let deadline = tokio::time::Instant::now() + RUN_TIMEOUT;
        loop {
            let history = self
                .work_manager
                .get_run_history(WORK_NAME, 10)
                .expect("Failed to read run history");
            let finished = history
                .into_iter()
                .find(|run| run.outcome != RunOutcome::Running);
            // The spec is rescheduled after the run row is closed
            if let Some(run) = finished {
                if !self.work_manager.is_running(WORK_NAME).await {
                    return run;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "No refresh run finished within {:?}",
                RUN_TIMEOUT
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub fn stored_videos(&self) -> Vec<DatabaseVideo> {
        get_database(&self.videos_db_path)
            .expect("Failed to open video database")
            .get_videos()
            .expect("Failed to read videos")
    }

    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();
        if let Some(task) = self.scheduler_task.take() {
            task.await.expect("Scheduler task panicked");
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
