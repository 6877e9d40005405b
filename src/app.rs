//! Process bootstrap: schedules the recurring playlist refresh.

use crate::refresh::{RefreshDataWorker, REFRESH_INTERVAL, WORK_NAME};
use crate::work::{
    BackoffCriteria, Constraints, EnqueueOutcome, ExistingPeriodicWorkPolicy, NetworkType,
    PeriodicWorkRequest, PlatformCapabilities, WorkError, WorkManager,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Conditions the refresh waits for: unmetered network, healthy battery,
/// charging, and an idle device where the platform can report it.
pub fn refresh_constraints(capabilities: &dyn PlatformCapabilities) -> Constraints {
    let device_idle = capabilities.supports_device_idle();
    Constraints::builder()
        .set_required_network_type(NetworkType::Unmetered)
        .set_requires_battery_not_low(true)
        .set_requires_charging(true)
        .apply(|builder| {
            if device_idle {
                builder.set_requires_device_idle(true)
            } else {
                builder
            }
        })
        .build()
}

pub fn refresh_work_request(
    capabilities: &dyn PlatformCapabilities,
    backoff: BackoffCriteria,
) -> Result<PeriodicWorkRequest, WorkError> {
    PeriodicWorkRequest::builder(RefreshDataWorker::NAME, REFRESH_INTERVAL)
        .set_constraints(refresh_constraints(capabilities))
        .set_backoff_criteria(backoff)
        .build()
}

/// Enqueue the daily refresh, keeping any refresh that is already scheduled.
pub async fn setup_recurring_work(
    work_manager: &WorkManager,
    capabilities: &dyn PlatformCapabilities,
    backoff: BackoffCriteria,
) -> Result<EnqueueOutcome, WorkError> {
    let request = refresh_work_request(capabilities, backoff)?;
    debug!("Periodic work request for sync is scheduled");

    work_manager
        .enqueue_unique_periodic_work(WORK_NAME, ExistingPeriodicWorkPolicy::Keep, request)
        .await
}

pub struct Application {
    work_manager: WorkManager,
    capabilities: Arc<dyn PlatformCapabilities>,
    backoff: BackoffCriteria,
    created: AtomicBool,
}

impl Application {
    pub fn new(
        work_manager: WorkManager,
        capabilities: Arc<dyn PlatformCapabilities>,
        backoff: BackoffCriteria,
    ) -> Self {
        Self {
            work_manager,
            capabilities,
            backoff,
            created: AtomicBool::new(false),
        }
    }

    /// Start background setup. Only the first call does anything; the
    /// returned handle may be dropped without affecting the setup.
    pub fn on_create(&self) -> Option<JoinHandle<()>> {
        if self.created.swap(true, Ordering::SeqCst) {
            warn!("Application already created, ignoring on_create");
            return None;
        }

        let work_manager = self.work_manager.clone();
        let capabilities = Arc::clone(&self.capabilities);
        let backoff = self.backoff;

        Some(tokio::spawn(async move {
            if let Err(e) =
                setup_recurring_work(&work_manager, capabilities.as_ref(), backoff).await
            {
                error!("Failed to schedule periodic refresh: {}", e);
            }
        }))
    }
}


#[cfg(all(test, feature = "mock"))]
mod mock_tests {
    use super::*;
    use crate::work::MockPlatformCapabilities;

    #[test]
    fn test_constraints_ask_capabilities_about_device_idle() {
        let mut capabilities = MockPlatformCapabilities::new();
        capabilities
            .expect_supports_device_idle()
            .times(1)
            .return_const(false);

        let constraints = refresh_constraints(&capabilities);

        assert!(!constraints.requires_device_idle);
        assert!(constraints.requires_charging);
    }
}
