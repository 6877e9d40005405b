//! Durable periodic work scheduling.
//!
//! Work is enqueued under a unique name through [`WorkManager`], persisted in a
//! [`WorkStore`], and run by the [`WorkScheduler`] loop when it is due and its
//! [`Constraints`] hold against the current [`DeviceState`].

mod backoff;
mod constraints;
mod error;
mod handle;
mod request;
mod scheduler;
pub mod store;
mod worker;

pub use backoff::{
    BackoffCriteria, BackoffPolicy, DEFAULT_BACKOFF_DELAY, MAX_BACKOFF_DELAY, MIN_BACKOFF_DELAY,
};
#[cfg(feature = "mock")]
pub use constraints::{MockDeviceMonitor, MockPlatformCapabilities};
pub use constraints::{
    Constraints, ConstraintsBuilder, DeviceMonitor, DeviceState, NetworkState, NetworkType,
    PlatformCapabilities, SdkLevel, StaticDeviceMonitor, DEVICE_IDLE_MIN_SDK,
};
pub use error::WorkError;
pub use handle::{WorkInfo, WorkManager, WorkRunInfo};
pub use request::{
    EnqueueOutcome, ExistingPeriodicWorkPolicy, PeriodicWorkRequest, PeriodicWorkRequestBuilder,
    MIN_PERIODIC_INTERVAL,
};
pub use scheduler::{create_work_manager, WorkScheduler, WorkSettings};
pub use store::{
    EnqueueResult, RunOutcome, SqliteWorkStore, WorkRun, WorkSpec, WorkState, WorkStore,
};
pub use worker::{WorkResult, Worker, WorkerContext};
