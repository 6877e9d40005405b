//! Periodic work requests and the policy applied when one is enqueued under a
//! name that is already taken.

use super::backoff::BackoffCriteria;
use super::constraints::Constraints;
use super::error::WorkError;
use std::time::Duration;
use tracing::warn;

/// Shortest repeat interval accepted for periodic work.
pub const MIN_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// What to do when periodic work with the same unique name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingPeriodicWorkPolicy {
    /// Keep the existing work and discard the new request.
    #[default]
    Keep,
    /// Cancel the existing work and enqueue the new request.
    Replace,
}

/// Result of enqueueing unique periodic work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// No active work existed under the name; the request was enqueued.
    Enqueued,
    /// Active work existed and was kept; the request was discarded.
    KeptExisting,
    /// Active work existed and was replaced by the request.
    Replaced,
}

/// A request to run a worker repeatedly.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicWorkRequest {
    worker_name: String,
    repeat_interval: Duration,
    constraints: Constraints,
    backoff: BackoffCriteria,
}

impl PeriodicWorkRequest {
    pub fn builder(
        worker_name: impl Into<String>,
        repeat_interval: Duration,
    ) -> PeriodicWorkRequestBuilder {
        PeriodicWorkRequestBuilder {
            worker_name: worker_name.into(),
            repeat_interval,
            constraints: Constraints::NONE,
            backoff: BackoffCriteria::default(),
        }
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    pub fn repeat_interval(&self) -> Duration {
        self.repeat_interval
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn backoff(&self) -> &BackoffCriteria {
        &self.backoff
    }
}

pub struct PeriodicWorkRequestBuilder {
    worker_name: String,
    repeat_interval: Duration,
    constraints: Constraints,
    backoff: BackoffCriteria,
}

impl PeriodicWorkRequestBuilder {
    pub fn set_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn set_backoff_criteria(mut self, backoff: BackoffCriteria) -> Self {
        self.backoff = backoff;
        self
    }

    /// Build the request. Intervals shorter than [`MIN_PERIODIC_INTERVAL`] are
    /// raised to it.
    pub fn build(self) -> Result<PeriodicWorkRequest, WorkError> {
        if self.worker_name.trim().is_empty() {
            return Err(WorkError::InvalidRequest(
                "worker name must not be empty".to_string(),
            ));
        }

        let repeat_interval = if self.repeat_interval < MIN_PERIODIC_INTERVAL {
            warn!(
                "Repeat interval {:?} for {} is below the minimum, using {:?}",
                self.repeat_interval, self.worker_name, MIN_PERIODIC_INTERVAL
            );
            MIN_PERIODIC_INTERVAL
        } else {
            self.repeat_interval
        };

        Ok(PeriodicWorkRequest {
            worker_name: self.worker_name,
            repeat_interval,
            constraints: self.constraints,
            backoff: self.backoff,
        })
    }
}
