//! Backoff applied when a worker asks to be retried.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay before the first retry.
pub const DEFAULT_BACKOFF_DELAY: Duration = Duration::from_secs(30);
/// Smallest accepted initial delay.
pub const MIN_BACKOFF_DELAY: Duration = Duration::from_secs(10);
/// Upper bound for any single retry delay.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(5 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// `initial * 2^(attempt - 1)`
    #[default]
    Exponential,
    /// `initial * attempt`
    Linear,
}

impl BackoffPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffPolicy::Exponential => "exponential",
            BackoffPolicy::Linear => "linear",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exponential" => Some(BackoffPolicy::Exponential),
            "linear" => Some(BackoffPolicy::Linear),
            _ => None,
        }
    }
}

/// Policy plus initial delay, attached to every periodic request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffCriteria {
    pub policy: BackoffPolicy,
    pub initial_delay: Duration,
}

impl BackoffCriteria {
    /// Build criteria, clamping the initial delay to
    /// [`MIN_BACKOFF_DELAY`, `MAX_BACKOFF_DELAY`].
    pub fn new(policy: BackoffPolicy, initial_delay: Duration) -> Self {
        Self {
            policy,
            initial_delay: initial_delay.clamp(MIN_BACKOFF_DELAY, MAX_BACKOFF_DELAY),
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `MAX_BACKOFF_DELAY`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let initial = self.initial_delay.as_secs_f64();
        let delay = match self.policy {
            BackoffPolicy::Exponential => initial * 2f64.powi(attempt as i32 - 1),
            BackoffPolicy::Linear => initial * attempt as f64,
        };
        Duration::from_secs_f64(delay.min(MAX_BACKOFF_DELAY.as_secs_f64()))
    }
}

impl Default for BackoffCriteria {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::Exponential,
            initial_delay: DEFAULT_BACKOFF_DELAY,
        }
    }
}
