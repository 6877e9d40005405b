use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Outcome reported by a worker for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    /// The work finished; the next run happens one interval from now.
    Success,
    /// The work failed transiently; run again after the backoff delay.
    Retry,
    /// The work failed permanently for this period.
    Failure,
}

impl WorkResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkResult::Success => "success",
            WorkResult::Retry => "retry",
            WorkResult::Failure => "failure",
        }
    }
}

/// Context handed to a worker for one run.
#[derive(Clone)]
pub struct WorkerContext {
    /// Fires when the work is cancelled, the execution budget runs out or the
    /// scheduler shuts down.
    pub cancellation_token: CancellationToken,

    /// Unique name the work was enqueued under.
    pub unique_name: String,

    /// Number of consecutive retries before this run (0 on a fresh period).
    pub run_attempt_count: u32,

    error_message: Arc<Mutex<Option<String>>>,
}

impl WorkerContext {
    pub fn new(
        cancellation_token: CancellationToken,
        unique_name: impl Into<String>,
        run_attempt_count: u32,
    ) -> Self {
        Self {
            cancellation_token,
            unique_name: unique_name.into(),
            run_attempt_count,
            error_message: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Attach a message to this run's history entry. The last call wins.
    pub fn set_error_message(&self, message: impl Into<String>) {
        *self.error_message.lock().unwrap() = Some(message.into());
    }

    pub fn error_message(&self) -> Option<String> {
        self.error_message.lock().unwrap().clone()
    }
}

/// A unit of background work the scheduler can invoke.
///
/// Workers are registered once under [`Worker::name`] and referenced by that
/// name from periodic requests.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Registry key for this worker.
    fn name(&self) -> &'static str;

    /// Description of what this worker does.
    fn description(&self) -> &'static str;

    /// Perform the work once.
    ///
    /// Called from a tokio task with no caller-supplied input. Long operations
    /// should watch `ctx.cancellation_token`.
    async fn do_work(&self, ctx: &WorkerContext) -> WorkResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_error_message_is_shared_between_clones() {
        let ctx = WorkerContext::new(CancellationToken::new(), "sync", 2);
        let clone = ctx.clone();

        assert!(ctx.error_message().is_none());
        clone.set_error_message("first");
        clone.set_error_message("second");

        assert_eq!(ctx.error_message().as_deref(), Some("second"));
        assert_eq!(ctx.run_attempt_count, 2);
        assert!(!ctx.is_cancelled());
    }
}
