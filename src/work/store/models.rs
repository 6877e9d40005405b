use crate::work::backoff::BackoffCriteria;
use crate::work::constraints::Constraints;
use crate::work::request::PeriodicWorkRequest;
use crate::work::worker::WorkResult;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Lifecycle state of an enqueued periodic work spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// Waiting for its next run.
    Enqueued,
    /// A run is in progress.
    Running,
    /// Cancelled; never runs again.
    Cancelled,
}

impl WorkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkState::Enqueued => "enqueued",
            WorkState::Running => "running",
            WorkState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enqueued" => Some(WorkState::Enqueued),
            "running" => Some(WorkState::Running),
            "cancelled" => Some(WorkState::Cancelled),
            _ => None,
        }
    }

    /// Enqueued and running work both count as active for uniqueness.
    pub fn is_active(&self) -> bool {
        !matches!(self, WorkState::Cancelled)
    }
}

/// Outcome recorded for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    Success,
    Retry,
    Failure,
    /// The process stopped while the run was in progress.
    Interrupted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Running => "running",
            RunOutcome::Success => "success",
            RunOutcome::Retry => "retry",
            RunOutcome::Failure => "failure",
            RunOutcome::Interrupted => "interrupted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunOutcome::Running),
            "success" => Some(RunOutcome::Success),
            "retry" => Some(RunOutcome::Retry),
            "failure" => Some(RunOutcome::Failure),
            "interrupted" => Some(RunOutcome::Interrupted),
            _ => None,
        }
    }
}

impl From<WorkResult> for RunOutcome {
    fn from(result: WorkResult) -> Self {
        match result {
            WorkResult::Success => RunOutcome::Success,
            WorkResult::Retry => RunOutcome::Retry,
            WorkResult::Failure => RunOutcome::Failure,
        }
    }
}

/// Persisted form of periodic work enqueued under a unique name.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkSpec {
    pub id: String,
    pub unique_name: String,
    pub worker_name: String,
    pub repeat_interval: Duration,
    pub constraints: Constraints,
    pub backoff: BackoffCriteria,
    pub state: WorkState,
    /// Consecutive retries in the current period.
    pub run_attempt_count: u32,
    pub period_start_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub last_outcome: Option<RunOutcome>,
}

/// New schedule fields computed after a run finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleUpdate {
    pub next_run_at: DateTime<Utc>,
    pub period_start_at: DateTime<Utc>,
    pub run_attempt_count: u32,
}

impl WorkSpec {
    /// Spec for a freshly enqueued request. The first period starts right away.
    pub fn from_request(unique_name: &str, request: &PeriodicWorkRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            unique_name: unique_name.to_string(),
            worker_name: request.worker_name().to_string(),
            repeat_interval: request.repeat_interval(),
            constraints: *request.constraints(),
            backoff: *request.backoff(),
            state: WorkState::Enqueued,
            run_attempt_count: 0,
            period_start_at: now,
            next_run_at: now,
            enqueued_at: now,
            last_outcome: None,
        }
    }

    /// Compute when to run next given the result of the run that just ended.
    ///
    /// Success and failure both close the period. Retry keeps the period open
    /// and waits for the backoff delay of the next attempt.
    pub fn schedule_after(&self, result: WorkResult, now: DateTime<Utc>) -> ScheduleUpdate {
        match result {
            WorkResult::Success | WorkResult::Failure => ScheduleUpdate {
                next_run_at: now + to_chrono(self.repeat_interval),
                period_start_at: now,
                run_attempt_count: 0,
            },
            WorkResult::Retry => {
                let attempts = self.run_attempt_count.saturating_add(1);
                ScheduleUpdate {
                    next_run_at: now + to_chrono(self.backoff.delay_for(attempts)),
                    period_start_at: self.period_start_at,
                    run_attempt_count: attempts,
                }
            }
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// One row of run history.
#[derive(Debug, Clone)]
pub struct WorkRun {
    pub id: i64,
    pub work_id: String,
    pub unique_name: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
    pub error_message: Option<String>,
    /// "schedule", "manual", ...
    pub triggered_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::backoff::BackoffPolicy;

    fn daily_spec(now: DateTime<Utc>) -> WorkSpec {
        let request = PeriodicWorkRequest::builder("worker", Duration::from_secs(86400))
            .set_backoff_criteria(BackoffCriteria::new(
                BackoffPolicy::Exponential,
                Duration::from_secs(30),
            ))
            .build()
            .unwrap();
        WorkSpec::from_request("unique", &request, now)
    }

    #[test]
    fn test_from_request_is_due_immediately() {
        let now = Utc::now();
        let spec = daily_spec(now);

        assert_eq!(spec.state, WorkState::Enqueued);
        assert_eq!(spec.next_run_at, now);
        assert_eq!(spec.run_attempt_count, 0);
        assert_eq!(spec.repeat_interval, Duration::from_secs(86400));
        assert!(!spec.id.is_empty());
    }

    #[test]
    fn test_success_starts_new_period() {
        let start = Utc::now();
        let mut spec = daily_spec(start);
        spec.run_attempt_count = 3;

        let finished = start + chrono::Duration::seconds(90);
        let update = spec.schedule_after(WorkResult::Success, finished);

        assert_eq!(update.run_attempt_count, 0);
        assert_eq!(update.period_start_at, finished);
        assert_eq!(update.next_run_at, finished + chrono::Duration::days(1));
    }

    #[test]
    fn test_failure_waits_for_next_period() {
        let start = Utc::now();
        let spec = daily_spec(start);

        let update = spec.schedule_after(WorkResult::Failure, start);

        assert_eq!(update.run_attempt_count, 0);
        assert_eq!(update.next_run_at, start + chrono::Duration::days(1));
    }

    #[test]
    fn test_retry_applies_backoff_and_keeps_period() {
        let start = Utc::now();
        let mut spec = daily_spec(start);

        let first = spec.schedule_after(WorkResult::Retry, start);
        assert_eq!(first.run_attempt_count, 1);
        assert_eq!(first.next_run_at, start + chrono::Duration::seconds(30));
        assert_eq!(first.period_start_at, start);

        spec.run_attempt_count = first.run_attempt_count;
        let second = spec.schedule_after(WorkResult::Retry, start);
        assert_eq!(second.run_attempt_count, 2);
        assert_eq!(second.next_run_at, start + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_state_and_outcome_strings() {
        for state in [WorkState::Enqueued, WorkState::Running, WorkState::Cancelled] {
            assert_eq!(WorkState::parse(state.as_str()), Some(state));
        }
        assert!(WorkState::Running.is_active());
        assert!(!WorkState::Cancelled.is_active());

        assert_eq!(RunOutcome::from(WorkResult::Retry), RunOutcome::Retry);
        assert_eq!(RunOutcome::parse("interrupted"), Some(RunOutcome::Interrupted));
        assert_eq!(RunOutcome::parse("bogus"), None);
    }
}
