//! Core job types and retry policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::TodoCadence;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job kind, used to route to the matching handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobKind {
    /// Apply timeout policies to stale approval nodes.
    ApprovalTimeoutScan,
    /// Walk unconfirmed notifications up the escalation ladder.
    EscalationScan,
    /// Remind owners of plans past their deadline.
    OverduePlanScan,
    /// Plan-tracking reminder at the given cadence.
    PlanTrackingTodo { cadence: TodoCadence },
    /// Plan-creation reminder at the given cadence.
    PlanCreationTodo { cadence: TodoCadence },
    /// Escape hatch for collaborator-defined jobs.
    Custom { name: String },
}

impl JobKind {
    /// Stable handler-routing key.
    pub fn type_name(&self) -> &str {
        match self {
            JobKind::ApprovalTimeoutScan => "approval_timeout_scan",
            JobKind::EscalationScan => "escalation_scan",
            JobKind::OverduePlanScan => "overdue_plan_scan",
            JobKind::PlanTrackingTodo { .. } => "plan_tracking_todo",
            JobKind::PlanCreationTodo { .. } => "plan_creation_todo",
            JobKind::Custom { name } => name,
        }
    }
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Will be retried after the backoff delay.
    Failed { error: String, attempt: u32 },
    /// Retries exhausted; parked for inspection.
    DeadLettered { error: String, attempts: u32 },
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::DeadLettered { .. } | JobStatus::Cancelled
        )
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    #[default]
    Exponential,
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts (0 means run once).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(600),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Delay before the given attempt (1-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => base_ms.saturating_mul(1 << (attempt - 1).min(32)),
            BackoffStrategy::Linear => base_ms.saturating_mul(attempt as u64),
        };
        Duration::from_millis(delay_ms.min(max_ms))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest execution time; `None` means ready now.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

/// One execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| now >= at)
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: true,
            error: None,
        });
    }

    /// Schedule a retry with backoff, or dead-letter when retries ran out.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: false,
            error: Some(error.clone()),
        });

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }
}

/// What a handler reports back.
#[derive(Debug)]
pub enum JobResult {
    Success,
    Failure(String),
}

/// Parked job for inspection and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(100),
            strategy: BackoffStrategy::Exponential,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(100));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn failure_schedules_retry_then_dead_letters() {
        let mut job = Job::new(JobKind::EscalationScan, serde_json::json!({}), t0())
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                ..Default::default()
            });

        job.mark_running(t0());
        job.mark_failed("notifier down".into(), t0(), t0());
        assert!(matches!(job.status, JobStatus::Failed { .. }));
        assert!(job.scheduled_at.is_some());

        job.mark_running(t0());
        job.mark_failed("notifier down".into(), t0(), t0());
        assert!(matches!(job.status, JobStatus::DeadLettered { .. }));
        assert_eq!(job.history.len(), 2);
    }

    #[test]
    fn readiness_respects_scheduled_at() {
        let job = Job::new(JobKind::OverduePlanScan, serde_json::json!({}), t0())
            .scheduled_at(t0() + chrono::Duration::minutes(10));
        assert!(!job.is_ready(t0()));
        assert!(job.is_ready(t0() + chrono::Duration::minutes(10)));
    }
}
