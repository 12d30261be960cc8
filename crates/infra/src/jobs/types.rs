//! Core job types and policies.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use payrun_payroll::{PayPeriod, PayrollJobRequest};

use crate::notifications::PayslipNotification;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
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

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job kind, derived from the payload. Each kind is served by its own lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    PayrollRun,
    SendPayslip,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::PayrollRun => "payroll_run",
            JobKind::SendPayslip => "send_payslip",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of job payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum JobPayload {
    PayrollRun(PayrollJobRequest),
    SendPayslip(PayslipNotification),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::PayrollRun(_) => JobKind::PayrollRun,
            JobPayload::SendPayslip(_) => JobKind::SendPayslip,
        }
    }

    pub fn pay_period(&self) -> &PayPeriod {
        match self {
            JobPayload::PayrollRun(request) => &request.pay_period,
            JobPayload::SendPayslip(notification) => &notification.pay_period,
        }
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, waiting to be picked up
    Waiting,
    /// Claimed by a worker
    Active,
    Completed,
    /// Exhausted its attempts
    Failed,
    /// Failed attempt, retry scheduled at `run_at`
    Delayed,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
        JobState::Delayed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Waiting or delayed: may be claimed once ready.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim priority. Declaration order is claim order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt-1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first (0 and 1 both mean "no retries")
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::payroll_run()
    }
}

impl RetryPolicy {
    /// Payroll lane: 3 attempts, exponential from 2s.
    pub fn payroll_run() -> Self {
        Self::exponential(3, Duration::from_secs(2), Duration::from_secs(600))
    }

    /// Notification lane: 5 attempts, exponential from 1s.
    pub fn send_payslip() -> Self {
        Self::exponential(5, Duration::from_secs(1), Duration::from_secs(600))
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::payroll_run()
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

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    /// (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };

        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Enqueue-time options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub priority: JobPriority,
    pub retry: RetryPolicy,
}

impl JobOptions {
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Record of a job execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A queued unit of work and everything the queue knows about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub state: JobState,
    pub priority: JobPriority,
    /// Percent complete, 0..=100, never decreases
    pub progress: u8,
    /// Failed attempts so far
    pub attempts_made: u32,
    pub retry: RetryPolicy,
    /// Handler output; set only once completed
    pub result: Option<serde_json::Value>,
    /// Set only once failed
    pub failure_reason: Option<String>,
    /// Error of the most recent failed attempt
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Start of the current (or last) attempt
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Earliest claim time for a delayed job
    pub run_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

impl Job {
    pub fn new(payload: JobPayload, options: JobOptions) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind: payload.kind(),
            payload,
            state: JobState::Waiting,
            priority: options.priority,
            progress: 0,
            attempts_made: 0,
            retry: options.retry,
            result: None,
            failure_reason: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
            finished_at: None,
            run_at: None,
            history: Vec::new(),
        }
    }

    /// Claimable at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Waiting => true,
            JobState::Delayed => self.run_at.is_none_or(|at| at <= now),
            _ => false,
        }
    }

    /// Claim order key: priority, then FIFO.
    pub fn claim_key(&self) -> (JobPriority, DateTime<Utc>, JobId) {
        (self.priority, self.created_at, self.id)
    }

    /// Attempt number currently running (1-indexed).
    pub fn current_attempt(&self) -> u32 {
        self.attempts_made + 1
    }

    pub fn mark_active(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.processed_at = Some(now);
        self.run_at = None;
        self.progress = 0;
        self.updated_at = now;
    }

    /// Apply a progress report. Returns whether the stored value changed.
    pub fn set_progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if percent <= self.progress {
            return false;
        }
        self.progress = percent;
        self.updated_at = Utc::now();
        true
    }

    pub fn mark_completed(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.push_attempt(now, None);
        self.state = JobState::Completed;
        self.result = Some(result);
        self.progress = 100;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Record a failed attempt and either schedule a retry or fail for good.
    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        let reason = reason.into();
        self.push_attempt(now, Some(reason.clone()));
        self.attempts_made += 1;
        self.last_error = Some(reason.clone());
        self.updated_at = now;

        if self.retry.should_retry(self.attempts_made) {
            let delay = self.retry.delay_for_attempt(self.attempts_made);
            self.state = JobState::Delayed;
            self.run_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
        } else {
            self.state = JobState::Failed;
            self.failure_reason = Some(reason);
            self.finished_at = Some(now);
        }
    }

    /// When this job left the queue, for retention purposes.
    pub fn retention_timestamp(&self) -> DateTime<Utc> {
        self.finished_at.unwrap_or(self.updated_at)
    }

    fn push_attempt(&mut self, now: DateTime<Utc>, error: Option<String>) {
        let started_at = self.processed_at.unwrap_or(now);
        self.history.push(JobAttemptRecord {
            attempt: self.current_attempt(),
            started_at,
            finished_at: now,
            success: error.is_none(),
            error,
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });
    }
}
