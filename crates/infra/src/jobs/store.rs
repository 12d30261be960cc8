//! Job storage: the `JobStore` contract and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use payrun_payroll::PayPeriod;

use super::types::{Job, JobId, JobKind, JobOptions, JobPayload, JobState};

/// Job store abstraction.
///
/// Every state transition goes through this trait; a job is owned by the
/// store and callers only ever see snapshots.
pub trait JobStore: Send + Sync {
    /// Enqueue a new job in the `waiting` state.
    fn enqueue(&self, payload: JobPayload, options: JobOptions) -> Result<Job, JobStoreError>;

    /// Atomically claim the best ready job of `kind`, moving it to `active`.
    /// Returns `None` if nothing is ready.
    fn claim_next(&self, kind: JobKind) -> Result<Option<Job>, JobStoreError>;

    /// Record progress for an active job. Clamped to 100; lower values are ignored.
    fn update_progress(&self, id: JobId, percent: u8) -> Result<(), JobStoreError>;

    /// Mark an active job completed with its result.
    fn complete(&self, id: JobId, result: serde_json::Value) -> Result<Job, JobStoreError>;

    /// Record a failed attempt; schedules a retry or fails the job for good.
    fn fail(&self, id: JobId, reason: &str) -> Result<Job, JobStoreError>;

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Newest first. An empty `states` slice matches every state.
    fn list(
        &self,
        kind: Option<JobKind>,
        states: &[JobState],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// 1-based position among the pending jobs of the same kind, in claim
    /// order. `None` if the job is not pending.
    fn position(&self, id: JobId) -> Result<Option<usize>, JobStoreError>;

    /// A non-terminal payroll job for the same pay period, if any.
    fn find_duplicate(&self, period: &PayPeriod) -> Result<Option<Job>, JobStoreError>;

    /// Remove jobs in `state` that left the queue more than `older_than` ago.
    fn clean(&self, state: JobState, older_than: Duration) -> Result<usize, JobStoreError>;

    fn stats(&self, kind: Option<JobKind>) -> Result<JobStats, JobStoreError>;

    /// Fail (through the retry policy) every job of `kind` left `active` by a
    /// previous process.
    fn recover_active(&self, kind: JobKind, reason: &str) -> Result<Vec<JobId>, JobStoreError>;

    /// Check the backing broker is reachable.
    fn ping(&self) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {id} is {state}, cannot {action}")]
    InvalidTransition {
        id: JobId,
        state: JobState,
        action: &'static str,
    },
    #[error("job serialization error: {0}")]
    Serialization(String),
    #[error("job broker unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Job counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

impl JobStats {
    pub fn record(&mut self, state: JobState) {
        match state {
            JobState::Waiting => self.waiting += 1,
            JobState::Active => self.active += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
            JobState::Delayed => self.delayed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed + self.failed + self.delayed
    }
}

pub(crate) fn ensure_active(job: &Job, action: &'static str) -> Result<(), JobStoreError> {
    if job.state == JobState::Active {
        Ok(())
    } else {
        Err(JobStoreError::InvalidTransition {
            id: job.id,
            state: job.state,
            action,
        })
    }
}

pub(crate) fn is_duplicate_of(job: &Job, period: &PayPeriod) -> bool {
    job.kind == JobKind::PayrollRun
        && !job.state.is_terminal()
        && job.payload.pay_period() == period
}

pub(crate) fn newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

pub(crate) fn retention_cutoff(older_than: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// In-memory job store for tests/dev.
///
/// A single `RwLock` serializes every transition, so a claim can never hand
/// the same job to two workers.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))
    }

    fn with_job<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<T, JobStoreError>,
    ) -> Result<T, JobStoreError> {
        let mut jobs = self.write()?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        f(job)
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, payload: JobPayload, options: JobOptions) -> Result<Job, JobStoreError> {
        let job = Job::new(payload, options);
        self.write()?.insert(job.id, job.clone());
        Ok(job)
    }

    fn claim_next(&self, kind: JobKind) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.write()?;
        let now = Utc::now();

        let next = jobs
            .values()
            .filter(|j| j.kind == kind && j.is_ready(now))
            .min_by_key(|j| j.claim_key())
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_active(now);
                job.clone()
            })
        }))
    }

    fn update_progress(&self, id: JobId, percent: u8) -> Result<(), JobStoreError> {
        self.with_job(id, |job| {
            ensure_active(job, "report progress")?;
            job.set_progress(percent);
            Ok(())
        })
    }

    fn complete(&self, id: JobId, result: serde_json::Value) -> Result<Job, JobStoreError> {
        self.with_job(id, |job| {
            ensure_active(job, "complete")?;
            job.mark_completed(result, Utc::now());
            Ok(job.clone())
        })
    }

    fn fail(&self, id: JobId, reason: &str) -> Result<Job, JobStoreError> {
        self.with_job(id, |job| {
            ensure_active(job, "fail")?;
            job.mark_failed(reason, Utc::now());
            Ok(job.clone())
        })
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn list(
        &self,
        kind: Option<JobKind>,
        states: &[JobState],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.read()?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| kind.is_none_or(|k| j.kind == k))
            .filter(|j| states.is_empty() || states.contains(&j.state))
            .cloned()
            .collect();

        newest_first(&mut result);
        Ok(result.into_iter().skip(offset).take(limit).collect())
    }

    fn position(&self, id: JobId) -> Result<Option<usize>, JobStoreError> {
        let jobs = self.read()?;
        let Some(job) = jobs.get(&id).filter(|j| j.state.is_pending()) else {
            return Ok(None);
        };

        let key = job.claim_key();
        let ahead = jobs
            .values()
            .filter(|j| j.kind == job.kind && j.state.is_pending() && j.claim_key() < key)
            .count();
        Ok(Some(ahead + 1))
    }

    fn find_duplicate(&self, period: &PayPeriod) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.read()?;
        Ok(jobs
            .values()
            .filter(|j| is_duplicate_of(j, period))
            .min_by_key(|j| j.created_at)
            .cloned())
    }

    fn clean(&self, state: JobState, older_than: Duration) -> Result<usize, JobStoreError> {
        let cutoff = retention_cutoff(older_than);
        let mut jobs = self.write()?;
        let before = jobs.len();
        jobs.retain(|_, j| !(j.state == state && j.retention_timestamp() < cutoff));
        Ok(before - jobs.len())
    }

    fn stats(&self, kind: Option<JobKind>) -> Result<JobStats, JobStoreError> {
        let jobs = self.read()?;
        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| kind.is_none_or(|k| j.kind == k)) {
            stats.record(job.state);
        }
        Ok(stats)
    }

    fn recover_active(&self, kind: JobKind, reason: &str) -> Result<Vec<JobId>, JobStoreError> {
        let mut jobs = self.write()?;
        let now = Utc::now();
        let mut recovered = Vec::new();
        for job in jobs
            .values_mut()
            .filter(|j| j.kind == kind && j.state == JobState::Active)
        {
            job.mark_failed(reason, now);
            recovered.push(job.id);
        }
        Ok(recovered)
    }

    fn ping(&self) -> Result<(), JobStoreError> {
        self.read().map(|_| ())
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, payload: JobPayload, options: JobOptions) -> Result<Job, JobStoreError> {
        (**self).enqueue(payload, options)
    }

    fn claim_next(&self, kind: JobKind) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(kind)
    }

    fn update_progress(&self, id: JobId, percent: u8) -> Result<(), JobStoreError> {
        (**self).update_progress(id, percent)
    }

    fn complete(&self, id: JobId, result: serde_json::Value) -> Result<Job, JobStoreError> {
        (**self).complete(id, result)
    }

    fn fail(&self, id: JobId, reason: &str) -> Result<Job, JobStoreError> {
        (**self).fail(id, reason)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(id)
    }

    fn list(
        &self,
        kind: Option<JobKind>,
        states: &[JobState],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list(kind, states, limit, offset)
    }

    fn position(&self, id: JobId) -> Result<Option<usize>, JobStoreError> {
        (**self).position(id)
    }

    fn find_duplicate(&self, period: &PayPeriod) -> Result<Option<Job>, JobStoreError> {
        (**self).find_duplicate(period)
    }

    fn clean(&self, state: JobState, older_than: Duration) -> Result<usize, JobStoreError> {
        (**self).clean(state, older_than)
    }

    fn stats(&self, kind: Option<JobKind>) -> Result<JobStats, JobStoreError> {
        (**self).stats(kind)
    }

    fn recover_active(&self, kind: JobKind, reason: &str) -> Result<Vec<JobId>, JobStoreError> {
        (**self).recover_active(kind, reason)
    }

    fn ping(&self) -> Result<(), JobStoreError> {
        (**self).ping()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::tests::payroll_payload;
    use crate::jobs::types::{JobPriority, RetryPolicy};

    #[test]
    fn enqueue_and_claim() {
        let store = InMemoryJobStore::new();

        let job = store
            .enqueue(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default())
            .unwrap();
        assert_eq!(job.state, JobState::Waiting);

        let claimed = store.claim_next(JobKind::PayrollRun).unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.state, JobState::Active);
        assert!(claimed.processed_at.is_some());

        // No more jobs, and nothing of the other kind
        assert!(store.claim_next(JobKind::PayrollRun).unwrap().is_none());
        assert!(store.claim_next(JobKind::SendPayslip).unwrap().is_none());
    }

    #[test]
    fn claim_order_is_priority_then_fifo() {
        let store = InMemoryJobStore::new();
        let first = store
            .enqueue(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default())
            .unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let second = store
            .enqueue(payroll_payload("2024-02-01", "2024-02-29"), JobOptions::default())
            .unwrap();
        let urgent = store
            .enqueue(
                payroll_payload("2024-03-01", "2024-03-31"),
                JobOptions::default().priority(JobPriority::High),
            )
            .unwrap();

        assert_eq!(store.position(urgent.id).unwrap(), Some(1));
        assert_eq!(store.position(first.id).unwrap(), Some(2));
        assert_eq!(store.position(second.id).unwrap(), Some(3));

        let order: Vec<JobId> = (0..3)
            .map(|_| store.claim_next(JobKind::PayrollRun).unwrap().unwrap().id)
            .collect();
        assert_eq!(order, vec![urgent.id, first.id, second.id]);
        assert_eq!(store.position(first.id).unwrap(), None);
    }

    #[test]
    fn transitions_require_active_state() {
        let store = InMemoryJobStore::new();
        let job = store
            .enqueue(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default())
            .unwrap();

        assert!(matches!(
            store.complete(job.id, serde_json::json!({})),
            Err(JobStoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.fail(JobId::new(), "x"),
            Err(JobStoreError::NotFound(_))
        ));
    }

    #[test]
    fn failed_attempt_is_delayed_then_reclaimable() {
        let store = InMemoryJobStore::new();
        let job = store
            .enqueue(
                payroll_payload("2024-01-01", "2024-01-31"),
                JobOptions::with_retry(RetryPolicy::fixed(2, Duration::ZERO)),
            )
            .unwrap();

        store.claim_next(JobKind::PayrollRun).unwrap().unwrap();
        let failed = store.fail(job.id, "db down").unwrap();
        assert_eq!(failed.state, JobState::Delayed);
        assert_eq!(failed.attempts_made, 1);

        let reclaimed = store.claim_next(JobKind::PayrollRun).unwrap().unwrap();
        assert_eq!(reclaimed.id, job.id);
        let failed = store.fail(job.id, "db still down").unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("db still down"));
        assert!(store.claim_next(JobKind::PayrollRun).unwrap().is_none());
    }

    #[test]
    fn backoff_delay_blocks_claim() {
        let store = InMemoryJobStore::new();
        let job = store
            .enqueue(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default())
            .unwrap();

        store.claim_next(JobKind::PayrollRun).unwrap();
        let failed = store.fail(job.id, "transient").unwrap();
        let delay = failed.run_at.unwrap() - failed.updated_at;
        assert_eq!(delay, chrono::Duration::seconds(2));

        assert!(store.claim_next(JobKind::PayrollRun).unwrap().is_none());
    }

    #[test]
    fn progress_and_completion() {
        let store = InMemoryJobStore::new();
        let job = store
            .enqueue(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default())
            .unwrap();
        store.claim_next(JobKind::PayrollRun).unwrap();

        store.update_progress(job.id, 50).unwrap();
        store.update_progress(job.id, 20).unwrap();
        assert_eq!(store.get(job.id).unwrap().unwrap().progress, 50);

        let done = store.complete(job.id, serde_json::json!({"ok": true})).unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.result, Some(serde_json::json!({"ok": true})));
        assert!(store.update_progress(job.id, 10).is_err());
    }

    #[test]
    fn duplicate_detection_ignores_terminal_jobs() {
        let store = InMemoryJobStore::new();
        let payload = payroll_payload("2024-01-01", "2024-01-31");
        let period = *payload.pay_period();

        assert!(store.find_duplicate(&period).unwrap().is_none());
        let job = store.enqueue(payload, JobOptions::default()).unwrap();
        assert_eq!(store.find_duplicate(&period).unwrap().unwrap().id, job.id);

        store.claim_next(JobKind::PayrollRun).unwrap();
        assert_eq!(store.find_duplicate(&period).unwrap().unwrap().id, job.id);

        store.complete(job.id, serde_json::json!({})).unwrap();
        assert!(store.find_duplicate(&period).unwrap().is_none());
    }

    #[test]
    fn list_is_newest_first_with_paging() {
        let store = InMemoryJobStore::new();
        let ids: Vec<JobId> = [
            ("2024-01-01", "2024-01-31"),
            ("2024-02-01", "2024-02-29"),
            ("2024-03-01", "2024-03-31"),
        ]
        .iter()
        .map(|(start, end)| {
            std::thread::sleep(Duration::from_millis(2));
            store
                .enqueue(payroll_payload(start, end), JobOptions::default())
                .unwrap()
                .id
        })
        .collect();

        let all = store.list(Some(JobKind::PayrollRun), &[], 50, 0).unwrap();
        assert_eq!(all.iter().map(|j| j.id).collect::<Vec<_>>(), vec![ids[2], ids[1], ids[0]]);

        let page = store.list(None, &[JobState::Waiting], 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, ids[1]);

        assert!(store.list(None, &[JobState::Failed], 50, 0).unwrap().is_empty());
    }

    #[test]
    fn clean_removes_only_old_jobs_in_state() {
        let store = InMemoryJobStore::new();
        let job = store
            .enqueue(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default())
            .unwrap();
        store
            .enqueue(payroll_payload("2024-02-01", "2024-02-29"), JobOptions::default())
            .unwrap();
        store.claim_next(JobKind::PayrollRun).unwrap();
        store.complete(job.id, serde_json::json!({})).unwrap();

        assert_eq!(store.clean(JobState::Completed, Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(store.clean(JobState::Completed, Duration::ZERO).unwrap(), 1);
        assert!(store.get(job.id).unwrap().is_none());
        assert_eq!(store.stats(None).unwrap().waiting, 1);
    }

    #[test]
    fn recover_active_applies_retry_policy() {
        let store = InMemoryJobStore::new();
        let job = store
            .enqueue(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default())
            .unwrap();
        store.claim_next(JobKind::PayrollRun).unwrap();

        let recovered = store
            .recover_active(JobKind::PayrollRun, "worker restarted")
            .unwrap();
        assert_eq!(recovered, vec![job.id]);

        let job = store.get(job.id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Delayed);
        assert_eq!(job.last_error.as_deref(), Some("worker restarted"));
        assert!(store.recover_active(JobKind::SendPayslip, "x").unwrap().is_empty());
    }

    #[test]
    fn stats_tracking() {
        let store = InMemoryJobStore::new();

        for month in 1..=5 {
            let start = format!("2024-{month:02}-01");
            let end = format!("2024-{month:02}-28");
            store
                .enqueue(payroll_payload(&start, &end), JobOptions::default())
                .unwrap();
        }

        let stats = store.stats(Some(JobKind::PayrollRun)).unwrap();
        assert_eq!(stats.waiting, 5);

        store.claim_next(JobKind::PayrollRun).unwrap();
        store.claim_next(JobKind::PayrollRun).unwrap();

        let stats = store.stats(None).unwrap();
        assert_eq!(stats.waiting, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.total(), 5);
        assert_eq!(store.stats(Some(JobKind::SendPayslip)).unwrap().total(), 0);
    }
}
