//! Redis-backed job store (durable broker).
//!
//! ## Layout
//!
//! - `{prefix}:job:{id}`: the job, JSON encoded
//! - `{prefix}:jobs:{kind}`: set of job ids of that kind
//!
//! Every transition is a read-modify-write of the job key under
//! `WATCH`/`MULTI`/`EXEC`. If another process touches the key in between, the
//! transaction aborts and the transition is re-evaluated against the fresh
//! value, so a job can only be claimed once. Retention sweeps watch every key
//! they delete the same way.
//!
//! Connections come from an `r2d2` pool and are held for one store operation,
//! so a `WATCH` and its `EXEC` always share a connection.

use std::time::Duration;

use chrono::Utc;
use redis::{Commands, Connection};
use tracing::{debug, instrument};

use payrun_payroll::PayPeriod;

use super::store::{
    JobStats, JobStore, JobStoreError, ensure_active, is_duplicate_of, newest_first,
    retention_cutoff,
};
use super::types::{Job, JobId, JobKind, JobOptions, JobPayload, JobState};

/// Default key prefix.
const DEFAULT_PREFIX: &str = "payrun";

/// Pooled connections per store: executor lanes plus HTTP handlers.
const POOL_SIZE: u32 = 8;
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

type PooledConnection = r2d2::PooledConnection<redis::Client>;

const ALL_KINDS: [JobKind; 2] = [JobKind::PayrollRun, JobKind::SendPayslip];

#[derive(Clone)]
pub struct RedisJobStore {
    pool: r2d2::Pool<redis::Client>,
    prefix: String,
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("prefix", &self.prefix)
            .field("pool", &self.pool.state())
            .finish()
    }
}

impl RedisJobStore {
    /// Create a store for `redis_url` (e.g. "redis://localhost:6379").
    /// Connections are opened lazily; use [`JobStore::ping`] to check
    /// reachability.
    pub fn new(redis_url: impl AsRef<str>, prefix: Option<String>) -> Result<Self, JobStoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| JobStoreError::Unavailable(e.to_string()))?;

        let pool = r2d2::Pool::builder()
            .max_size(POOL_SIZE)
            .min_idle(Some(0))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build_unchecked(client);

        Ok(Self {
            pool,
            prefix: prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        })
    }

    fn conn(&self) -> Result<PooledConnection, JobStoreError> {
        self.pool
            .get()
            .map_err(|e| JobStoreError::Unavailable(e.to_string()))
    }

    fn job_key(&self, id: JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    fn index_key(&self, kind: JobKind) -> String {
        format!("{}:jobs:{}", self.prefix, kind.as_str())
    }

    fn load_kind(&self, conn: &mut Connection, kind: JobKind) -> Result<Vec<Job>, JobStoreError> {
        let ids: Vec<String> = conn.smembers(self.index_key(kind)).map_err(command_error)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| format!("{}:job:{}", self.prefix, id))
            .collect();
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query(conn)
            .map_err(command_error)?;

        // Ids whose key is gone were removed by a concurrent clean.
        raw.into_iter().flatten().map(|s| decode(&s)).collect()
    }

    fn load(&self, conn: &mut Connection, kind: Option<JobKind>) -> Result<Vec<Job>, JobStoreError> {
        match kind {
            Some(kind) => self.load_kind(conn, kind),
            None => {
                let mut jobs = Vec::new();
                for kind in ALL_KINDS {
                    jobs.extend(self.load_kind(conn, kind)?);
                }
                Ok(jobs)
            }
        }
    }

    fn watched_jobs(&self, conn: &mut Connection, keys: &[String]) -> Result<Vec<Job>, JobStoreError> {
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query(conn)
            .map_err(command_error)?;
        raw.into_iter().flatten().map(|s| decode(&s)).collect()
    }

    /// Optimistic read-modify-write of a single job.
    fn mutate<T>(
        &self,
        conn: &mut Connection,
        id: JobId,
        mut apply: impl FnMut(&mut Job) -> Result<T, JobStoreError>,
    ) -> Result<(Job, T), JobStoreError> {
        let key = self.job_key(id);

        loop {
            redis::cmd("WATCH")
                .arg(&key)
                .query::<()>(conn)
                .map_err(command_error)?;

            let raw: Option<String> = conn.get(&key).map_err(command_error)?;
            let outcome = raw
                .ok_or(JobStoreError::NotFound(id))
                .and_then(|raw| decode(&raw))
                .and_then(|mut job| apply(&mut job).map(|out| (job, out)));

            let (job, out) = match outcome {
                Ok(v) => v,
                Err(e) => {
                    let _ = redis::cmd("UNWATCH").query::<()>(conn);
                    return Err(e);
                }
            };

            let committed: Option<()> = redis::pipe()
                .atomic()
                .set(&key, encode(&job)?)
                .ignore()
                .query(conn)
                .map_err(command_error)?;

            if committed.is_some() {
                return Ok((job, out));
            }
            debug!(job_id = %id, "concurrent job update; retrying transition");
        }
    }
}

impl JobStore for RedisJobStore {
    #[instrument(skip(self, payload, options), fields(kind = %payload.kind()), err)]
    fn enqueue(&self, payload: JobPayload, options: JobOptions) -> Result<Job, JobStoreError> {
        let job = Job::new(payload, options);
        let mut conn = self.conn()?;

        redis::pipe()
            .atomic()
            .set(self.job_key(job.id), encode(&job)?)
            .ignore()
            .sadd(self.index_key(job.kind), job.id.to_string())
            .ignore()
            .query::<()>(&mut *conn)
            .map_err(command_error)?;

        Ok(job)
    }

    fn claim_next(&self, kind: JobKind) -> Result<Option<Job>, JobStoreError> {
        let mut conn = self.conn()?;
        let now = Utc::now();

        let mut candidates: Vec<Job> = self
            .load_kind(&mut conn, kind)?
            .into_iter()
            .filter(|j| j.is_ready(now))
            .collect();
        candidates.sort_by_key(|j| j.claim_key());

        for candidate in candidates {
            let claimed = self.mutate(&mut conn, candidate.id, |job| {
                if job.is_ready(now) {
                    job.mark_active(now);
                    Ok(())
                } else {
                    Err(JobStoreError::InvalidTransition {
                        id: job.id,
                        state: job.state,
                        action: "claim",
                    })
                }
            });

            match claimed {
                Ok((job, ())) => return Ok(Some(job)),
                // Lost the race for this one; try the next candidate.
                Err(JobStoreError::InvalidTransition { .. } | JobStoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    fn update_progress(&self, id: JobId, percent: u8) -> Result<(), JobStoreError> {
        let mut conn = self.conn()?;
        self.mutate(&mut conn, id, |job| {
            ensure_active(job, "report progress")?;
            job.set_progress(percent);
            Ok(())
        })
        .map(|_| ())
    }

    fn complete(&self, id: JobId, result: serde_json::Value) -> Result<Job, JobStoreError> {
        let mut conn = self.conn()?;
        self.mutate(&mut conn, id, |job| {
            ensure_active(job, "complete")?;
            job.mark_completed(result.clone(), Utc::now());
            Ok(())
        })
        .map(|(job, ())| job)
    }

    fn fail(&self, id: JobId, reason: &str) -> Result<Job, JobStoreError> {
        let mut conn = self.conn()?;
        self.mutate(&mut conn, id, |job| {
            ensure_active(job, "fail")?;
            job.mark_failed(reason, Utc::now());
            Ok(())
        })
        .map(|(job, ())| job)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let mut conn = self.conn()?;
        let raw: Option<String> = conn.get(self.job_key(id)).map_err(command_error)?;
        raw.map(|s| decode(&s)).transpose()
    }

    fn list(
        &self,
        kind: Option<JobKind>,
        states: &[JobState],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let mut conn = self.conn()?;
        let mut jobs: Vec<Job> = self
            .load(&mut conn, kind)?
            .into_iter()
            .filter(|j| states.is_empty() || states.contains(&j.state))
            .collect();

        newest_first(&mut jobs);
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    fn position(&self, id: JobId) -> Result<Option<usize>, JobStoreError> {
        let Some(job) = self.get(id)?.filter(|j| j.state.is_pending()) else {
            return Ok(None);
        };

        let mut conn = self.conn()?;
        let key = job.claim_key();
        let ahead = self
            .load_kind(&mut conn, job.kind)?
            .iter()
            .filter(|j| j.state.is_pending() && j.claim_key() < key)
            .count();
        Ok(Some(ahead + 1))
    }

    fn find_duplicate(&self, period: &PayPeriod) -> Result<Option<Job>, JobStoreError> {
        let mut conn = self.conn()?;
        Ok(self
            .load_kind(&mut conn, JobKind::PayrollRun)?
            .into_iter()
            .filter(|j| is_duplicate_of(j, period))
            .min_by_key(|j| j.created_at))
    }

    #[instrument(skip(self), err)]
    fn clean(&self, state: JobState, older_than: Duration) -> Result<usize, JobStoreError> {
        let cutoff = retention_cutoff(older_than);
        let mut conn = self.conn()?;
        let expired_now = |job: &Job| job.state == state && job.retention_timestamp() < cutoff;

        loop {
            let candidates: Vec<JobId> = self
                .load(&mut conn, None)?
                .into_iter()
                .filter(|j| expired_now(j))
                .map(|j| j.id)
                .collect();
            if candidates.is_empty() {
                return Ok(0);
            }

            let keys: Vec<String> = candidates.iter().map(|id| self.job_key(*id)).collect();
            redis::cmd("WATCH")
                .arg(&keys)
                .query::<()>(&mut *conn)
                .map_err(command_error)?;

            // Re-check under WATCH: a job retried or touched since the scan stays.
            let expired = match self.watched_jobs(&mut conn, &keys) {
                Ok(jobs) => jobs.into_iter().filter(|j| expired_now(j)).collect::<Vec<_>>(),
                Err(e) => {
                    let _ = redis::cmd("UNWATCH").query::<()>(&mut *conn);
                    return Err(e);
                }
            };
            if expired.is_empty() {
                let _ = redis::cmd("UNWATCH").query::<()>(&mut *conn);
                return Ok(0);
            }

            let mut pipe = redis::pipe();
            pipe.atomic();
            for job in &expired {
                pipe.del(self.job_key(job.id))
                    .ignore()
                    .srem(self.index_key(job.kind), job.id.to_string())
                    .ignore();
            }
            let committed: Option<()> = pipe.query(&mut *conn).map_err(command_error)?;

            if committed.is_some() {
                return Ok(expired.len());
            }
            debug!(state = %state, "concurrent job update during clean; retrying");
        }
    }

    fn stats(&self, kind: Option<JobKind>) -> Result<JobStats, JobStoreError> {
        let mut conn = self.conn()?;
        let mut stats = JobStats::default();
        for job in self.load(&mut conn, kind)? {
            stats.record(job.state);
        }
        Ok(stats)
    }

    fn recover_active(&self, kind: JobKind, reason: &str) -> Result<Vec<JobId>, JobStoreError> {
        let mut conn = self.conn()?;
        let active: Vec<JobId> = self
            .load_kind(&mut conn, kind)?
            .into_iter()
            .filter(|j| j.state == JobState::Active)
            .map(|j| j.id)
            .collect();

        let mut recovered = Vec::with_capacity(active.len());
        for id in active {
            let outcome = self.mutate(&mut conn, id, |job| {
                ensure_active(job, "recover")?;
                job.mark_failed(reason, Utc::now());
                Ok(())
            });
            match outcome {
                Ok(_) => recovered.push(id),
                Err(JobStoreError::InvalidTransition { .. } | JobStoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(recovered)
    }

    fn ping(&self) -> Result<(), JobStoreError> {
        let mut conn = self.conn()?;
        redis::cmd("PING")
            .query::<String>(&mut *conn)
            .map(|_| ())
            .map_err(|e| JobStoreError::Unavailable(e.to_string()))
    }
}

fn encode(job: &Job) -> Result<String, JobStoreError> {
    serde_json::to_string(job).map_err(|e| JobStoreError::Serialization(e.to_string()))
}

fn decode(raw: &str) -> Result<Job, JobStoreError> {
    serde_json::from_str(raw).map_err(|e| JobStoreError::Serialization(e.to_string()))
}

fn command_error(e: redis::RedisError) -> JobStoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        JobStoreError::Unavailable(e.to_string())
    } else {
        JobStoreError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::tests::payroll_payload;

    #[test]
    fn keys_are_prefixed() {
        let store = RedisJobStore::new("redis://127.0.0.1:6379", Some("test".to_string())).unwrap();
        let id = JobId::new();

        assert_eq!(store.job_key(id), format!("test:job:{id}"));
        assert_eq!(store.index_key(JobKind::SendPayslip), "test:jobs:send_payslip");
    }

    #[test]
    fn job_json_round_trips() {
        let job = Job::new(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default());
        assert_eq!(decode(&encode(&job).unwrap()).unwrap(), job);
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(
            RedisJobStore::new("not a url", None),
            Err(JobStoreError::Unavailable(_))
        ));
    }

    #[test]
    fn construction_does_not_connect() {
        // Nothing listens on port 1; the pool only dials on checkout.
        let store = RedisJobStore::new("redis://127.0.0.1:1", None).unwrap();
        assert_eq!(store.pool.state().connections, 0);
        assert!(format!("{store:?}").contains("prefix: \"payrun\""));
    }

    /// Requires a running Redis at `REDIS_URL`.
    #[test]
    #[ignore]
    fn claim_is_exclusive_against_live_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let store = RedisJobStore::new(url, Some(format!("payrun-test-{}", JobId::new()))).unwrap();
        store.ping().unwrap();

        let job = store
            .enqueue(payroll_payload("2024-01-01", "2024-01-31"), JobOptions::default())
            .unwrap();

        let claims: Vec<Option<Job>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| store.claim_next(JobKind::PayrollRun).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<_> = claims.into_iter().flatten().collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, job.id);

        store.complete(job.id, serde_json::json!({})).unwrap();
        assert_eq!(store.clean(JobState::Completed, Duration::ZERO).unwrap(), 1);
        assert_eq!(store.get(job.id).unwrap(), None);
        assert_eq!(store.clean(JobState::Completed, Duration::ZERO).unwrap(), 0);
    }

    /// Requires a running Redis at `REDIS_URL`.
    #[test]
    #[ignore]
    fn progress_updates_reuse_pooled_connections() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let store = RedisJobStore::new(url, Some(format!("payrun-test-{}", JobId::new()))).unwrap();

        let job = store
            .enqueue(payroll_payload("2024-02-01", "2024-02-29"), JobOptions::default())
            .unwrap();
        store.claim_next(JobKind::PayrollRun).unwrap().unwrap();
        for percent in 1..=100 {
            store.update_progress(job.id, percent).unwrap();
        }

        assert_eq!(store.get(job.id).unwrap().unwrap().progress, 100);
        assert!(store.pool.state().connections <= POOL_SIZE);
        store.fail(job.id, "test cleanup").unwrap();
        store.clean(JobState::Failed, Duration::ZERO).unwrap();
    }
}
