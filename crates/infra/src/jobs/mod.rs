//! Durable job queue with retry, backoff, and progress reporting.
//!
//! ## Components
//!
//! - `Job`: a payload plus everything the queue tracks about it
//! - `JobStore`: persistence and state transitions (in-memory or Redis)
//! - `JobExecutor`: polling lanes that run one handler per `JobKind`
//! - `janitor`: periodic removal of old finished jobs

pub mod executor;
pub mod janitor;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;
pub mod types;

pub use executor::{
    ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandle, JobHandler,
    JobResult,
};
pub use janitor::{JanitorConfig, JanitorHandle, SweepReport, spawn_janitor, sweep_once};
#[cfg(feature = "redis")]
pub use redis_store::RedisJobStore;
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, Job, JobAttemptRecord, JobId, JobKind, JobOptions, JobPayload, JobPriority,
    JobState, RetryPolicy,
};
