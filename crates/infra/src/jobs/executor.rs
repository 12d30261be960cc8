//! Job executor: polling lanes that run one handler per job kind.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobId, JobKind, JobState};

/// Outcome reported by a job handler.
#[derive(Debug)]
pub enum JobResult {
    /// Completed; the value is stored as the job result
    Success(serde_json::Value),
    /// Attempt failed; the store applies the retry policy
    Failure(String),
}

/// Handler-side view of the running job.
pub struct JobHandle<'a> {
    job_id: JobId,
    store: &'a dyn JobStore,
}

impl<'a> JobHandle<'a> {
    pub fn new(job_id: JobId, store: &'a dyn JobStore) -> Self {
        Self { job_id, store }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Report progress (percent). Failures are logged, never propagated.
    pub fn progress(&self, percent: u8) {
        if let Err(e) = self.store.update_progress(self.job_id, percent) {
            warn!(job_id = %self.job_id, error = %e, "failed to record job progress");
        }
    }

    /// Store access for handlers that enqueue follow-up jobs.
    pub fn store(&self) -> &dyn JobStore {
        self.store
    }
}

/// Job handler function type.
pub type JobHandler = Arc<dyn Fn(&Job, &JobHandle<'_>) -> JobResult + Send + Sync>;

/// Lane configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll for new jobs when the lane is idle
    pub poll_interval: Duration,
    /// Worker threads in the lane
    pub concurrency: usize,
    /// Name for logging and thread names
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            concurrency: 1,
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Handle to control a running lane.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: Vec<mpsc::Sender<()>>,
    joins: Vec<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
    started: Instant,
}

impl JobExecutorHandle {
    /// Request graceful shutdown. In-flight jobs finish first.
    pub fn shutdown(self) {
        for tx in &self.shutdown {
            let _ = tx.send(());
        }
        for join in self.joins {
            let _ = join.join();
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        let mut stats = self
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    /// Attempts that ended in a terminal failure
    pub jobs_failed: u64,
    /// Attempts that failed and were scheduled for retry
    pub jobs_retried: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

impl ExecutorStats {
    fn record(&mut self, state: JobState) {
        self.jobs_processed += 1;
        match state {
            JobState::Completed => self.jobs_succeeded += 1,
            JobState::Failed => self.jobs_failed += 1,
            _ => self.jobs_retried += 1,
        }
    }
}

/// One lane: a job kind, its handler, and the store it polls.
pub struct JobExecutor<S: JobStore> {
    store: S,
    kind: JobKind,
    handler: JobHandler,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new<F>(store: S, kind: JobKind, handler: F) -> Self
    where
        F: Fn(&Job, &JobHandle<'_>) -> JobResult + Send + Sync + 'static,
    {
        Self {
            store,
            kind,
            handler: Arc::new(handler),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Recover orphaned jobs, then spawn `concurrency` polling threads.
    pub fn spawn(self, config: JobExecutorConfig) -> Result<JobExecutorHandle, JobStoreError> {
        let recovered = self
            .store
            .recover_active(self.kind, "worker restarted while job was active")?;
        if !recovered.is_empty() {
            warn!(
                executor = %config.name,
                lane = %self.kind,
                count = recovered.len(),
                "recovered orphaned active jobs"
            );
        }

        let executor = Arc::new(self);
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let mut shutdown = Vec::with_capacity(config.concurrency);
        let mut joins = Vec::with_capacity(config.concurrency);

        for worker in 0..config.concurrency.max(1) {
            let (tx, rx) = mpsc::channel::<()>();
            let executor = executor.clone();
            let stats = stats.clone();
            let config = config.clone();

            let join = thread::Builder::new()
                .name(format!("{}-{}", config.name, worker))
                .spawn(move || executor_loop(&executor, &config, rx, &stats))
                .map_err(|e| JobStoreError::Storage(format!("failed to spawn executor thread: {e}")))?;

            shutdown.push(tx);
            joins.push(join);
        }

        Ok(JobExecutorHandle {
            shutdown,
            joins,
            stats,
            started: Instant::now(),
        })
    }

    /// Claim and run a single job, if one is ready. Returns the job as stored
    /// after the attempt.
    pub fn run_next(&self) -> Result<Option<Job>, JobStoreError> {
        match self.store.claim_next(self.kind)? {
            Some(job) => self.execute_one(&job).map(Some),
            None => Ok(None),
        }
    }

    /// Run the handler on an already-claimed job and record the outcome.
    pub fn execute_one(&self, job: &Job) -> Result<Job, JobStoreError> {
        let handle = JobHandle::new(job.id, &self.store);

        let outcome = catch_unwind(AssertUnwindSafe(|| (self.handler)(job, &handle)))
            .unwrap_or_else(|panic| JobResult::Failure(panic_message(panic.as_ref())));

        match outcome {
            JobResult::Success(result) => {
                let stored = self.store.complete(job.id, result)?;
                debug!(job_id = %job.id, lane = %self.kind, "job completed successfully");
                Ok(stored)
            }
            JobResult::Failure(reason) => {
                let stored = self.store.fail(job.id, &reason)?;
                match stored.state {
                    JobState::Failed => warn!(
                        job_id = %job.id,
                        lane = %self.kind,
                        attempts = stored.attempts_made,
                        error = %reason,
                        "job failed permanently"
                    ),
                    _ => info!(
                        job_id = %job.id,
                        lane = %self.kind,
                        attempts = stored.attempts_made,
                        run_at = ?stored.run_at,
                        error = %reason,
                        "job attempt failed; retry scheduled"
                    ),
                }
                Ok(stored)
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {detail}")
}

fn executor_loop<S: JobStore + 'static>(
    executor: &JobExecutor<S>,
    config: &JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: &Mutex<ExecutorStats>,
) {
    info!(executor = %config.name, lane = %executor.kind, "job executor started");

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        match executor.store.claim_next(executor.kind) {
            Ok(Some(job)) => {
                debug!(executor = %config.name, job_id = %job.id, lane = %job.kind, "claimed job");

                if let Ok(mut s) = stats.lock() {
                    s.current_running += 1;
                }

                let result = executor.execute_one(&job);

                if let Ok(mut s) = stats.lock() {
                    s.current_running = s.current_running.saturating_sub(1);
                    if let Ok(stored) = &result {
                        s.record(stored.state);
                    }
                }

                if let Err(e) = result {
                    error!(
                        executor = %config.name,
                        job_id = %job.id,
                        error = %e,
                        "failed to record job outcome"
                    );
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(executor = %config.name, lane = %executor.kind, "job executor stopped");
}
