//! Service wiring: job queue, employee directory, artifact stores, and the
//! background lanes that drain the queue.

use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

use payrun_infra::PayrunConfig;
use payrun_core::EmployeeId;
use payrun_infra::employees::{
    DepartmentCount, DirectoryError, EmployeeDirectory, EmployeePage, EmployeeQuery,
    InMemoryEmployeeDirectory, PostgresEmployeeDirectory,
};
use payrun_infra::jobs::{
    InMemoryJobStore, JanitorConfig, JanitorHandle, Job, JobExecutor, JobExecutorConfig,
    JobExecutorHandle, JobId, JobKind, JobOptions, JobPayload, JobStats, JobStore, JobStoreError,
    RetryPolicy, spawn_janitor,
};
use payrun_infra::notifications::{LogMailer, NotificationHandler};
use payrun_infra::payroll_worker::PayrollWorker;
use payrun_infra::payslips::{FsPayslipGenerator, PayslipGenerator};
use payrun_infra::summaries::{FsSummaryStore, SummaryStore};
use payrun_payroll::{Employee, EmployeeUpdate, PayrollJobRequest};

#[cfg(feature = "redis")]
use payrun_infra::jobs::RedisJobStore;

/// Upper bound for every list endpoint.
pub const LIST_LIMIT: usize = 50;

/// Everything handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub payrolls: PayrollService,
    pub employees: EmployeeService,
    pub summaries: Arc<dyn SummaryStore>,
    pub payslips: Arc<dyn PayslipGenerator>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("payroll job already exists for this period")]
    Duplicate { existing: JobId },
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// A freshly enqueued job and where it sits in the queue.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: Job,
    pub queue_position: Option<usize>,
}

/// Submission and status operations over the payroll lane of the queue.
#[derive(Clone)]
pub struct PayrollService {
    jobs: Arc<dyn JobStore>,
    retry: RetryPolicy,
}

impl PayrollService {
    pub fn new(jobs: Arc<dyn JobStore>, retry: RetryPolicy) -> Self {
        Self { jobs, retry }
    }

    /// Enqueue a payroll run. Unless `force` is set, a pending or running job
    /// for the same pay period is reported instead of enqueuing a second one.
    ///
    /// The duplicate check and the enqueue are not atomic: two concurrent
    /// submissions for the same period can both get through.
    pub fn submit(&self, request: PayrollJobRequest, force: bool) -> Result<QueuedJob, SubmitError> {
        if !force {
            if let Some(existing) = self.jobs.find_duplicate(&request.pay_period)? {
                return Err(SubmitError::Duplicate {
                    existing: existing.id,
                });
            }
        }

        let period = request.pay_period;
        let job = self.jobs.enqueue(
            JobPayload::PayrollRun(request),
            JobOptions::with_retry(self.retry.clone()),
        )?;
        let queue_position = self.jobs.position(job.id)?;

        info!(
            job_id = %job.id,
            pay_period = %period,
            forced = force,
            queue_position = ?queue_position,
            "payroll job queued"
        );

        Ok(QueuedJob {
            job,
            queue_position,
        })
    }

    /// Snapshot of a payroll job. Jobs of other kinds are not visible here.
    pub fn status(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self
            .jobs
            .get(id)?
            .filter(|job| job.kind == JobKind::PayrollRun))
    }

    pub fn position(&self, id: JobId) -> Result<Option<usize>, JobStoreError> {
        self.jobs.position(id)
    }

    /// Newest payroll jobs first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        self.jobs.list(Some(JobKind::PayrollRun), &[], limit, 0)
    }

    /// Payroll lane counts, after checking the broker answers.
    pub fn queue_health(&self) -> Result<JobStats, JobStoreError> {
        self.jobs.ping()?;
        self.jobs.stats(Some(JobKind::PayrollRun))
    }
}

/// Async facade over the employee directory. Directory calls may block (the
/// Postgres directory drives its own queries), so each runs on the blocking
/// pool.
#[derive(Clone)]
pub struct EmployeeService {
    directory: Arc<dyn EmployeeDirectory>,
}

impl EmployeeService {
    pub fn new(directory: Arc<dyn EmployeeDirectory>) -> Self {
        Self { directory }
    }

    async fn run<T, F>(&self, op: F) -> Result<T, DirectoryError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EmployeeDirectory) -> Result<T, DirectoryError> + Send + 'static,
    {
        let directory = self.directory.clone();
        tokio::task::spawn_blocking(move || op(directory.as_ref()))
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("directory task failed: {e}")))?
    }

    pub async fn list(&self, query: EmployeeQuery) -> Result<EmployeePage, DirectoryError> {
        self.run(move |directory| directory.list(&query)).await
    }

    pub async fn get(&self, id: EmployeeId) -> Result<Option<Employee>, DirectoryError> {
        self.run(move |directory| directory.get(id)).await
    }

    pub async fn create(&self, employee: Employee) -> Result<Employee, DirectoryError> {
        let created = self.run(move |directory| directory.create(employee)).await?;
        info!(employee_id = %created.id, department = %created.department, "employee created");
        Ok(created)
    }

    pub async fn update(
        &self,
        id: EmployeeId,
        update: EmployeeUpdate,
    ) -> Result<Option<Employee>, DirectoryError> {
        self.run(move |directory| directory.update(id, &update)).await
    }

    pub async fn terminate(&self, id: EmployeeId) -> Result<Option<Employee>, DirectoryError> {
        let terminated = self.run(move |directory| directory.terminate(id)).await?;
        if terminated.is_some() {
            info!(employee_id = %id, "employee terminated");
        }
        Ok(terminated)
    }

    pub async fn department_stats(&self) -> Result<Vec<DepartmentCount>, DirectoryError> {
        self.run(|directory| directory.department_stats()).await
    }
}

/// Background threads started alongside the HTTP server.
pub struct Workers {
    lanes: Vec<JobExecutorHandle>,
    janitor: Option<JanitorHandle>,
}

impl Workers {
    /// Stop polling and wait for in-flight jobs to finish.
    pub fn shutdown(self) {
        for lane in self.lanes {
            lane.shutdown();
        }
        if let Some(janitor) = self.janitor {
            janitor.shutdown();
        }
    }
}

/// Open every store named by `config`, start the payroll and notification
/// lanes plus the retention janitor, and return the shared services.
pub async fn build_services(config: &PayrunConfig) -> anyhow::Result<(Arc<AppServices>, Workers)> {
    let jobs = open_job_store(config)?;
    let directory = open_employee_directory(config).await?;

    let payslips: Arc<dyn PayslipGenerator> = Arc::new(
        FsPayslipGenerator::new(&config.payslips_dir).context("failed to prepare payslips directory")?,
    );
    let summaries: Arc<dyn SummaryStore> = Arc::new(
        FsSummaryStore::new(&config.payrolls_dir).context("failed to prepare payrolls directory")?,
    );

    let worker = PayrollWorker::new(
        directory.clone(),
        config.calculator(),
        payslips.clone(),
        summaries.clone(),
    )
    .with_notification_retry(config.notification_retry());

    // Payroll runs are strictly sequential.
    let payroll_lane = JobExecutor::new(jobs.clone(), JobKind::PayrollRun, move |job, handle| {
        worker.handle(job, handle)
    })
    .spawn(JobExecutorConfig::default().with_name("payroll").with_concurrency(1))
    .context("failed to start payroll lane")?;

    let notifications = NotificationHandler::new(LogMailer);
    let notification_lane = JobExecutor::new(jobs.clone(), JobKind::SendPayslip, move |job, handle| {
        notifications.handle(job, handle)
    })
    .spawn(
        JobExecutorConfig::default()
            .with_name("notifications")
            .with_concurrency(config.notification_concurrency),
    )
    .context("failed to start notification lane")?;

    let janitor = spawn_janitor(jobs.clone(), JanitorConfig::default())
        .context("failed to start job janitor")?;

    info!(
        payslips_dir = %config.payslips_dir.display(),
        payrolls_dir = %config.payrolls_dir.display(),
        notification_concurrency = config.notification_concurrency,
        "payroll services started"
    );

    let services = AppServices {
        payrolls: PayrollService::new(jobs, config.payroll_retry()),
        employees: EmployeeService::new(directory),
        summaries,
        payslips,
    };

    Ok((
        Arc::new(services),
        Workers {
            lanes: vec![payroll_lane, notification_lane],
            janitor: Some(janitor),
        },
    ))
}

fn open_job_store(config: &PayrunConfig) -> anyhow::Result<Arc<dyn JobStore>> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        info!("REDIS_URL not set; using in-memory job queue");
        let store: Arc<dyn JobStore> = InMemoryJobStore::arc();
        return Ok(store);
    };

    #[cfg(feature = "redis")]
    {
        let store = RedisJobStore::new(redis_url, None).context("invalid REDIS_URL")?;
        store
            .ping()
            .with_context(|| format!("job broker unreachable at {redis_url}"))?;
        info!("using redis job queue");
        let store: Arc<dyn JobStore> = Arc::new(store);
        Ok(store)
    }
    #[cfg(not(feature = "redis"))]
    {
        warn!(
            redis_url,
            "REDIS_URL set but redis feature not enabled, falling back to in-memory job queue"
        );
        let store: Arc<dyn JobStore> = InMemoryJobStore::arc();
        Ok(store)
    }
}

async fn open_employee_directory(config: &PayrunConfig) -> anyhow::Result<Arc<dyn EmployeeDirectory>> {
    if let Some(database_url) = config.database_url.as_deref() {
        let directory = PostgresEmployeeDirectory::connect(database_url)
            .await
            .context("employee database unreachable")?;
        directory
            .ensure_schema()
            .await
            .context("failed to prepare employees table")?;
        info!("using postgres employee directory");
        let directory: Arc<dyn EmployeeDirectory> = Arc::new(directory);
        return Ok(directory);
    }

    match &config.employees_file {
        Some(path) => {
            let directory = InMemoryEmployeeDirectory::from_json_file(path)
                .context("failed to load employee seed file")?;
            info!(path = %path.display(), employees = directory.len(), "loaded employee seed file");
            let directory: Arc<dyn EmployeeDirectory> = Arc::new(directory);
            Ok(directory)
        }
        None => {
            warn!("neither DATABASE_URL nor EMPLOYEES_FILE set; employee directory is empty");
            let directory: Arc<dyn EmployeeDirectory> = Arc::new(InMemoryEmployeeDirectory::default());
            Ok(directory)
        }
    }
}
