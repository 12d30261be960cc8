//! Retention sweeps for finished jobs.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use super::store::{JobStore, JobStoreError};
use super::types::JobState;

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Completed jobs are kept this long after finishing
    pub completed_ttl: Duration,
    /// Failed jobs are kept this long after failing
    pub failed_ttl: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            completed_ttl: Duration::from_secs(24 * 60 * 60),
            failed_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub completed_removed: usize,
    pub failed_removed: usize,
}

/// Run a single retention sweep.
pub fn sweep_once<S: JobStore + ?Sized>(
    store: &S,
    config: &JanitorConfig,
) -> Result<SweepReport, JobStoreError> {
    Ok(SweepReport {
        completed_removed: store.clean(JobState::Completed, config.completed_ttl)?,
        failed_removed: store.clean(JobState::Failed, config.failed_ttl)?,
    })
}

/// Handle to the background janitor thread.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl JanitorHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Spawn a thread that sweeps every `config.interval` until shut down.
pub fn spawn_janitor<S>(store: S, config: JanitorConfig) -> std::io::Result<JanitorHandle>
where
    S: JobStore + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let join = thread::Builder::new()
        .name("job-janitor".to_string())
        .spawn(move || {
            info!(interval_secs = config.interval.as_secs(), "job janitor started");
            loop {
                match shutdown_rx.recv_timeout(config.interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => match sweep_once(&store, &config) {
                        Ok(report) => info!(
                            completed_removed = report.completed_removed,
                            failed_removed = report.failed_removed,
                            "job retention sweep finished"
                        ),
                        Err(e) => error!(error = %e, "job retention sweep failed"),
                    },
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("job janitor stopped");
        })?;

    Ok(JanitorHandle {
        shutdown: shutdown_tx,
        join: Some(join),
    })
}
