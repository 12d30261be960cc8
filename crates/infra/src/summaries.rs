//! Durable payroll run summaries, one JSON file per run.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use payrun_payroll::{PayrollOverview, PayrollSummary};

use crate::payslips::write_atomically;

const FILE_PREFIX: &str = "payroll_summary_";

#[derive(Debug, Error)]
pub enum SummaryStoreError {
    #[error("summary io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("summary serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait SummaryStore: Send + Sync {
    /// Persist a summary. Saving the same summary id again overwrites it.
    /// Returns the file name written.
    fn save(&self, summary: &PayrollSummary) -> Result<String, SummaryStoreError>;

    /// Newest first, at most `limit`.
    fn list(&self, limit: usize) -> Result<Vec<PayrollOverview>, SummaryStoreError>;

    fn get(&self, id: &str) -> Result<Option<PayrollSummary>, SummaryStoreError>;
}

/// `payroll_summary_<start>_<end>_<job uuid simple>.json`
pub fn summary_file_name(summary: &PayrollSummary) -> String {
    format!(
        "{FILE_PREFIX}{}_{}.json",
        summary.pay_period.file_stem(),
        summary.job_id.simple()
    )
}

#[derive(Debug, Clone)]
pub struct FsSummaryStore {
    dir: PathBuf,
}

impl FsSummaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SummaryStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SummaryStoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn summary_files(&self) -> Result<Vec<PathBuf>, SummaryStoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| SummaryStoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        Ok(entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"))
            })
            .collect())
    }

    fn read_summary(&self, path: &Path) -> Result<PayrollSummary, SummaryStoreError> {
        let bytes = fs::read(path).map_err(|source| SummaryStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl SummaryStore for FsSummaryStore {
    fn save(&self, summary: &PayrollSummary) -> Result<String, SummaryStoreError> {
        let file_name = summary_file_name(summary);
        let path = self.dir.join(&file_name);
        let json = serde_json::to_vec_pretty(summary)?;

        write_atomically(&path, &json).map_err(|source| SummaryStoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(summary_id = %summary.id, path = %path.display(), "payroll summary saved");
        Ok(file_name)
    }

    fn list(&self, limit: usize) -> Result<Vec<PayrollOverview>, SummaryStoreError> {
        let mut overviews = Vec::new();
        for path in self.summary_files()? {
            match self.read_summary(&path) {
                Ok(summary) => overviews.push(summary.overview()),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable summary"),
            }
        }

        overviews.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        overviews.truncate(limit);
        Ok(overviews)
    }

    fn get(&self, id: &str) -> Result<Option<PayrollSummary>, SummaryStoreError> {
        let Some(job_id) = id
            .strip_prefix("payroll_")
            .and_then(|s| Uuid::try_parse(s).ok())
        else {
            return Ok(None);
        };
        let suffix = format!("_{}.json", job_id.simple());

        let found = self.summary_files()?.into_iter().find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix))
        });

        found.map(|path| self.read_summary(&path)).transpose()
    }
}
