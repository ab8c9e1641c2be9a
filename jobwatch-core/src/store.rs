//! JSON files under the data directory that make up jobwatch's memory between
//! runs. The directory is meant to be committed to version control, so every
//! file is pretty-printed and written atomically.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::contract::JobPosting;
use crate::error::StoreError;
use crate::stats::DailyStats;

pub const ALL_JOBS_FILE: &str = "all_jobs_history.json";
pub const FILTERED_JOBS_FILE: &str = "filtered_jobs_history.json";
pub const LAST_RUN_FILE: &str = "last_run.json";
pub const DAILY_STATS_FILE: &str = "daily_stats.json";

/// Summary of the most recent cycle, written to `last_run.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunInfo {
    pub timestamp: String,
    pub new_jobs: usize,
    pub new_filtered: usize,
    pub total_jobs: usize,
    pub total_filtered: usize,
    pub github_action_run: bool,
}

#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn load_all_jobs(&self) -> Vec<JobPosting> {
        self.load_or_default(ALL_JOBS_FILE)
    }

    pub fn load_filtered_jobs(&self) -> Vec<JobPosting> {
        self.load_or_default(FILTERED_JOBS_FILE)
    }

    pub fn load_daily_stats(&self) -> Vec<DailyStats> {
        self.load_or_default(DAILY_STATS_FILE)
    }

    pub fn load_last_run(&self) -> Option<RunInfo> {
        let path = self.dir.join(LAST_RUN_FILE);
        if !path.exists() {
            return None;
        }
        self.load_file(&path)
    }

    pub fn save_all_jobs(&self, jobs: &[JobPosting]) -> Result<(), StoreError> {
        self.save(ALL_JOBS_FILE, jobs)
    }

    pub fn save_filtered_jobs(&self, jobs: &[JobPosting]) -> Result<(), StoreError> {
        self.save(FILTERED_JOBS_FILE, jobs)
    }

    pub fn save_daily_stats(&self, stats: &[DailyStats]) -> Result<(), StoreError> {
        self.save(DAILY_STATS_FILE, stats)
    }

    pub fn save_last_run(&self, info: &RunInfo) -> Result<(), StoreError> {
        self.save(LAST_RUN_FILE, info)
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.dir.join(name);
        if !path.exists() {
            debug!(path = %path.display(), "No data file yet, starting empty");
            return T::default();
        }
        self.load_file(&path).unwrap_or_default()
    }

    /// Unreadable or corrupt files are reported and treated as absent.
    fn load_file<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Could not read data file");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Could not parse data file");
                None
            }
        }
    }

    fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
            path: path.clone(),
            source,
        })?;

        let write_err = |source| StoreError::Write {
            path: path.clone(),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        info!(path = %path.display(), bytes = json.len(), "Saved data file");
        Ok(())
    }
}

/// Ids of all postings that carry one.
pub fn known_ids(jobs: &[JobPosting]) -> HashSet<String> {
    jobs.iter()
        .filter(|j| !j.job_id.is_empty())
        .map(|j| j.job_id.clone())
        .collect()
}
