//! Run settings. Everything here is non-secret and deserializes from the YAML
//! config file; credentials are injected separately by the binary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    pub queries: Vec<ScrapeQuery>,
    #[serde(default)]
    pub scraper: ScraperSettings,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub notify: NotifySettings,
    #[serde(default)]
    pub stats: StatsSettings,
    /// Whether the run happens inside GitHub Actions. Not read from YAML;
    /// the binary sets it from the environment.
    #[serde(skip)]
    pub github_actions: bool,
}

impl Settings {
    /// Rejects settings that would make a cycle meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queries.is_empty() {
            return Err(ConfigError::NoQueries);
        }
        if let Some(index) = self
            .queries
            .iter()
            .position(|q| q.keywords.trim().is_empty())
        {
            return Err(ConfigError::EmptyKeywords { index });
        }
        if self.filter.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if Duration::try_from_secs_f64(self.scraper.slow_mo_secs).is_err() {
            return Err(ConfigError::InvalidSlowMo {
                value: self.scraper.slow_mo_secs,
            });
        }
        if self.scraper.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.stats.retention_days == 0 {
            return Err(ConfigError::ZeroRetentionDays);
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            data_dir = %self.data_dir.display(),
            queries = self.queries.len(),
            model = %self.filter.model,
            chunk_size = self.filter.chunk_size,
            "Loaded settings"
        );
        debug!(?self, "Settings loaded (full debug)");
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("job_data")
}

/// One job search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeQuery {
    pub keywords: String,
    pub location: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub posted_within: PostedWithin,
    #[serde(default)]
    pub experience: Vec<ExperienceLevel>,
    #[serde(default)]
    pub job_types: Vec<JobType>,
    #[serde(default)]
    pub sort_by: SortBy,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostedWithin {
    #[default]
    Day,
    Week,
    Month,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Internship,
    EntryLevel,
    Associate,
    MidSenior,
    Director,
    Executive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Temporary,
    Internship,
    Volunteer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevant,
    Recent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// Pause between consecutive HTTP requests, in seconds.
    pub slow_mo_secs: f64,
    pub page_load_timeout_secs: u64,
    /// Cards per search page; the guest endpoint serves 25.
    pub page_size: usize,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            slow_mo_secs: 2.0,
            page_load_timeout_secs: 90,
            page_size: 25,
        }
    }
}

/// Criteria handed to the LLM, plus batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub model: String,
    pub chunk_size: usize,
    pub title_keywords: Vec<String>,
    pub skills: Vec<String>,
    pub min_skill_matches: usize,
    pub max_experience_years: u32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-pro".to_string(),
            chunk_size: 8,
            title_keywords: [
                "Data Engineer",
                "Software Engineer",
                "Backend Developer",
                "Full Stack Developer",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            skills: [
                "Python", "ReactJS", "VueJS", "Postgres", "SQL", "AWS", "Azure", "DevOps",
                "Docker", "Kubernetes", "PySpark", "ETL", "ELT", "Node.js", "FastAPI",
                "Django", "Flask",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_skill_matches: 2,
            max_experience_years: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Defaults to the sender address when unset.
    pub recipient: Option<String>,
    /// How many new jobs are listed in the email body.
    pub preview_count: usize,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            recipient: None,
            preview_count: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    pub retention_days: usize,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}
