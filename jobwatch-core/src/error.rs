//! Error types shared by the core pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned across the adapter traits in [`crate::contract`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures while persisting job data.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings that parsed but make no sense to run with.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("at least one query must be configured")]
    NoQueries,

    #[error("filter.chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("query #{index} has an empty keywords field")]
    EmptyKeywords { index: usize },

    #[error("scraper.slow_mo_secs must be a finite, non-negative number of seconds, got {value}")]
    InvalidSlowMo { value: f64 },

    #[error("scraper.page_size must be greater than zero")]
    ZeroPageSize,

    #[error("stats.retention_days must be greater than zero")]
    ZeroRetentionDays,
}

/// Errors that abort a scrape cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
