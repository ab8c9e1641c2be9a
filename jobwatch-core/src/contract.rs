//! # contract: data model and adapter seams
//!
//! This module defines the plain data types that flow through a cycle and the
//! three async traits the orchestrator depends on:
//!
//! - [`Scraper`]: turns a [`ScrapeQuery`] into job postings.
//! - [`Classifier`]: answers a filtering prompt with the ids of matching postings.
//! - [`Notifier`]: delivers an [`Email`].
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so tests get `MockScraper`,
//!   `MockClassifier` and `MockNotifier` (exported with the default
//!   `test-export-mocks` feature for downstream integration tests).
//!
//! ## Adding New Adapters
//! - Implement the trait in the binary crate and convert upstream failures
//!   into a [`BoxError`].

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

pub use crate::config::ScrapeQuery;
pub use crate::error::BoxError;

/// A single job posting, as scraped and as persisted in the history files.
///
/// Every field defaults to empty so history files written by older versions
/// (or edited by hand) still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobPosting {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    /// Posting date as reported by the job board.
    pub date: String,
    pub link: String,
    pub description: String,
    /// RFC 3339 timestamp of when this posting was scraped.
    pub scraped_at: String,
}

/// A file attached to an outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// A plain-text email with optional attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Source of job postings (a job board, a fixture, a mock).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Run one search query and return the postings found, at most `query.limit`.
    async fn scrape(&self, query: &ScrapeQuery) -> Result<Vec<JobPosting>, BoxError>;
}

/// LLM-backed classifier used by the filter step.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Answer a filtering prompt with the `job_id`s the model selected.
    ///
    /// Ids not present in the prompt are tolerated; the caller discards them.
    async fn select(&self, prompt: &str) -> Result<Vec<String>, BoxError>;
}

/// Delivery channel for run reports.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), BoxError>;

    /// Address reports are sent from.
    fn sender(&self) -> String;

    /// Address reports are delivered to.
    fn recipient(&self) -> String;
}
