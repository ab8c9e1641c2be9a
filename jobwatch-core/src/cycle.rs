//! High-level pipeline: orchestrates scrape → filter → persist → notify.
//!
//! One call to [`run_cycle`] is one scheduled run. It:
//!   - Loads the job histories from the [`JobStore`]
//!   - Runs every configured query through the [`Scraper`] and drops postings already seen
//!   - Sends the new postings through the LLM filter ([`crate::filter`])
//!   - Appends both histories, writes `last_run.json` and the daily statistics
//!   - Emails a report through the [`Notifier`]
//!
//! # Error Handling
//! Scrape and classifier failures are logged and degrade to "nothing found".
//! A failed report email is logged only. Persistence failures abort the cycle:
//! an error alert is sent (best effort) and the error is returned so the
//! process exits non-zero.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::contract::{Classifier, JobPosting, Notifier, Scraper};
use crate::error::CycleError;
use crate::filter::filter_jobs;
use crate::report::{error_report, run_report, RunSummary};
use crate::stats::{record_run, DailyStats};
use crate::store::{known_ids, JobStore, RunInfo};

/// Outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub scraped: usize,
    pub new_jobs: usize,
    pub new_filtered: Vec<JobPosting>,
    pub total_jobs: usize,
    pub total_filtered: usize,
    pub today: DailyStats,
    pub notified: bool,
}

pub async fn run_cycle<S, C, N>(
    settings: &Settings,
    scraper: &S,
    classifier: &C,
    notifier: &N,
    store: &JobStore,
    now: DateTime<Utc>,
) -> Result<CycleReport, CycleError>
where
    S: Scraper + ?Sized,
    C: Classifier + ?Sized,
    N: Notifier + ?Sized,
{
    info!("[CYCLE] Starting job scraping cycle");

    match run_inner(settings, scraper, classifier, notifier, store, now).await {
        Ok(report) => {
            info!(
                new_jobs = report.new_jobs,
                new_filtered = report.new_filtered.len(),
                "[CYCLE] Cycle completed successfully"
            );
            Ok(report)
        }
        Err(e) => {
            error!(error = %e, "[CYCLE][ERROR] Cycle failed");
            let alert = error_report(&notifier.sender(), &notifier.recipient(), now, &e.to_string());
            match notifier.send(&alert).await {
                Ok(()) => info!("[CYCLE] Error notification sent"),
                Err(send_err) => {
                    error!(error = %send_err, "[CYCLE][ERROR] Failed to send error notification")
                }
            }
            Err(e)
        }
    }
}

async fn run_inner<S, C, N>(
    settings: &Settings,
    scraper: &S,
    classifier: &C,
    notifier: &N,
    store: &JobStore,
    now: DateTime<Utc>,
) -> Result<CycleReport, CycleError>
where
    S: Scraper + ?Sized,
    C: Classifier + ?Sized,
    N: Notifier + ?Sized,
{
    store.ensure_dir()?;

    let mut all_jobs = store.load_all_jobs();
    let mut filtered_jobs = store.load_filtered_jobs();
    let existing_all = known_ids(&all_jobs);
    let existing_filtered = known_ids(&filtered_jobs);
    info!(
        all = all_jobs.len(),
        filtered = filtered_jobs.len(),
        "[CYCLE] Loaded existing job history"
    );

    let scraped = scrape_all(settings, scraper).await;

    let new_jobs: Vec<JobPosting> = scraped
        .iter()
        .filter(|job| !existing_all.contains(&job.job_id))
        .cloned()
        .collect();
    info!(
        new = new_jobs.len(),
        scraped = scraped.len(),
        "[CYCLE] Compared against history"
    );

    let new_filtered: Vec<JobPosting> = if new_jobs.is_empty() {
        info!("[CYCLE] No new unique jobs found");
        Vec::new()
    } else {
        filter_jobs(classifier, &settings.filter, &new_jobs)
            .await
            .into_iter()
            .filter(|job| !existing_filtered.contains(&job.job_id))
            .collect()
    };
    info!(count = new_filtered.len(), "[CYCLE] New filtered jobs");

    if !new_jobs.is_empty() {
        all_jobs.extend(new_jobs.iter().cloned());
        filtered_jobs.extend(new_filtered.iter().cloned());
        store.save_all_jobs(&all_jobs)?;
        store.save_filtered_jobs(&filtered_jobs)?;
    }

    store.save_last_run(&RunInfo {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        new_jobs: new_jobs.len(),
        new_filtered: new_filtered.len(),
        total_jobs: all_jobs.len(),
        total_filtered: filtered_jobs.len(),
        github_action_run: settings.github_actions,
    })?;

    let mut daily = store.load_daily_stats();
    let today = record_run(
        &mut daily,
        now,
        new_jobs.len(),
        new_filtered.len(),
        settings.stats.retention_days,
    );
    store.save_daily_stats(&daily)?;

    let summary = RunSummary {
        new_jobs: new_jobs.len(),
        new_filtered: &new_filtered,
        today: &today,
        total_jobs: all_jobs.len(),
        total_filtered: filtered_jobs.len(),
    };
    let notified = notify(settings, notifier, now, &summary).await;

    Ok(CycleReport {
        scraped: scraped.len(),
        new_jobs: new_jobs.len(),
        total_jobs: all_jobs.len(),
        total_filtered: filtered_jobs.len(),
        new_filtered,
        today,
        notified,
    })
}

/// Runs every query; a failing query contributes nothing. Postings are unique
/// by `job_id` across queries, first occurrence wins.
async fn scrape_all<S>(settings: &Settings, scraper: &S) -> Vec<JobPosting>
where
    S: Scraper + ?Sized,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut jobs = Vec::new();

    for query in &settings.queries {
        info!(keywords = %query.keywords, location = %query.location, "[CYCLE] Scraping query");
        match scraper.scrape(query).await {
            Ok(found) => {
                info!(count = found.len(), keywords = %query.keywords, "[CYCLE] Query scraped");
                for job in found {
                    if job.job_id.is_empty() {
                        warn!(title = %job.title, "[CYCLE] Dropping posting without job id");
                        continue;
                    }
                    if seen.insert(job.job_id.clone()) {
                        jobs.push(job);
                    }
                }
            }
            Err(e) => {
                error!(error = %e, keywords = %query.keywords, "[CYCLE][ERROR] Scraping failed");
            }
        }
    }

    if jobs.is_empty() {
        warn!("[CYCLE] No jobs scraped");
    }
    jobs
}

async fn notify<N>(
    settings: &Settings,
    notifier: &N,
    now: DateTime<Utc>,
    summary: &RunSummary<'_>,
) -> bool
where
    N: Notifier + ?Sized,
{
    let email = match run_report(
        &notifier.sender(),
        &notifier.recipient(),
        now,
        summary,
        settings.notify.preview_count,
    ) {
        Ok(email) => email,
        Err(e) => {
            error!(error = %e, "[CYCLE][ERROR] Failed to build report email");
            return false;
        }
    };

    match notifier.send(&email).await {
        Ok(()) => {
            info!(to = %email.to, "[CYCLE] Email notification sent");
            true
        }
        Err(e) => {
            error!(error = %e, "[CYCLE][ERROR] Failed to send email notification");
            false
        }
    }
}
