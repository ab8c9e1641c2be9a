//! Email composition for run reports and failure alerts.

use chrono::{DateTime, Utc};

use crate::contract::{Attachment, Email, JobPosting};
use crate::stats::DailyStats;

/// Everything a run report shows.
#[derive(Debug, Clone)]
pub struct RunSummary<'a> {
    pub new_jobs: usize,
    pub new_filtered: &'a [JobPosting],
    pub today: &'a DailyStats,
    pub total_jobs: usize,
    pub total_filtered: usize,
}

pub fn run_report(
    from: &str,
    to: &str,
    now: DateTime<Utc>,
    summary: &RunSummary<'_>,
    preview_count: usize,
) -> Result<Email, serde_json::Error> {
    let new_filtered = summary.new_filtered.len();
    let rule = "=".repeat(50);

    let mut body = format!(
        "jobwatch run report\n\
{rule}\n\
\n\
Run time: {run_time} UTC\n\
\n\
This run:\n\
- New jobs scraped: {new_jobs}\n\
- New filtered jobs: {new_filtered}\n\
\n\
Today so far:\n\
- Runs: {runs}\n\
- Jobs scraped: {scraped}\n\
- Filtered jobs: {filtered}\n\
\n\
Database totals:\n\
- All jobs: {total_jobs}\n\
- Filtered jobs: {total_filtered}\n\
\n",
        run_time = now.format("%Y-%m-%d %H:%M:%S"),
        new_jobs = summary.new_jobs,
        runs = summary.today.runs,
        scraped = summary.today.total_scraped,
        filtered = summary.today.total_filtered,
        total_jobs = summary.total_jobs,
        total_filtered = summary.total_filtered,
    );

    if new_filtered > 0 {
        body.push_str(&format!("New filtered jobs:\n{}\n", "-".repeat(40)));
        for (i, job) in summary.new_filtered.iter().take(preview_count).enumerate() {
            body.push_str(&format!(
                "\n{n}. {title}\n   Company: {company}\n   Location: {location}\n   Link: {link}\n   Posted: {date}\n",
                n = i + 1,
                title = or_na(&job.title),
                company = or_na(&job.company),
                location = or_na(&job.location),
                link = or_na(&job.link),
                date = or_na(&job.date),
            ));
        }
        if new_filtered > preview_count {
            body.push_str(&format!(
                "\n... and {} more jobs!\n",
                new_filtered - preview_count
            ));
        }
    } else {
        body.push_str("No new filtered jobs found in this run.\n");
    }

    body.push_str(
        "\nNext scheduled run: in about 6 hours.\n\
Full data: the job_data/ folder of the repository.\n",
    );

    let mut attachments = Vec::new();
    if new_filtered > 0 {
        let json = serde_json::to_string_pretty(summary.new_filtered)?;
        attachments.push(Attachment {
            filename: format!("new_jobs_{}.json", now.format("%Y%m%d_%H%M")),
            content_type: "application/json".to_string(),
            content: json.into_bytes(),
        });
    }

    Ok(Email {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("Job Scraper Report - {} UTC", now.format("%Y-%m-%d %H:%M")),
        body,
        attachments,
    })
}

/// Alert sent when a cycle aborts.
pub fn error_report(from: &str, to: &str, now: DateTime<Utc>, error: &str) -> Email {
    let body = format!(
        "jobwatch error\n\
{rule}\n\
\n\
Time: {time} UTC\n\
Error: {error}\n\
\n\
Action required:\n\
1. Check the workflow run logs\n\
2. Verify the GEMINI_API_KEY, GMAIL_EMAIL and GMAIL_APP_PASSWORD secrets\n\
3. Check LinkedIn and Gemini API status\n",
        rule = "=".repeat(40),
        time = now.format("%Y-%m-%d %H:%M:%S"),
    );

    Email {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("Job Scraper ERROR - {}", now.format("%Y-%m-%d %H:%M")),
        body,
        attachments: Vec::new(),
    }
}

fn or_na(s: &str) -> &str {
    if s.is_empty() {
        "N/A"
    } else {
        s
    }
}
