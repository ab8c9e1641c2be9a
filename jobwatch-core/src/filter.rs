//! LLM filter step: batches new postings into prompts and keeps the ones the
//! [`Classifier`] selects.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::FilterSettings;
use crate::contract::{Classifier, JobPosting};

/// Runs every posting through the classifier in chunks of `settings.chunk_size`.
///
/// A chunk whose call fails is skipped; the others still count. Returned
/// postings are the scraped ones (never model output), unique by `job_id`, in
/// first-seen order.
pub async fn filter_jobs<C>(
    classifier: &C,
    settings: &FilterSettings,
    jobs: &[JobPosting],
) -> Vec<JobPosting>
where
    C: Classifier + ?Sized,
{
    if jobs.is_empty() {
        info!("No jobs to filter");
        return Vec::new();
    }

    let chunk_size = settings.chunk_size.max(1);
    let mut selected: Vec<JobPosting> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (n, chunk) in jobs.chunks(chunk_size).enumerate() {
        let chunk_no = n + 1;
        let prompt = match build_prompt(settings, chunk) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(chunk = chunk_no, error = %e, "Could not serialize chunk, skipping");
                continue;
            }
        };

        let ids = match classifier.select(&prompt).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(chunk = chunk_no, error = %e, "Classifier failed for chunk, skipping");
                continue;
            }
        };
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let passed: Vec<&JobPosting> = chunk
            .iter()
            .filter(|job| ids.contains(job.job_id.as_str()))
            .collect();
        info!(chunk = chunk_no, passed = passed.len(), "Chunk classified");

        for job in passed {
            if seen.insert(job.job_id.clone()) {
                selected.push(job.clone());
            }
        }
    }

    info!(total = selected.len(), "Total filtered jobs");
    selected
}

/// Prompt for one chunk: the criteria followed by the postings as JSON.
pub fn build_prompt(
    settings: &FilterSettings,
    chunk: &[JobPosting],
) -> Result<String, serde_json::Error> {
    let jobs_json = serde_json::to_string(chunk)?;
    let titles = settings
        .title_keywords
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let skills = settings.skills.join(", ");
    let min_skills = settings.min_skill_matches;
    let max_years = settings.max_experience_years;

    Ok(format!(
        "You receive a JSON array of LinkedIn job postings. Each posting has the fields \
job_id, title, company, location, date, link, description and scraped_at.\n\
\n\
Select only the postings that meet ALL of these criteria:\n\
\n\
1. Role title: contains {titles}, or is a similar software development role. \
Titles vary, so weigh skills and experience more than the exact title.\n\
\n\
2. Skills: mentions at least {min_skills} of these skills (case-insensitive): {skills}\n\
\n\
3. Experience: states or implies 0-{max_years} years of experience \
(for example \"entry level\", \"freshers\", \"0-{max_years} years\", \"1 year\").\n\
\n\
Respond with a JSON array of objects of the form {{\"job_id\": \"...\"}}, one per selected \
posting, and nothing else.\n\
\n\
Jobs: {jobs_json}\n"
    ))
}
