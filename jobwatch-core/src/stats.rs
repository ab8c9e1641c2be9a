//! Per-day run statistics kept in `daily_stats.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyStats {
    /// UTC date, `YYYY-MM-DD`.
    pub date: String,
    pub runs: u32,
    pub total_scraped: usize,
    pub total_filtered: usize,
    pub runs_detail: Vec<RunDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDetail {
    /// UTC time of day, `HH:MM`.
    pub time: String,
    pub scraped: usize,
    pub filtered: usize,
}

/// Adds one run to today's entry (creating it if needed) and trims the list to
/// the newest `retention_days` entries. Returns a copy of today's entry.
pub fn record_run(
    stats: &mut Vec<DailyStats>,
    now: DateTime<Utc>,
    scraped: usize,
    filtered: usize,
    retention_days: usize,
) -> DailyStats {
    let today = now.format("%Y-%m-%d").to_string();

    let idx = match stats.iter().position(|s| s.date == today) {
        Some(idx) => idx,
        None => {
            stats.push(DailyStats {
                date: today,
                ..Default::default()
            });
            stats.len() - 1
        }
    };

    let entry = &mut stats[idx];
    entry.runs += 1;
    entry.total_scraped += scraped;
    entry.total_filtered += filtered;
    entry.runs_detail.push(RunDetail {
        time: now.format("%H:%M").to_string(),
        scraped,
        filtered,
    });
    let today_entry = entry.clone();

    if stats.len() > retention_days {
        let excess = stats.len() - retention_days;
        stats.drain(..excess);
    }

    today_entry
}
