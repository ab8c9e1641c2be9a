/// CLI interface for jobwatch: command parsing, wiring of the concrete
/// adapters, and user-visible output.
///
/// All pipeline logic (dedup, filtering, persistence, reports) lives in
/// [`jobwatch_core`]. This module only builds the LinkedIn scraper, the Gemini
/// classifier and the SMTP mailer from config and hands them to
/// [`run_cycle`].
///
/// ## Subcommands
/// - `run`: one scheduled cycle (scrape, filter, persist, email)
/// - `stats`: read-only view of the data directory, no secrets required
use crate::gemini::GeminiClient;
use crate::linkedin::LinkedinScraper;
use crate::load_config::{load_config, load_settings};
use crate::mailer::SmtpMailer;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use jobwatch_core::cycle::{run_cycle, CycleReport};
use jobwatch_core::store::JobStore;
use std::path::PathBuf;

/// Scrape LinkedIn jobs, filter them with Gemini and email a report.
#[derive(Parser)]
#[clap(
    name = "jobwatch",
    version,
    about = "Scheduled LinkedIn job scraper with LLM filtering and email reports"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one scrape/filter/notify cycle
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Show the last run and recent daily statistics
    Stats {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Number of most recent days to show
        #[clap(long, default_value_t = 7)]
        days: usize,
    },
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(config)?;
            let settings = &config.settings;
            let secrets = &config.secrets;
            tracing::info!(command = "run", "Starting job scraping cycle");

            let scraper =
                LinkedinScraper::new(&settings.scraper).context("Failed to build scraper")?;
            let classifier = GeminiClient::new(&secrets.gemini_api_key, &settings.filter.model)
                .context("Failed to build Gemini client")?;
            let mailer = SmtpMailer::new(
                &settings.notify.smtp_host,
                settings.notify.smtp_port,
                &secrets.gmail_email,
                &secrets.gmail_app_password,
                settings.notify.recipient.clone(),
            );
            let store = JobStore::new(&settings.data_dir);

            match run_cycle(settings, &scraper, &classifier, &mailer, &store, Utc::now()).await {
                Ok(report) => {
                    tracing::info!(command = "run", new_jobs = report.new_jobs, "Cycle complete");
                    print_summary(&report);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "run", error = %e, "Cycle failed");
                    Err(anyhow::Error::new(e).context("Job scraping cycle failed"))
                }
            }
        }
        Commands::Stats { config, days } => {
            let settings = load_settings(config)?;
            let store = JobStore::new(&settings.data_dir);
            tracing::info!(command = "stats", data_dir = ?store.dir(), "Reading statistics");
            print_stats(&store, days);
            Ok(())
        }
    }
}

fn print_summary(report: &CycleReport) {
    println!("Cycle summary");
    println!("  Scraped this run:     {}", report.scraped);
    println!("  New jobs:             {}", report.new_jobs);
    println!("  New filtered jobs:    {}", report.new_filtered.len());
    println!("  Total jobs stored:    {}", report.total_jobs);
    println!("  Total filtered jobs:  {}", report.total_filtered);
    println!(
        "  Today ({}): {} runs, {} scraped, {} filtered",
        report.today.date, report.today.runs, report.today.total_scraped, report.today.total_filtered
    );
    if !report.notified {
        println!("  Report email was NOT sent (see logs)");
    }
}

fn print_stats(store: &JobStore, days: usize) {
    match store.load_last_run() {
        Some(last) => {
            println!("Last run: {}", last.timestamp);
            println!("  New jobs: {}, new filtered: {}", last.new_jobs, last.new_filtered);
            println!(
                "  Totals: {} jobs, {} filtered",
                last.total_jobs, last.total_filtered
            );
        }
        None => println!("No runs recorded yet"),
    }

    let stats = store.load_daily_stats();
    if stats.is_empty() {
        println!("No daily statistics recorded");
        return;
    }
    println!("Daily statistics (most recent {days} days):");
    for day in stats.iter().rev().take(days) {
        println!(
            "  {}: {} runs, {} scraped, {} filtered",
            day.date, day.runs, day.total_scraped, day.total_filtered
        );
    }
}
