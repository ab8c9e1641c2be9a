//! LinkedIn job search over the public guest endpoints.
//!
//! The guest API serves HTML fragments, no login or browser needed:
//! - `/jobs-guest/jobs/api/seeMoreJobPostings/search` returns a page of job cards
//! - `/jobs-guest/jobs/api/jobPosting/{id}` returns a single posting with its description
//!
//! Requests are sequential with a configurable pause in between.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use jobwatch_core::config::{
    ExperienceLevel, JobType, PostedWithin, ScrapeQuery, ScraperSettings, SortBy,
};
use jobwatch_core::contract::{BoxError, JobPosting, Scraper};

pub const LINKEDIN_BASE_URL: &str = "https://www.linkedin.com";

const SEARCH_PATH: &str = "/jobs-guest/jobs/api/seeMoreJobPostings/search";
const POSTING_PATH: &str = "/jobs-guest/jobs/api/jobPosting";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum LinkedinError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
}

/// A job card from a search results page, before the description is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCard {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub date: String,
    pub link: String,
}

pub struct LinkedinScraper {
    client: reqwest::Client,
    base_url: String,
    settings: ScraperSettings,
}

impl LinkedinScraper {
    pub fn new(settings: &ScraperSettings) -> Result<Self, LinkedinError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.page_load_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(LinkedinError::Client)?;
        info!(
            timeout_secs = settings.page_load_timeout_secs,
            slow_mo_secs = settings.slow_mo_secs,
            "Initialized LinkedIn scraper"
        );
        Ok(Self {
            client,
            base_url: LINKEDIN_BASE_URL.to_string(),
            settings: settings.clone(),
        })
    }

    /// Points the scraper at another host (a mirror or a local test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(&self, url: &Url) -> Result<String, LinkedinError> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| LinkedinError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkedinError::Status {
                status,
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|source| LinkedinError::Request {
            url: url.to_string(),
            source,
        })
    }

    async fn pause(&self) {
        match Duration::try_from_secs_f64(self.settings.slow_mo_secs) {
            Ok(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
            Ok(_) => {}
            Err(e) => warn!(
                slow_mo_secs = self.settings.slow_mo_secs,
                error = %e,
                "Ignoring unusable slow_mo_secs"
            ),
        }
    }

    async fn fetch_description(&self, job_id: &str) -> Option<String> {
        let url = match Url::parse(&format!("{}{}/{}", self.base_url, POSTING_PATH, job_id)) {
            Ok(url) => url,
            Err(e) => {
                warn!(job_id, error = %e, "Invalid posting URL");
                return None;
            }
        };
        match self.fetch(&url).await {
            Ok(html) => parse_description(&html),
            Err(e) => {
                warn!(job_id, error = %e, "Could not fetch job description");
                None
            }
        }
    }

    async fn search_cards(&self, query: &ScrapeQuery) -> Result<Vec<JobCard>, LinkedinError> {
        let page_size = self.settings.page_size.max(1);
        let mut cards: Vec<JobCard> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut start = 0;

        while cards.len() < query.limit {
            let url = search_url(&self.base_url, query, start)?;
            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(e) if !cards.is_empty() => {
                    warn!(error = %e, start, "Search page failed, keeping results so far");
                    break;
                }
                Err(e) => return Err(e),
            };

            let page = parse_search_page(&html);
            let before = cards.len();
            for card in page {
                if cards.len() >= query.limit {
                    break;
                }
                if seen.insert(card.job_id.clone()) {
                    cards.push(card);
                }
            }
            debug!(start, added = cards.len() - before, "Search page parsed");

            // An empty page (or one that only repeats earlier cards) is the end.
            if cards.len() == before {
                break;
            }
            start += page_size;
            self.pause().await;
        }

        Ok(cards)
    }
}

#[async_trait]
impl Scraper for LinkedinScraper {
    async fn scrape(&self, query: &ScrapeQuery) -> Result<Vec<JobPosting>, BoxError> {
        info!(keywords = %query.keywords, location = %query.location, limit = query.limit, "Starting LinkedIn search");
        let cards = self.search_cards(query).await?;
        info!(cards = cards.len(), "Collected job cards, fetching descriptions");

        let mut postings = Vec::with_capacity(cards.len());
        for card in cards {
            self.pause().await;
            let description = self.fetch_description(&card.job_id).await.unwrap_or_default();
            postings.push(JobPosting {
                job_id: card.job_id,
                title: card.title,
                company: card.company,
                location: card.location,
                date: card.date,
                link: card.link,
                description,
                scraped_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            });
        }

        info!(count = postings.len(), "LinkedIn search completed");
        Ok(postings)
    }
}

/// Search page URL for `query`, starting at result offset `start`.
pub fn search_url(base_url: &str, query: &ScrapeQuery, start: usize) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("{base_url}{SEARCH_PATH}"))?;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("keywords", &query.keywords);
        params.append_pair("location", &query.location);
        if let Some(tpr) = time_filter(query.posted_within) {
            params.append_pair("f_TPR", tpr);
        }
        if !query.experience.is_empty() {
            let codes: Vec<&str> = query.experience.iter().map(|e| experience_code(*e)).collect();
            params.append_pair("f_E", &codes.join(","));
        }
        if !query.job_types.is_empty() {
            let codes: Vec<&str> = query.job_types.iter().map(|t| job_type_code(*t)).collect();
            params.append_pair("f_JT", &codes.join(","));
        }
        if query.sort_by == SortBy::Recent {
            params.append_pair("sortBy", "DD");
        }
        params.append_pair("start", &start.to_string());
    }
    Ok(url)
}

fn time_filter(posted_within: PostedWithin) -> Option<&'static str> {
    match posted_within {
        PostedWithin::Day => Some("r86400"),
        PostedWithin::Week => Some("r604800"),
        PostedWithin::Month => Some("r2592000"),
        PostedWithin::Any => None,
    }
}

fn experience_code(level: ExperienceLevel) -> &'static str {
    match level {
        ExperienceLevel::Internship => "1",
        ExperienceLevel::EntryLevel => "2",
        ExperienceLevel::Associate => "3",
        ExperienceLevel::MidSenior => "4",
        ExperienceLevel::Director => "5",
        ExperienceLevel::Executive => "6",
    }
}

fn job_type_code(job_type: JobType) -> &'static str {
    match job_type {
        JobType::FullTime => "F",
        JobType::PartTime => "P",
        JobType::Contract => "C",
        JobType::Temporary => "T",
        JobType::Internship => "I",
        JobType::Volunteer => "V",
    }
}

/// Parses the job cards of one search results fragment. Cards without a
/// recognisable job id are skipped.
pub fn parse_search_page(html: &str) -> Vec<JobCard> {
    let document = Html::parse_fragment(html);
    let Ok(card_selector) = Selector::parse(".base-search-card, .job-search-card") else {
        return Vec::new();
    };

    let mut cards = Vec::new();
    for card in document.select(&card_selector) {
        let link = first_attr(card, "a.base-card__full-link", "href")
            .or_else(|| card.value().attr("href").map(str::to_string))
            .map(|href| strip_query(&href))
            .unwrap_or_default();

        let job_id = card
            .value()
            .attr("data-entity-urn")
            .and_then(job_id_from_urn)
            .or_else(|| job_id_from_link(&link));
        let Some(job_id) = job_id else {
            debug!(link = %link, "Skipping card without job id");
            continue;
        };

        cards.push(JobCard {
            job_id,
            title: first_text(card, ".base-search-card__title").unwrap_or_default(),
            company: first_text(card, ".base-search-card__subtitle").unwrap_or_default(),
            location: first_text(card, ".job-search-card__location").unwrap_or_default(),
            date: first_attr(card, "time", "datetime").unwrap_or_default(),
            link,
        });
    }
    cards
}

/// Extracts the description text of a posting page, one line per text block.
pub fn parse_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for css in [".show-more-less-html__markup", ".description__text"] {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(el) = document.select(&selector).next() {
            let text = el
                .text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn first_text(scope: ElementRef<'_>, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    scope
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn first_attr(scope: ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    scope
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_query(href: &str) -> String {
    href.split(['?', '#']).next().unwrap_or(href).to_string()
}

/// `urn:li:jobPosting:3912345678` -> `3912345678`
fn job_id_from_urn(urn: &str) -> Option<String> {
    urn.rsplit(':')
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// `.../jobs/view/data-engineer-at-acme-3912345678` -> `3912345678`
fn job_id_from_link(link: &str) -> Option<String> {
    static TRAILING_ID: OnceLock<Option<Regex>> = OnceLock::new();
    let re = TRAILING_ID
        .get_or_init(|| Regex::new(r"/jobs/view/(?:[^/]*-)?(\d+)/?$").ok())
        .as_ref()?;
    re.captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
