#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetching framework for open-data parking sources.
//!
//! Provides the [`Scraper`] trait, page-numbered JSON ([`json_paginated`])
//! and CSV ([`csv_paginated`]) API scrapers, and HTTP retry with
//! exponential backoff ([`retry`]).
//!
//! This crate knows nothing about parking records or caching. It fetches
//! pages and normalises rows into [`serde_json::Value`] objects that callers
//! can filter and map however they like.

pub mod csv_paginated;
pub mod json_paginated;
pub mod retry;

use std::collections::BTreeMap;
use std::time::Duration;

pub use retry::RetryPolicy;

/// Errors that can occur during scraping operations.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a status that is not retried or that
    /// persisted through every retry.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Parsing the response body failed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A single page of scraped records.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    /// The records extracted from this page.
    pub records: Vec<serde_json::Value>,
    /// The zero-indexed page number of this result set.
    pub page_number: u32,
}

impl ScrapedPage {
    /// An empty page ends pagination.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Configuration shared across scraper implementations.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Base URL of the API.
    pub url: String,
    /// Additional HTTP headers to include in requests.
    pub headers: BTreeMap<String, String>,
    /// Query parameter carrying the page number.
    pub page_param: String,
    /// Query parameter carrying the page size.
    pub size_param: String,
    /// Number of records per page.
    pub page_size: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry behaviour for transient failures.
    pub retry: RetryPolicy,
}

impl ScrapeConfig {
    /// Creates a new `ScrapeConfig` with the given URL and defaults
    /// (`?page=N&size=1000`, 60 s timeout, default retry policy).
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            headers: BTreeMap::new(),
            page_param: "page".to_owned(),
            size_param: "size".to_owned(),
            page_size: 1_000,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the page number and page size parameter names.
    #[must_use]
    pub fn with_params(mut self, page_param: &str, size_param: &str) -> Self {
        page_param.clone_into(&mut self.page_param);
        size_param.clone_into(&mut self.size_param);
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Adds an HTTP header to include in requests.
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Builds the request URL for `page`, e.g. `{url}?page=2&size=1000`.
    #[must_use]
    pub fn page_url(&self, page: u32) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}{}={page}&{}={}",
            self.url, self.page_param, self.size_param, self.page_size
        )
    }
}

/// Builds a [`reqwest::Client`] with the given default headers and timeout.
///
/// # Errors
///
/// Returns [`ScrapeError::Parse`] for an invalid header name or value, or
/// [`ScrapeError::Http`] if the client cannot be built.
pub fn build_client(
    headers: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<reqwest::Client, ScrapeError> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ScrapeError::Parse(format!("invalid header name '{key}': {e}")))?;
        let val = reqwest::header::HeaderValue::from_str(value)
            .map_err(|e| ScrapeError::Parse(format!("invalid header value '{value}': {e}")))?;
        header_map.insert(name, val);
    }
    reqwest::Client::builder()
        .default_headers(header_map)
        .timeout(timeout)
        .build()
        .map_err(ScrapeError::Http)
}

/// Trait for fetching one page of structured data from a web source.
pub trait Scraper: Send + Sync {
    /// Fetches a single page of records. Page numbers start at 0.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the HTTP request or response parsing fails.
    fn fetch_page(
        &self,
        page: u32,
    ) -> impl std::future::Future<Output = Result<ScrapedPage, ScrapeError>> + Send;

    /// Returns the name of the scraping strategy (e.g. `"json_paginated"`).
    fn strategy(&self) -> &str;
}

/// Records collected from every page of a scraper.
#[derive(Debug, Clone, Default)]
pub struct ScrapeSummary {
    /// All records in page order.
    pub records: Vec<serde_json::Value>,
    /// Number of pages requested, including the terminating empty page.
    pub pages_fetched: u32,
    /// `true` when `max_pages` was reached before an empty page.
    pub truncated: bool,
}

/// Fetches pages from a scraper sequentially until an empty page is
/// returned or `max_pages` pages have been requested, with an optional
/// delay between requests.
///
/// # Errors
///
/// Returns the first [`ScrapeError`] encountered. Records from earlier
/// pages are discarded so that a partial result is never mistaken for a
/// complete one.
pub async fn scrape_all(
    scraper: &(impl Scraper + ?Sized),
    max_pages: u32,
    delay: Option<Duration>,
) -> Result<ScrapeSummary, ScrapeError> {
    let mut summary = ScrapeSummary::default();
    let mut page: u32 = 0;

    loop {
        if page >= max_pages {
            log::warn!(
                "Reached max pages ({max_pages}) for {} without an empty page, stopping",
                scraper.strategy()
            );
            summary.truncated = true;
            break;
        }

        if page > 0
            && let Some(delay) = delay
        {
            tokio::time::sleep(delay).await;
        }

        log::debug!("Fetching page {page}");
        let result = scraper.fetch_page(page).await?;
        summary.pages_fetched += 1;

        if result.is_empty() {
            log::debug!("Page {page} is empty, pagination complete");
            break;
        }

        log::debug!("Page {page}: {} records", result.records.len());
        summary.records.extend(result.records);
        page += 1;
    }

    log::info!(
        "Scrape complete: {} records over {} pages",
        summary.records.len(),
        summary.pages_fetched
    );
    Ok(summary)
}
