//! Paginated API payloads.
//!
//! Every page of the API is collected with [`scrape_all`] and the combined
//! records are stored in the cache as one JSON array. A run cut short by
//! `max_pages` is used but never cached, so a cached payload always
//! represents a complete pagination run.

use std::time::Duration;

use parking_map_cache::Fetched;
use parking_map_parking_models::report::ReportSink;
use parking_map_scraper::{RetryPolicy, ScrapeConfig, Scraper, scrape_all};
use parking_map_source_models::{FetchConfig, SourceSettings};
use serde_json::Value;

use crate::{RawRecord, SourceError};

/// Builds the scraper configuration for a paginated source.
#[must_use]
pub fn scrape_config(settings: &SourceSettings, fetch: &FetchConfig) -> ScrapeConfig {
    let config = ScrapeConfig::new(&settings.url)
        .with_params(&settings.page_param, &settings.size_param)
        .with_page_size(settings.page_size)
        .with_timeout(fetch.request_timeout())
        .with_retry(RetryPolicy::new(fetch.max_retries, fetch.base_delay()));

    settings
        .headers
        .iter()
        .fold(config, |config, (key, value)| config.with_header(key, value))
}

/// Fetches every page and encodes the records as a JSON array.
///
/// Reaching `max_pages` before an empty page keeps what was collected,
/// reports a warning and marks the payload [`Fetched::partial`].
///
/// # Errors
///
/// Returns [`SourceError::Scrape`] if any page fails; earlier pages are
/// discarded.
pub async fn collect_pages(
    source_id: &str,
    scraper: &(impl Scraper + ?Sized),
    max_pages: u32,
    delay: Option<Duration>,
    sink: &dyn ReportSink,
) -> Result<Fetched, SourceError> {
    let summary = scrape_all(scraper, max_pages, delay).await?;

    if summary.truncated {
        sink.warn(
            source_id,
            &format!(
                "Stopped after {max_pages} pages without reaching an empty page; \
                 {} records may be incomplete",
                summary.records.len()
            ),
        );
    }

    sink.info(
        source_id,
        &format!(
            "Fetched {} records over {} pages",
            summary.records.len(),
            summary.pages_fetched
        ),
    );

    let bytes = serde_json::to_vec(&summary.records)?;
    Ok(if summary.truncated {
        Fetched::partial(bytes)
    } else {
        bytes.into()
    })
}

/// Decodes a cached payload back into records.
///
/// Array elements that are not JSON objects are skipped with a warning.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if the payload is not a JSON array.
pub fn decode_records(
    source_id: &str,
    bytes: &[u8],
    sink: &dyn ReportSink,
) -> Result<Vec<RawRecord>, SourceError> {
    let values: Vec<Value> = serde_json::from_slice(bytes)?;

    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match value {
            Value::Object(attributes) => records.push(RawRecord {
                index,
                attributes,
                geometry: None,
            }),
            other => sink.warn(
                source_id,
                &format!("Skipping record {index}: expected an object, got {other}"),
            ),
        }
    }

    Ok(records)
}
