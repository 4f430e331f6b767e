//! Page-numbered JSON API scraper.
//!
//! Handles APIs that return either a bare JSON array of records or an object
//! wrapping the array. The wrapper key can be configured as a dot path, or
//! left to auto-detection over the common `data`, `records` and `results`
//! keys.

use crate::{ScrapeConfig, ScrapeError, ScrapedPage, Scraper, build_client, retry};

/// Wrapper keys tried, in order, when no records path is configured.
pub const WRAPPER_KEYS: [&str; 3] = ["data", "records", "results"];

/// Scraper for page-numbered JSON APIs.
#[derive(Debug)]
pub struct JsonPaginatedScraper {
    config: ScrapeConfig,
    records_path: Option<String>,
    client: reqwest::Client,
}

impl JsonPaginatedScraper {
    /// Creates a scraper from a [`ScrapeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the HTTP client cannot be built from the
    /// configured headers.
    pub fn new(config: ScrapeConfig) -> Result<Self, ScrapeError> {
        let client = build_client(&config.headers, config.timeout)?;
        Ok(Self {
            config,
            records_path: None,
            client,
        })
    }

    /// Sets the dot-separated path to the record array (e.g. `"result.items"`).
    #[must_use]
    pub fn with_records_path(mut self, path: Option<&str>) -> Self {
        self.records_path = path.map(str::to_owned);
        self
    }
}

/// Navigates a dot-separated path into a [`serde_json::Value`].
fn resolve_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Extracts the record array from a JSON page body.
///
/// A bare array is used as-is. An object is unwrapped at `records_path` when
/// given, else at the first of [`WRAPPER_KEYS`] that holds an array.
///
/// # Errors
///
/// Returns [`ScrapeError::Parse`] if the body is not JSON or no record array
/// can be found.
pub fn parse_json_page(
    body: &str,
    records_path: Option<&str>,
) -> Result<Vec<serde_json::Value>, ScrapeError> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| ScrapeError::Parse(format!("invalid JSON page: {e}")))?;

    let array = match (records_path, value) {
        (Some(path), value) => resolve_path(&value, path)
            .ok_or_else(|| ScrapeError::Parse(format!("response does not contain path '{path}'")))?
            .clone(),
        (None, array @ serde_json::Value::Array(_)) => array,
        (None, serde_json::Value::Object(mut map)) => WRAPPER_KEYS
            .iter()
            .find_map(|key| map.remove(*key).filter(serde_json::Value::is_array))
            .ok_or_else(|| {
                ScrapeError::Parse(format!(
                    "JSON object has none of the record keys {WRAPPER_KEYS:?}"
                ))
            })?,
        (None, other) => {
            return Err(ScrapeError::Parse(format!(
                "unexpected JSON page type: {}",
                json_type(&other)
            )));
        }
    };

    match array {
        serde_json::Value::Array(records) => Ok(records),
        other => Err(ScrapeError::Parse(format!(
            "expected JSON array of records, got {}",
            json_type(&other)
        ))),
    }
}

const fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl Scraper for JsonPaginatedScraper {
    async fn fetch_page(&self, page: u32) -> Result<ScrapedPage, ScrapeError> {
        let url = self.config.page_url(page);
        log::debug!("Fetching JSON page {page}: {url}");

        let body = retry::send_text(&self.config.retry, || self.client.get(&url)).await?;
        let records = parse_json_page(&body, self.records_path.as_deref())?;

        Ok(ScrapedPage {
            records,
            page_number: page,
        })
    }

    fn strategy(&self) -> &'static str {
        "json_paginated"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_array() {
        let records = parse_json_page(r#"[{"a": 1}, {"a": 2}]"#, None).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn auto_detects_wrapper_keys() {
        for key in WRAPPER_KEYS {
            let body = json!({ "total": 1, key: [{"id": 7}] }).to_string();
            let records = parse_json_page(&body, None).unwrap();
            assert_eq!(records, vec![json!({"id": 7})], "key {key}");
        }
    }

    #[test]
    fn explicit_records_path() {
        let body = r#"{"result": {"items": [{"id": 1}]}}"#;
        let records = parse_json_page(body, Some("result.items")).unwrap();
        assert_eq!(records.len(), 1);

        assert!(parse_json_page(body, Some("result.missing")).is_err());
    }

    #[test]
    fn empty_array_and_blank_body_are_empty_pages() {
        assert!(parse_json_page("[]", None).unwrap().is_empty());
        assert!(parse_json_page("  \n", None).unwrap().is_empty());
        assert!(parse_json_page(r#"{"data": []}"#, None).unwrap().is_empty());
    }

    #[test]
    fn rejects_unwrappable_object() {
        assert!(parse_json_page(r#"{"message": "error"}"#, None).is_err());
        assert!(parse_json_page(r#"{"data": "nope"}"#, None).is_err());
        assert!(parse_json_page("42", None).is_err());
        assert!(parse_json_page("{not json", None).is_err());
    }

    #[test]
    fn strips_byte_order_mark() {
        let records = parse_json_page("\u{feff}[{\"a\": 1}]", None).unwrap();
        assert_eq!(records.len(), 1);
    }
}
