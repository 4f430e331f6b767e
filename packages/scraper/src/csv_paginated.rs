//! Page-numbered CSV API scraper.
//!
//! Each page is a CSV document with a header row. Rows become JSON objects
//! keyed by header; every cell is a string. A page whose body is blank, or
//! that has a header but no rows, is empty and ends pagination.

use crate::{ScrapeConfig, ScrapeError, ScrapedPage, Scraper, build_client, retry};

/// Scraper for page-numbered CSV APIs.
#[derive(Debug)]
pub struct CsvPaginatedScraper {
    config: ScrapeConfig,
    client: reqwest::Client,
}

impl CsvPaginatedScraper {
    /// Creates a scraper from a [`ScrapeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the HTTP client cannot be built from the
    /// configured headers.
    pub fn new(config: ScrapeConfig) -> Result<Self, ScrapeError> {
        let client = build_client(&config.headers, config.timeout)?;
        Ok(Self { config, client })
    }
}

/// Parses one CSV page into JSON objects keyed by the header row.
///
/// Malformed rows are skipped with a warning; the rest of the page is kept.
///
/// # Errors
///
/// Returns [`ScrapeError::Csv`] if the header row itself cannot be read.
pub fn parse_csv_page(body: &str, delimiter: u8) -> Result<Vec<serde_json::Value>, ScrapeError> {
    let body = body.trim_start_matches('\u{feff}');
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let mut records = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                log::warn!("Skipping malformed CSV row {}: {e}", index + 1);
                continue;
            }
        };

        let object: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(key, value)| (key.to_owned(), serde_json::Value::String(value.to_owned())))
            .collect();
        records.push(serde_json::Value::Object(object));
    }

    Ok(records)
}

impl Scraper for CsvPaginatedScraper {
    async fn fetch_page(&self, page: u32) -> Result<ScrapedPage, ScrapeError> {
        let url = self.config.page_url(page);
        log::debug!("Fetching CSV page {page}: {url}");

        let body = retry::send_text(&self.config.retry, || self.client.get(&url)).await?;
        let records = parse_csv_page(&body, b',')?;

        Ok(ScrapedPage {
            records,
            page_number: page,
        })
    }

    fn strategy(&self) -> &'static str {
        "csv_paginated"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rows_become_objects() {
        let body = "\u{feff}name,charged,x,y\n板橋停車場,身汽,296000.5,2770000.25\n";
        let records = parse_csv_page(body, b',').unwrap();
        assert_eq!(
            records,
            vec![json!({
                "name": "板橋停車場",
                "charged": "身汽",
                "x": "296000.5",
                "y": "2770000.25",
            })]
        );
    }

    #[test]
    fn blank_body_and_header_only_are_empty() {
        assert!(parse_csv_page("", b',').unwrap().is_empty());
        assert!(parse_csv_page("  \n ", b',').unwrap().is_empty());
        assert!(parse_csv_page("a,b\n", b',').unwrap().is_empty());
    }

    #[test]
    fn short_rows_keep_available_cells() {
        let records = parse_csv_page("a,b,c\n1,2\n4,5,6\n", b',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn tab_delimited() {
        let records = parse_csv_page("a\tb\n1\t2\n", b'\t').unwrap();
        assert_eq!(records, vec![json!({"a": "1", "b": "2"})]);
    }
}
