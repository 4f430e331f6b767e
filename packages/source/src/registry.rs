//! Source registry: loads the pipeline configuration and selects sources.
//!
//! The configuration artifact is a TOML document; a `.json` file of the
//! same shape is accepted too. A copy of `data/data_sources.toml` is baked
//! into the binary via [`include_str!`] and used when no file is found.

use std::path::{Path, PathBuf};

use parking_map_source_models::{ConfigError, PipelineConfig, SourceConfig};

use crate::SourceHandler;

/// Default location of the configuration artifact.
pub const DEFAULT_CONFIG_PATH: &str = "data/data_sources.toml";

/// Environment variable holding a comma-separated source id filter.
pub const SOURCES_ENV: &str = "PARKING_MAP_SOURCES";

/// Configuration embedded at compile time.
const BUNDLED_CONFIG: &str = include_str!("../../../data/data_sources.toml");

/// Parses configuration text. `path` picks the format (`.json` or TOML)
/// and labels errors.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the text is malformed, or any
/// validation error.
pub fn parse_config(text: &str, path: &Path) -> Result<PipelineConfig, ConfigError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: PipelineConfig = if is_json {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    config.validate()?;
    Ok(config)
}

/// Reads and validates the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, or any parse or
/// validation error.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&text, path)?;
    log::info!(
        "Loaded {} sources from {}",
        config.sources.len(),
        path.display()
    );
    Ok(config)
}

/// The configuration bundled with the binary.
///
/// # Errors
///
/// Returns [`ConfigError`] if the bundled document does not validate.
pub fn bundled_config() -> Result<PipelineConfig, ConfigError> {
    parse_config(BUNDLED_CONFIG, Path::new(DEFAULT_CONFIG_PATH))
}

/// Loads `path` if given; otherwise [`DEFAULT_CONFIG_PATH`] if it exists,
/// else the bundled configuration.
///
/// # Errors
///
/// Returns [`ConfigError`] if the chosen configuration cannot be loaded.
pub fn resolve_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default.is_file() {
        load_config(&default)
    } else {
        log::info!("No {DEFAULT_CONFIG_PATH} found, using bundled configuration");
        bundled_config()
    }
}

/// Returns the enabled sources to run, in configuration order, filtered by
/// the `--sources` CLI flag or the [`SOURCES_ENV`] variable. With neither
/// set, every enabled source is returned.
#[must_use]
pub fn select_sources(config: &PipelineConfig, cli_filter: Option<String>) -> Vec<SourceConfig> {
    let filter = cli_filter.or_else(|| std::env::var(SOURCES_ENV).ok());
    filter_sources(config, filter.as_deref())
}

/// [`select_sources`] without the environment lookup.
#[must_use]
pub fn filter_sources(config: &PipelineConfig, filter: Option<&str>) -> Vec<SourceConfig> {
    let enabled = config.enabled_sources().cloned();

    let Some(filter) = filter.filter(|f| !f.trim().is_empty()) else {
        return enabled.collect();
    };

    let ids: Vec<&str> = filter
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();

    for id in &ids {
        match config.sources.iter().find(|s| s.id == *id) {
            None => log::warn!("Unknown source id '{id}' in source filter"),
            Some(source) if !source.enabled => {
                log::warn!("Source '{id}' is disabled and will not run");
            }
            Some(_) => {}
        }
    }

    let selected: Vec<SourceConfig> = enabled.filter(|s| ids.contains(&s.id.as_str())).collect();

    if selected.is_empty() {
        log::warn!(
            "No matching sources found for filter {ids:?}. Available: {}",
            config
                .enabled_sources()
                .map(|s| s.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    selected
}

/// Builds handlers for `sources`.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownHandler`] for a source with an unknown
/// handler name.
pub fn build_handlers(
    config: &PipelineConfig,
    sources: Vec<SourceConfig>,
) -> Result<Vec<SourceHandler>, ConfigError> {
    sources
        .into_iter()
        .map(|source| SourceHandler::new(source, config.fetch.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use parking_map_source_models::HandlerKind;

    use super::*;

    #[test]
    fn bundled_config_is_valid() {
        let config = bundled_config().unwrap();
        assert!(!config.sources.is_empty());

        let ids: BTreeSet<&str> = config.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), config.sources.len());

        for source in &config.sources {
            assert!(!source.name.is_empty(), "{}: name is empty", source.id);
            assert!(source.config.fields_mapping.city.is_some(), "{}", source.id);
        }
    }

    #[test]
    fn bundled_config_has_both_handler_kinds() {
        let config = bundled_config().unwrap();
        let handlers = build_handlers(&config, config.sources.clone()).unwrap();
        let kinds: Vec<HandlerKind> = handlers.iter().map(SourceHandler::kind).collect();
        assert!(kinds.contains(&HandlerKind::ShapefileArchive));
        assert!(kinds.contains(&HandlerKind::PaginatedApi));
    }

    #[test]
    fn json_config_is_accepted() {
        let json = r#"{
            "sources": [{
                "id": "new_taipei_city",
                "name": "New Taipei City",
                "enabled": true,
                "handler": "new_taipei_handler",
                "config": {
                    "url": "https://example.test/api",
                    "format": "json_paginated",
                    "coordinate_system": "TWD97",
                    "fields_mapping": {"city": "fixed:新北市", "x": "tw97x", "y": "tw97y"}
                }
            }]
        }"#;
        let config = parse_config(json, Path::new("data_sources.json")).unwrap();
        assert_eq!(config.sources[0].id, "new_taipei_city");
        assert_eq!(config.fetch.max_concurrent_sources, 4);
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        assert!(matches!(
            parse_config("[[sources]\nid = ", Path::new("broken.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_config(&dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn filter_keeps_config_order_and_skips_disabled() {
        let mut config = bundled_config().unwrap();
        let all: Vec<String> = config.sources.iter().map(|s| s.id.clone()).collect();

        let reversed = all.iter().rev().cloned().collect::<Vec<_>>().join(",");
        let selected = filter_sources(&config, Some(&reversed));
        let selected_ids: Vec<&str> = selected.iter().map(|s| s.id.as_str()).collect();
        let expected: Vec<&str> = config
            .enabled_sources()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(selected_ids, expected);

        config.sources[0].enabled = false;
        let selected = filter_sources(&config, Some(&all[0]));
        assert!(selected.is_empty());

        assert!(filter_sources(&config, Some("no_such_source")).is_empty());
        assert_eq!(
            filter_sources(&config, None).len(),
            config.enabled_sources().count()
        );
    }
}
