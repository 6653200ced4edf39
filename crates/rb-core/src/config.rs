//! Engine configuration
//!
//! Every field has a default matching the live site, so an empty JSON object
//! is a valid configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::document::{BlockSelector, SelectorError};
use crate::marker::CHECKED_FLAG;
use crate::scheduler::{ScanTiming, INITIAL_DELAY, SCAN_INTERVAL};
use crate::settings::STORAGE_KEY;

/// Block selectors, tried in order: the current custom element, the generic
/// post container, then two legacy layouts.
pub const DEFAULT_SELECTORS: [&str; 4] = [
    "shreddit-post",
    r#"div[data-testid="post-container"]"#,
    ".Post",
    ".link",
];

/// Longest delay a browser timer accepts, in milliseconds.
pub const MAX_DELAY_MS: u64 = i32::MAX as u64;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid selector: {0}")]
    Selector(#[from] SelectorError),
    #[error("At least one block selector is required")]
    NoSelectors,
    #[error("Scan interval must be non-zero")]
    ZeroInterval,
    #[error("{0} must not be empty")]
    EmptyName(&'static str),
    #[error("{0} must be at most {max} ms", max = MAX_DELAY_MS)]
    DelayTooLong(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Key of the settings record in the persistence store.
    pub storage_key: String,
    /// Flag attached to evaluated blocks.
    pub checked_flag: String,
    /// Structural selectors identifying content blocks.
    pub selectors: Vec<String>,
    pub initial_delay_ms: u64,
    pub scan_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_key: STORAGE_KEY.to_string(),
            checked_flag: CHECKED_FLAG.to_string(),
            selectors: DEFAULT_SELECTORS.iter().map(|s| s.to_string()).collect(),
            initial_delay_ms: INITIAL_DELAY.as_millis() as u64,
            scan_interval_ms: SCAN_INTERVAL.as_millis() as u64,
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON object and validate it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::EmptyName("storage_key"));
        }
        if self.checked_flag.trim().is_empty() {
            return Err(ConfigError::EmptyName("checked_flag"));
        }
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.initial_delay_ms > MAX_DELAY_MS {
            return Err(ConfigError::DelayTooLong("initial_delay_ms"));
        }
        if self.scan_interval_ms > MAX_DELAY_MS {
            return Err(ConfigError::DelayTooLong("scan_interval_ms"));
        }
        self.block_selectors().map(|_| ())
    }

    /// Parsed selectors, in configured order.
    pub fn block_selectors(&self) -> Result<Vec<BlockSelector>, ConfigError> {
        if self.selectors.is_empty() {
            return Err(ConfigError::NoSelectors);
        }
        self.selectors
            .iter()
            .map(|s| BlockSelector::parse(s).map_err(ConfigError::from))
            .collect()
    }

    pub fn timing(&self) -> ScanTiming {
        ScanTiming {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            interval: Duration::from_millis(self.scan_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.block_selectors().unwrap().len(), 4);
        assert_eq!(config.timing(), ScanTiming::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json(r#"{ "selectors": ["article"], "scan_interval_ms": 250 }"#)
            .unwrap();
        assert_eq!(config.storage_key, STORAGE_KEY);
        assert_eq!(config.selectors, vec!["article"]);
        assert_eq!(config.timing().interval, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "selectors": [] }"#),
            Err(ConfigError::NoSelectors)
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "selectors": ["a b"] }"#),
            Err(ConfigError::Selector(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "scan_interval_ms": 0 }"#),
            Err(ConfigError::ZeroInterval)
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "storage_key": " " }"#),
            Err(ConfigError::EmptyName("storage_key"))
        ));
        assert!(matches!(EngineConfig::from_json("[1]"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_delays_must_fit_a_browser_timer() {
        let at_limit = format!(r#"{{ "initial_delay_ms": {0}, "scan_interval_ms": {0} }}"#, MAX_DELAY_MS);
        assert!(EngineConfig::from_json(&at_limit).is_ok());

        assert!(matches!(
            EngineConfig::from_json(r#"{ "initial_delay_ms": 2147483648 }"#),
            Err(ConfigError::DelayTooLong("initial_delay_ms"))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "scan_interval_ms": 18446744073709551615 }"#),
            Err(ConfigError::DelayTooLong("scan_interval_ms"))
        ));
    }
}
