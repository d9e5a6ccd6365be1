//! Harvest configuration snapshot.
//!
//! Loaded once at startup from a TOML file and passed by reference to every
//! component. The file carries a single `[custom_config]` table; every key
//! is optional and falls back to its default. Unknown keys are ignored so
//! config files written for other consumers of the same table still load.

use crate::limiter::PacerConfig;
use crate::Category;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was attempted
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has mistyped keys
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was attempted
        path: String,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of its accepted range
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    custom_config: HarvestConfig,
}

/// Full configuration for one harvest run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Collect availability calendars
    pub scrape_calendar: bool,
    /// Collect weekday/weekend pricing grids
    pub scrape_weekly_pricing: bool,
    /// Collect description documents
    pub scrape_description: bool,
    /// Request descriptions machine-translated to English
    #[serde(rename = "translate_description_to_English")]
    pub translate_description_to_english: bool,
    /// Collect reviews
    pub scrape_reviews: bool,
    /// Collect amenity inventories
    pub scrape_amenities: bool,
    /// Preview mode: cap listings and reviews for a quick sample run
    pub is_web_preview: bool,

    /// Listings harvested per category in preview mode
    pub preview_cap: usize,
    /// Reviews collected per listing in preview mode
    pub review_preview_cap: usize,

    /// Concurrent harvest jobs
    pub max_concurrency: usize,
    /// Retry budget per job for transient failures
    pub max_retries: u32,

    /// Upstream per-query result cap
    pub result_capacity: u32,
    /// Minimum tile span in degrees before accepting truncation
    pub min_tile_span_deg: f64,

    /// Weeks of stay windows to quote per listing
    pub weeks_ahead: u32,
    /// Guest counts the pricing grid covers
    pub guest_counts: Vec<u8>,
    /// Neighbors consulted when imputing a pricing cell
    pub knn_neighbors: usize,
    /// Display currency for quotes
    pub currency: String,

    /// Upstream origin
    pub base_url: String,
    /// API key sent with every request
    pub api_key: String,

    /// Minimum milliseconds between request starts
    pub min_request_interval_ms: u64,
    /// Random jitter added to each interval, in milliseconds
    pub request_jitter_ms: u64,
    /// First backoff delay after a throttling signal, in milliseconds
    pub initial_backoff_ms: u64,
    /// Backoff delay cap in milliseconds
    pub max_backoff_ms: u64,
    /// Consecutive throttling signals before giving up
    pub failure_ceiling: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            scrape_calendar: true,
            scrape_weekly_pricing: true,
            scrape_description: true,
            translate_description_to_english: false,
            scrape_reviews: true,
            scrape_amenities: true,
            is_web_preview: false,
            preview_cap: 50,
            review_preview_cap: 20,
            max_concurrency: 8,
            max_retries: 8,
            result_capacity: 240,
            min_tile_span_deg: 0.0005,
            weeks_ahead: 50,
            guest_counts: vec![2, 3, 4, 5, 6],
            knn_neighbors: 3,
            currency: "USD".to_string(),
            base_url: "https://www.airbnb.com".to_string(),
            api_key: "d306zoyjsyarp7ifhu67rjxn52tv0t20".to_string(),
            min_request_interval_ms: 280,
            request_jitter_ms: 120,
            initial_backoff_ms: 10_000,
            max_backoff_ms: 120_000,
            failure_ceiling: 8,
        }
    }
}

impl HarvestConfig {
    /// Load configuration from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        let config = file.custom_config;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.result_capacity == 0 {
            return Err(ConfigError::Invalid(
                "result_capacity must be at least 1".to_string(),
            ));
        }
        if self.guest_counts.is_empty() {
            return Err(ConfigError::Invalid(
                "guest_counts must not be empty".to_string(),
            ));
        }
        if self.knn_neighbors == 0 {
            return Err(ConfigError::Invalid(
                "knn_neighbors must be at least 1".to_string(),
            ));
        }
        if !(self.min_tile_span_deg > 0.0) {
            return Err(ConfigError::Invalid(
                "min_tile_span_deg must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The categories enabled by the toggle flags, in scheduling order.
    pub fn enabled_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|category| match category {
                Category::Calendar => self.scrape_calendar,
                Category::Pricing => self.scrape_weekly_pricing,
                Category::Description => self.scrape_description,
                Category::Reviews => self.scrape_reviews,
                Category::Amenities => self.scrape_amenities,
            })
            .collect()
    }

    /// Rate-controller parameters derived from the tuning knobs.
    pub fn pacer(&self) -> PacerConfig {
        PacerConfig {
            max_in_flight: self.max_concurrency,
            min_interval: Duration::from_millis(self.min_request_interval_ms),
            jitter: Duration::from_millis(self.request_jitter_ms),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            failure_ceiling: self.failure_ceiling,
        }
    }
}
