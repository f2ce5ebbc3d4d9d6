//! Content provider configuration: window sizing, debounce timings, polling
//! backoff and curve-fit precision.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one content provider instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Rows per page. The fetch and cache windows are multiples of this.
    pub page_size: usize,
    /// Pages fetched on each side of the target key.
    pub window_pages: usize,
    /// Quiet period before a scroll position is considered settled.
    pub scroll_debounce_ms: u64,
    /// Quiet period collapsing bursts of cache writes into one render.
    pub cache_debounce_ms: u64,
    /// Delay before a "no results yet" placeholder is published.
    pub placeholder_timeout_ms: u64,
    /// How far (in hids) below the previous head a position may sit and still
    /// follow the head when new rows arrive.
    pub head_tolerance: i64,
    /// Curve-fit settings
    pub fit: FitConfig,
    /// Background polling settings
    pub poll: PollConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            window_pages: 2,
            scroll_debounce_ms: 100,
            cache_debounce_ms: 20,
            placeholder_timeout_ms: 1000,
            head_tolerance: 2,
            fit: FitConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Rows requested (and watched) on each side of the target key.
    pub fn rows_per_side(&self) -> usize {
        self.page_size.saturating_mul(self.window_pages)
    }

    /// Scroll debounce as a [`Duration`].
    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    /// Cache debounce as a [`Duration`].
    pub fn cache_debounce(&self) -> Duration {
        Duration::from_millis(self.cache_debounce_ms)
    }

    /// Placeholder timeout as a [`Duration`].
    pub fn placeholder_timeout(&self) -> Duration {
        Duration::from_millis(self.placeholder_timeout_ms)
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Enable or disable background polling.
    pub fn with_polling(mut self, enabled: bool) -> Self {
        self.poll.enabled = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::invalid("provider.page_size", "must be at least 1"));
        }
        if self.window_pages == 0 {
            return Err(ConfigError::invalid(
                "provider.window_pages",
                "must be at least 1",
            ));
        }
        if self.head_tolerance < 0 {
            return Err(ConfigError::invalid(
                "provider.head_tolerance",
                "must not be negative",
            ));
        }
        self.fit.validate()?;
        self.poll.validate()
    }
}

/// Background polling configuration.
///
/// The poll interval starts at `initial_interval_ms`, doubles after every
/// quiet cycle up to `max_interval_ms`, and drops back to the initial value
/// whenever a mutation signal for the list is observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Whether the loader keeps re-issuing the fetch after the first response
    pub enabled: bool,
    /// First poll interval in milliseconds
    pub initial_interval_ms: u64,
    /// Upper bound on the poll interval in milliseconds
    pub max_interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval_ms: 1000,
            max_interval_ms: 30_000,
        }
    }
}

impl PollConfig {
    /// Initial interval as a [`Duration`].
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    /// Maximum interval as a [`Duration`].
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "provider.poll.initial_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(ConfigError::invalid(
                "provider.poll.max_interval_ms",
                format!(
                    "must be >= initial_interval_ms ({})",
                    self.initial_interval_ms
                ),
            ));
        }
        Ok(())
    }
}

/// Curve-fit precision and fit-store sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Decimal places kept for cursor x values (cursor → hid fit)
    pub cursor_precision: u32,
    /// Decimal places kept for hid x values (hid → top rows fit)
    pub key_precision: u32,
    /// Decimal places kept for every fitted y value
    pub value_precision: u32,
    /// Number of (list, filters) fit pairs retained before LRU eviction
    pub store_capacity: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            cursor_precision: 6,
            key_precision: 0,
            value_precision: 2,
            store_capacity: 32,
        }
    }
}

impl FitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        // 10^15 is the last power of ten an f64 mantissa still represents exactly
        for (field, value) in [
            ("provider.fit.cursor_precision", self.cursor_precision),
            ("provider.fit.key_precision", self.key_precision),
            ("provider.fit.value_precision", self.value_precision),
        ] {
            if value > 15 {
                return Err(ConfigError::invalid(field, "must be at most 15"));
            }
        }
        if self.store_capacity == 0 {
            return Err(ConfigError::invalid(
                "provider.fit.store_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
