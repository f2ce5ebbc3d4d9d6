//! # histsync configuration
//!
//! Type-safe configuration for the content synchronization engine. Every
//! section has a `Default` impl, so an empty (or missing) TOML file yields a
//! working configuration.
//!
//! ```rust,no_run
//! use histsync_config::HistsyncConfig;
//!
//! # async fn example() -> Result<(), histsync_config::ConfigError> {
//! let config = HistsyncConfig::load(None).await?;
//! assert!(config.provider.rows_per_side() > 0);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod loader;
mod provider;

pub use error::ConfigError;
pub use loader::{default_config_path, HistsyncConfig, LoggingConfig};
pub use provider::{FitConfig, PollConfig, ProviderConfig};
