//! Error types for the synchronization engine.

use thiserror::Error;

/// Errors that can occur while loading, caching or orchestrating content.
#[derive(Error, Debug)]
pub enum Error {
    /// The server rejected or failed a fetch.
    #[error("Server error: {0}")]
    Server(String),

    /// The server does not know the requested list.
    #[error("List '{0}' not found")]
    ListNotFound(String),

    /// Local cache failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Filter text could not be parsed.
    #[error("Invalid filter '{token}': {reason}")]
    InvalidFilter {
        /// Offending token from the filter text
        token: String,
        /// Why it was rejected
        reason: String,
    },

    /// Scroll position text could not be parsed.
    #[error("Invalid scroll position '{0}'")]
    InvalidPosition(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] histsync_config::ConfigError),

    /// The provider has been shut down.
    #[error("Content provider is shut down")]
    Shutdown,
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, Error>;

