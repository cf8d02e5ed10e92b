//! Error types for the host binary.
//!
//! [`HostError`] wraps every failure mode during startup and while serving
//! console commands, so `main` can propagate with `?`.

use bastion_economy::EconomyError;
use bastion_store::StoreError;

use crate::config::ConfigError;

/// Top-level error for the host binary.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The property store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// An economy operation failed.
    #[error("economy error: {source}")]
    Economy {
        /// The underlying economy error.
        #[from]
        source: EconomyError,
    },

    /// Console input or output failed.
    #[error("console I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The logging subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
