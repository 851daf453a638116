//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the logging runtime.
///
/// Log calls themselves never fail; these cover setup and teardown.
#[derive(Debug, Error)]
pub enum Error {
    /// Flushing an output sink failed during cleanup.
    #[error("failed to flush log output: {0}")]
    Flush(#[source] std::io::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A global `tracing` subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    TracingInit(String),
}
