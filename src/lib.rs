//! Contextual structured logging with request/process correlation.

pub mod compat;
pub mod config;
pub mod context;
pub mod error;
pub mod instrumentation;
pub mod logger;
pub mod mq;

pub use config::Config;
pub use context::{generate_id, LogContext};
pub use error::Error;
pub use logger::{Field, Level, Logger, LoggerFactory};
