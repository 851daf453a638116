//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → LoggerFactory, AccessLog / Recovery, PolicyTable
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes mean building new components
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{ClientConfig, Config, LoggerConfig, OverrideConfig, ServerConfig};
pub use validation::ValidationError;

use crate::logger::LoggerFactory;

impl LoggerConfig {
    /// Build a factory writing to stdout and stderr.
    pub fn build_factory(&self) -> LoggerFactory {
        LoggerFactory::builder(&self.level, &self.namespace)
            .caller(self.caller)
            .build()
    }
}
