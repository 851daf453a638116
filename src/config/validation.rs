//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the bind address parses as a socket address
//! - Check override methods are HTTP method tokens with at least one path
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use http::Method;
use thiserror::Error;

use crate::config::schema::Config;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("logger.namespace must not be empty")]
    EmptyNamespace,

    #[error("server.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("client.overrides[{index}].method {method:?} is not an HTTP method")]
    InvalidMethod { index: usize, method: String },

    #[error("client.overrides[{index}] has no paths")]
    NoPaths { index: usize },
}

pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.logger.namespace.trim().is_empty() {
        errors.push(ValidationError::EmptyNamespace);
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }

    for (index, entry) in config.client.overrides.iter().enumerate() {
        let method = entry.method.trim();
        if method.is_empty() || Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod {
                index,
                method: entry.method.clone(),
            });
        }
        if entry.paths.is_empty() {
            errors.push(ValidationError::NoPaths { index });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
