//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::instrumentation::{EndpointPolicy, PolicyTable, Skip};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logger factory settings.
    pub logger: LoggerConfig,

    /// Inbound HTTP instrumentation.
    pub server: ServerConfig,

    /// Outbound HTTP instrumentation.
    pub client: ClientConfig,
}

/// Logger factory settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    /// Minimum level: debug, info, warn or error. Anything else means info.
    pub level: String,

    /// Root logger name.
    pub namespace: String,

    /// Include the `caller` field in records.
    pub caller: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            namespace: "app".to_string(),
            caller: true,
        }
    }
}

/// Inbound HTTP instrumentation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Paths excluded from the access log (exact match).
    pub skip_paths: Vec<String>,

    /// Attach the panic backtrace to recovery records.
    pub stack_traces: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            skip_paths: Vec::new(),
            stack_traces: true,
        }
    }
}

/// Outbound HTTP instrumentation: the default policy plus overrides.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub log_request: bool,
    pub log_request_body: bool,
    pub log_response: bool,
    pub log_response_body: bool,
    pub forward_correlation: bool,

    /// Per-endpoint overrides, applied in order.
    pub overrides: Vec<OverrideConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let policy = EndpointPolicy::default();
        Self {
            log_request: policy.log_request,
            log_request_body: policy.log_request_body,
            log_response: policy.log_response,
            log_response_body: policy.log_response_body,
            forward_correlation: policy.forward_correlation,
            overrides: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Default policy as configured.
    pub fn default_policy(&self) -> EndpointPolicy {
        EndpointPolicy {
            log_request: self.log_request,
            log_request_body: self.log_request_body,
            log_response: self.log_response,
            log_response_body: self.log_response_body,
            forward_correlation: self.forward_correlation,
        }
    }

    /// Build the lookup table used by the client adapter.
    pub fn policy_table(&self) -> PolicyTable {
        self.overrides
            .iter()
            .fold(PolicyTable::new(self.default_policy()), |table, o| {
                table.with_skip(&o.method, o.paths.iter().map(String::as_str), o.skip)
            })
    }
}

/// One override entry: `skip` applied to `method` on each of `paths`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OverrideConfig {
    pub method: String,
    pub paths: Vec<String>,
    pub skip: Skip,
}
