//! Per-endpoint logging policy for outbound HTTP calls.
//!
//! # Design Decisions
//! - Overrides are keyed by `(METHOD, path)` with the method upper-cased and
//!   the path trimmed of `/` and lower-cased, so `POST /Users/` and
//!   `post users` address the same entry
//! - Lookup is exact; anything not overridden uses the default policy
//! - The table is built once and only read afterwards

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What the client adapter logs and forwards for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointPolicy {
    pub log_request: bool,
    pub log_request_body: bool,
    pub log_response: bool,
    pub log_response_body: bool,
    /// Inject `x-log-process-id` / `x-log-request-id` into the outbound request.
    pub forward_correlation: bool,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self {
            log_request: true,
            log_request_body: true,
            log_response: true,
            log_response_body: true,
            forward_correlation: true,
        }
    }
}

impl EndpointPolicy {
    /// Disable everything, header forwarding included.
    pub fn skip_log(mut self) -> Self {
        Skip::Log.apply(&mut self);
        self
    }

    pub fn skip_request_body(mut self) -> Self {
        Skip::RequestBody.apply(&mut self);
        self
    }

    pub fn skip_response_body(mut self) -> Self {
        Skip::ResponseBody.apply(&mut self);
        self
    }

    /// Disable the request dump, body included.
    pub fn skip_request(mut self) -> Self {
        Skip::Request.apply(&mut self);
        self
    }

    /// Disable the response dump, body included.
    pub fn skip_response(mut self) -> Self {
        Skip::Response.apply(&mut self);
        self
    }

    /// Stop injecting correlation headers.
    pub fn no_context(mut self) -> Self {
        Skip::Context.apply(&mut self);
        self
    }
}

/// A policy override as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Skip {
    Log,
    RequestBody,
    ResponseBody,
    Request,
    Response,
    Context,
}

impl Skip {
    pub fn apply(self, policy: &mut EndpointPolicy) {
        match self {
            Skip::Log => {
                policy.log_request = false;
                policy.log_request_body = false;
                policy.log_response = false;
                policy.log_response_body = false;
                policy.forward_correlation = false;
            }
            Skip::RequestBody => policy.log_request_body = false,
            Skip::ResponseBody => policy.log_response_body = false,
            Skip::Request => {
                policy.log_request = false;
                policy.log_request_body = false;
            }
            Skip::Response => {
                policy.log_response = false;
                policy.log_response_body = false;
            }
            Skip::Context => policy.forward_correlation = false,
        }
    }
}

/// Normalized `(method, path)` lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    method: String,
    path: String,
}

impl EndpointKey {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.trim().to_ascii_uppercase(),
            path: path.trim_matches('/').to_lowercase(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Default policy plus exact per-endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyTable {
    default: EndpointPolicy,
    overrides: HashMap<EndpointKey, EndpointPolicy>,
}

impl PolicyTable {
    pub fn new(default: EndpointPolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Override the policy for `method` on each of `paths`.
    ///
    /// The first override of an endpoint starts from the default policy;
    /// later ones start from the policy already in the table, so options
    /// given for the same endpoint accumulate.
    pub fn with_override<'a>(
        mut self,
        method: &str,
        paths: impl IntoIterator<Item = &'a str>,
        configure: impl Fn(EndpointPolicy) -> EndpointPolicy,
    ) -> Self {
        for path in paths {
            let key = EndpointKey::new(method, path);
            let previous = self.overrides.get(&key).copied().unwrap_or(self.default);
            self.overrides.insert(key, configure(previous));
        }
        self
    }

    /// Apply `skip` on top of the default policy for each endpoint.
    pub fn with_skip<'a>(
        self,
        method: &str,
        paths: impl IntoIterator<Item = &'a str>,
        skip: Skip,
    ) -> Self {
        self.with_override(method, paths, |mut policy| {
            skip.apply(&mut policy);
            policy
        })
    }

    pub fn default_policy(&self) -> EndpointPolicy {
        self.default
    }

    /// Policy for a call, falling back to the default.
    pub fn resolve(&self, method: &str, path: &str) -> EndpointPolicy {
        self.overrides
            .get(&EndpointKey::new(method, path))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalization() {
        assert_eq!(EndpointKey::new("post", "/Users/"), EndpointKey::new("POST", "users"));
        assert_eq!(EndpointKey::new("get", "/a/B").path(), "a/b");
        assert_eq!(EndpointKey::new("get", "/").path(), "");
    }

    #[test]
    fn test_options_have_stated_effect() {
        let all = EndpointPolicy::default();

        let p = all.skip_request_body();
        assert!(p.log_request && !p.log_request_body && p.log_response_body);

        let p = all.skip_response_body();
        assert!(p.log_response && !p.log_response_body && p.log_request_body);

        let p = all.skip_request();
        assert!(!p.log_request && !p.log_request_body && p.log_response);

        let p = all.skip_response();
        assert!(!p.log_response && !p.log_response_body && p.log_request);

        let p = all.no_context();
        assert!(!p.forward_correlation && p.log_request && p.log_response);

        let p = all.skip_log();
        assert_eq!(
            p,
            EndpointPolicy {
                log_request: false,
                log_request_body: false,
                log_response: false,
                log_response_body: false,
                forward_correlation: false,
            }
        );
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let table = PolicyTable::default()
            .with_skip("POST", ["/skipped-path1", "skipped-path2/"], Skip::RequestBody)
            .with_override("get", ["/quiet"], EndpointPolicy::skip_log);

        assert!(!table.resolve("post", "/Skipped-Path1").log_request_body);
        assert!(!table.resolve("POST", "/skipped-path2").log_request_body);
        assert!(table.resolve("GET", "/skipped-path1").log_request_body);
        assert!(!table.resolve("GET", "/quiet").forward_correlation);
        assert_eq!(table.resolve("PUT", "/other"), EndpointPolicy::default());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_overrides_accumulate_per_endpoint() {
        let table = PolicyTable::default()
            .with_skip("POST", ["/x"], Skip::RequestBody)
            .with_skip("post", ["x/"], Skip::ResponseBody)
            .with_skip("POST", ["/y"], Skip::Context);

        let x = table.resolve("POST", "/x");
        assert!(!x.log_request_body);
        assert!(!x.log_response_body);
        assert!(x.log_request && x.log_response && x.forward_correlation);

        let y = table.resolve("POST", "/y");
        assert!(!y.forward_correlation && y.log_request_body);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_skip_names_in_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            skip: Skip,
        }
        let parsed: Wrapper = toml::from_str("skip = \"request_body\"").unwrap();
        assert_eq!(parsed.skip, Skip::RequestBody);
    }
}
