//! Structured log fields.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// A single key/value pair attached to a log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    key: Cow<'static, str>,
    value: Value,
}

impl Field {
    /// Create a field from any JSON-convertible value.
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn string(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self::new(key, Value::String(value.into()))
    }

    pub fn int(key: impl Into<Cow<'static, str>>, value: i64) -> Self {
        Self::new(key, value)
    }

    pub fn uint(key: impl Into<Cow<'static, str>>, value: u64) -> Self {
        Self::new(key, value)
    }

    /// Non-finite floats render as `null`.
    pub fn float(key: impl Into<Cow<'static, str>>, value: f64) -> Self {
        Self::new(key, value)
    }

    pub fn bool(key: impl Into<Cow<'static, str>>, value: bool) -> Self {
        Self::new(key, value)
    }

    pub fn strings<I, S>(key: impl Into<Cow<'static, str>>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|s| Value::String(s.into()))
            .collect::<Vec<_>>();
        Self::new(key, Value::Array(values))
    }

    /// Serialize an arbitrary value. Serialization failures are rendered
    /// in place of the value instead of being dropped.
    pub fn any<T: Serialize + ?Sized>(key: impl Into<Cow<'static, str>>, value: &T) -> Self {
        let value = serde_json::to_value(value)
            .unwrap_or_else(|e| Value::String(format!("<unserializable: {e}>")));
        Self::new(key, value)
    }

    /// An `error` field holding the error's display text.
    pub fn error(err: impl fmt::Display) -> Self {
        Self::string("error", err.to_string())
    }

    /// A list of error messages under `key`.
    pub fn errors<I, E>(key: impl Into<Cow<'static, str>>, errors: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: fmt::Display,
    {
        Self::strings(key, errors.into_iter().map(|e| e.to_string()))
    }

    /// Durations are rendered as floating point seconds.
    pub fn duration(key: impl Into<Cow<'static, str>>, value: Duration) -> Self {
        Self::float(key, value.as_secs_f64())
    }

    /// Timestamps are rendered in RFC 3339.
    pub fn time(key: impl Into<Cow<'static, str>>, value: DateTime<Utc>) -> Self {
        Self::string(key, value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// Raw bytes, rendered as (lossy) UTF-8 text.
    pub fn bytes(key: impl Into<Cow<'static, str>>, value: &[u8]) -> Self {
        Self::string(key, String::from_utf8_lossy(value).into_owned())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}
