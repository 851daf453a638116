//! JSON line rendering for `tracing_subscriber::fmt`.
//!
//! Every record is one JSON object per line: `level`, `ts`, `logger`,
//! `caller`, `msg`, then the remaining fields in the order they were
//! attached. Duplicate keys are kept in order.
//!
//! # Design Decisions
//! - [`Logger`](super::Logger) records travel as events on [`RECORD_TARGET`]
//!   carrying their name, caller, severity and a pre-rendered field list
//! - Events from any other target are rendered with the factory namespace
//!   prefixed to the target as the logger name, after their span fields

use std::fmt::{self, Write};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::field::{Field as TracingField, Visit};
use tracing::span;
use tracing::{Event, Subscriber};
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

use super::{Field, Level};

/// Target of events emitted by [`Logger`](super::Logger).
pub(crate) const RECORD_TARGET: &str = "ctxlog::record";

/// Event formatter producing one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonLines {
    namespace: String,
    caller: bool,
}

impl JsonLines {
    pub fn new(namespace: impl Into<String>, caller: bool) -> Self {
        Self {
            namespace: namespace.into(),
            caller,
        }
    }

    fn logger_for(&self, target: &str) -> String {
        if self.namespace.is_empty() {
            target.to_string()
        } else {
            format!("{}.{}", self.namespace, target)
        }
    }
}

impl<S> FormatEvent<S, JsonFields> for JsonLines
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, JsonFields>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let own = metadata.target() == RECORD_TARGET;
        let mut visitor = JsonVisitor::new(own);
        event.record(&mut visitor);

        let level = visitor
            .level
            .take()
            .unwrap_or_else(|| Level::from(metadata.level()).as_str().to_string());
        let logger = match visitor.logger.take() {
            Some(logger) => logger,
            None => self.logger_for(metadata.target()),
        };
        let caller = match visitor.caller.take() {
            Some(caller) => Some(caller),
            None if own => None,
            None => metadata
                .file()
                .zip(metadata.line())
                .map(|(file, line)| format!("{file}:{line}")),
        };

        writer.write_str("{\"level\":")?;
        write_json(&mut writer, &level)?;
        writer.write_str(",\"ts\":")?;
        write_json(
            &mut writer,
            &Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        if !logger.is_empty() {
            writer.write_str(",\"logger\":")?;
            write_json(&mut writer, &logger)?;
        }
        if let Some(caller) = caller.filter(|_| self.caller) {
            writer.write_str(",\"caller\":")?;
            write_json(&mut writer, &caller)?;
        }
        writer.write_str(",\"msg\":")?;
        write_json(&mut writer, visitor.message.as_deref().unwrap_or_default())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<FormattedFields<JsonFields>>() {
                    writer.write_str(&fields.fields)?;
                }
            }
        }
        writer.write_str(&visitor.fields)?;
        writer.write_str("}\n")
    }
}

/// Span field formatter. Stores fields as `,"key":value` fragments that
/// [`JsonLines`] splices into the enclosing object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFields;

impl<'writer> FormatFields<'writer> for JsonFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut visitor = JsonVisitor::new(false);
        fields.record(&mut visitor);
        if let Some(message) = visitor.message.take() {
            visitor.push("message", &message);
        }
        writer.write_str(&visitor.fields)
    }

    fn add_fields(
        &self,
        current: &'writer mut FormattedFields<Self>,
        fields: &span::Record<'_>,
    ) -> fmt::Result {
        self.format_fields(current.as_writer(), fields)
    }
}

/// Pre-rendered field list carried by a [`Logger`](super::Logger) event.
pub(crate) struct Pairs<'a> {
    pub attached: &'a [Field],
    pub fields: &'a [Field],
}

impl fmt::Debug for Pairs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in self.attached.iter().chain(self.fields) {
            f.write_char(',')?;
            write_json(f, field.key())?;
            f.write_char(':')?;
            write_json(f, field.value())?;
        }
        Ok(())
    }
}

struct JsonVisitor {
    own: bool,
    level: Option<String>,
    logger: Option<String>,
    caller: Option<String>,
    message: Option<String>,
    fields: String,
}

impl JsonVisitor {
    fn new(own: bool) -> Self {
        Self {
            own,
            level: None,
            logger: None,
            caller: None,
            message: None,
            fields: String::new(),
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        self.fields.push(',');
        // Writing into a String cannot fail.
        let _ = write_json(&mut self.fields, key);
        self.fields.push(':');
        let _ = write_json(&mut self.fields, value);
    }
}

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &TracingField, value: &str) {
        let slot = match field.name() {
            "message" => &mut self.message,
            "level" if self.own => &mut self.level,
            "logger" if self.own => &mut self.logger,
            "caller" if self.own => &mut self.caller,
            name => return self.push(name, value),
        };
        *slot = Some(value.to_string());
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.push(field.name(), &value);
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.push(field.name(), &value);
    }

    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.push(field.name(), &value);
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.push(field.name(), &value);
    }

    fn record_error(&mut self, field: &TracingField, value: &(dyn std::error::Error + 'static)) {
        self.push(field.name(), &value.to_string());
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{value:?}")),
            "fields" if self.own => {
                let _ = write!(self.fields, "{value:?}");
            }
            name => self.push(name, &format!("{value:?}")),
        }
    }
}

fn write_json<W, T>(writer: &mut W, value: &T) -> fmt::Result
where
    W: fmt::Write + ?Sized,
    T: Serialize + ?Sized,
{
    let encoded = serde_json::to_string(value).map_err(|_| fmt::Error)?;
    writer.write_str(&encoded)
}
