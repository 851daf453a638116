//! Structured logging subsystem.
//!
//! # Data Flow
//! ```text
//! LoggerFactory::new(level, namespace)
//!     → root Logger (namespace, dispatcher with severity-split writers)
//!     → from_context(ctx, "rest") / with(fields) / named("sub")
//!     → derived Logger (dotted name, pre-attached fields)
//!     → debug/info/warn/error/fatal(msg, fields)
//!     → tracing event → fmt::Layer + JsonLines → stdout | stderr
//! ```
//!
//! # Design Decisions
//! - Loggers are immutable; every derivation returns a new handle
//! - Each factory owns its own `tracing` dispatcher; records never depend
//!   on the process-wide subscriber
//! - Disabled levels are rejected before any field is rendered
//! - Records at `error` and above go to the error sink, everything else
//!   enabled goes to the routine sink

mod bridge;
pub mod factory;
pub mod field;
pub mod fields;
pub mod format;
pub mod sink;

use std::fmt;
use std::io;
use std::panic::Location;
use std::sync::Arc;

use tracing::{Dispatch, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

use crate::context::LogContext;

pub use factory::{LoggerFactory, LoggerFactoryBuilder};
pub use field::Field;
pub use format::{JsonFields, JsonLines};
pub use sink::{MemorySink, Sink};

use format::{Pairs, RECORD_TARGET};
use sink::SplitWriter;

/// Field key carrying the request ID.
pub const REQUEST_ID_KEY: &str = "request_id";
/// Field key carrying the process ID.
pub const PROCESS_ID_KEY: &str = "process_id";

/// Record severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// Parse a minimum level name. Anything unrecognized maps to `Info`.
    pub fn parse(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            _ => Level::Debug,
        }
    }
}

impl From<Level> for tracing::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Debug => tracing::Level::DEBUG,
            Level::Info => tracing::Level::INFO,
            Level::Warn => tracing::Level::WARN,
            Level::Error | Level::Fatal => tracing::Level::ERROR,
        }
    }
}

/// Shared output configuration behind every logger derived from one factory.
pub(crate) struct Core {
    min_level: Level,
    filter: LevelFilter,
    dispatch: Dispatch,
    format: JsonLines,
    routine: Sink,
    errors: Sink,
}

impl Core {
    pub(crate) fn new(min_level: Level, format: JsonLines, routine: Sink, errors: Sink) -> Self {
        let filter = LevelFilter::from_level(min_level.into());
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer(&format, &routine, &errors));
        Self {
            min_level,
            filter,
            dispatch: Dispatch::new(subscriber),
            format,
            routine,
            errors,
        }
    }

    /// The formatting layer of this core, for stacking onto another subscriber.
    pub(crate) fn layer<S>(&self) -> tracing_fmt::Layer<S, JsonFields, JsonLines, SplitWriter>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fmt_layer(&self.format, &self.routine, &self.errors)
    }

    fn enabled(&self, level: Level) -> bool {
        tracing::Level::from(level) <= self.filter
    }

    fn flush(&self) -> io::Result<()> {
        let errors = self.errors.flush();
        self.routine.flush()?;
        errors
    }
}

fn fmt_layer<S>(
    format: &JsonLines,
    routine: &Sink,
    errors: &Sink,
) -> tracing_fmt::Layer<S, JsonFields, JsonLines, SplitWriter>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .fmt_fields(JsonFields)
        .event_format(format.clone())
        .with_writer(sink::split(routine, errors))
}

/// An immutable, namespaced logger with pre-attached fields.
///
/// Cheap to clone and safe to share between tasks.
#[derive(Clone)]
pub struct Logger {
    core: Option<Arc<Core>>,
    name: Arc<str>,
    fields: Arc<[Field]>,
}

impl Logger {
    pub(crate) fn from_core(core: Arc<Core>, name: &str) -> Self {
        Self {
            core: Some(core),
            name: Arc::from(name),
            fields: Arc::from(Vec::<Field>::new()),
        }
    }

    /// A logger that discards everything.
    pub fn nop() -> Self {
        Self {
            core: None,
            name: Arc::from(""),
            fields: Arc::from(Vec::<Field>::new()),
        }
    }

    pub(crate) fn core(&self) -> Option<&Core> {
        self.core.as_deref()
    }

    /// Dotted namespace of this logger.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields attached to every record of this logger.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Minimum enabled level, `None` for a no-op logger.
    pub fn level(&self) -> Option<Level> {
        self.core.as_ref().map(|core| core.min_level)
    }

    /// Derive a logger with `fields` appended to the attached set.
    pub fn with(&self, fields: impl IntoIterator<Item = Field>) -> Self {
        let mut merged = self.fields.to_vec();
        let before = merged.len();
        merged.extend(fields);
        if merged.len() == before {
            return self.clone();
        }
        Self {
            fields: Arc::from(merged),
            ..self.clone()
        }
    }

    /// Derive a logger named `<name>.<namespace>`. An empty namespace
    /// leaves the name unchanged.
    pub fn named(&self, namespace: &str) -> Self {
        if namespace.is_empty() {
            return self.clone();
        }
        let name = if self.name.is_empty() {
            namespace.to_string()
        } else {
            format!("{}.{}", self.name, namespace)
        };
        Self {
            name: Arc::from(name),
            ..self.clone()
        }
    }

    /// Attach the correlation metadata carried by `ctx`: `request_id` and
    /// `process_id` when present, then every bound field.
    pub fn with_context(&self, ctx: &LogContext) -> Self {
        if ctx.is_empty() {
            return self.clone();
        }
        let mut fields = Vec::with_capacity(ctx.fields().len() + 2);
        if let Some(request_id) = ctx.request_id() {
            fields.push(Field::string(REQUEST_ID_KEY, request_id));
        }
        if let Some(process_id) = ctx.bound_process_id() {
            fields.push(Field::string(PROCESS_ID_KEY, process_id));
        }
        fields.extend(ctx.fields().iter().cloned());
        self.with(fields)
    }

    /// Whether a record at `level` would be written.
    pub fn enabled(&self, level: Level) -> bool {
        self.core.as_ref().is_some_and(|core| core.enabled(level))
    }

    #[track_caller]
    pub fn debug(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Debug, msg, fields);
    }

    #[track_caller]
    pub fn info(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Info, msg, fields);
    }

    #[track_caller]
    pub fn warn(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Warn, msg, fields);
    }

    #[track_caller]
    pub fn error(&self, msg: &str, fields: &[Field]) {
        self.log(Level::Error, msg, fields);
    }

    /// Write a fatal record, flush, and terminate the process.
    #[track_caller]
    pub fn fatal(&self, msg: &str, fields: &[Field]) -> ! {
        self.log(Level::Fatal, msg, fields);
        let _ = self.sync();
        std::process::exit(1)
    }

    /// Write a record at `level`, tagging it with the calling location.
    #[track_caller]
    pub fn log(&self, level: Level, msg: &str, fields: &[Field]) {
        self.emit(level, msg, fields, Location::caller());
    }

    fn emit(&self, level: Level, msg: &str, fields: &[Field], caller: &Location<'_>) {
        let Some(core) = self.core.as_deref() else {
            return;
        };
        if !core.enabled(level) {
            return;
        }

        let name: &str = &self.name;
        let severity = level.as_str();
        let caller = format!("{}:{}", caller.file(), caller.line());
        let pairs = Pairs {
            attached: &self.fields,
            fields,
        };

        macro_rules! record {
            ($level:expr) => {
                tracing::event!(
                    target: RECORD_TARGET,
                    parent: None,
                    $level,
                    level = severity,
                    logger = name,
                    caller = caller.as_str(),
                    fields = ?pairs,
                    message = msg,
                )
            };
        }

        tracing::dispatcher::with_default(&core.dispatch, || match level {
            Level::Debug => record!(tracing::Level::DEBUG),
            Level::Info => record!(tracing::Level::INFO),
            Level::Warn => record!(tracing::Level::WARN),
            Level::Error | Level::Fatal => record!(tracing::Level::ERROR),
        });
    }

    /// Flush both sinks.
    pub fn sync(&self) -> io::Result<()> {
        match self.core.as_deref() {
            Some(core) => core.flush(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .field("level", &self.level())
            .finish()
    }
}
