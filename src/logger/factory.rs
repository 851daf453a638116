//! Logger construction and context-aware resolution.
//!
//! # Responsibilities
//! - Build the root logger from a minimum level and a namespace
//! - Split output by severity into a routine sink and an error sink
//! - Resolve per-context loggers for adapters and business code
//! - Flush output at shutdown
//!
//! # Design Decisions
//! - No process-wide mutable logger: the factory is an owned value,
//!   cloned into every component that resolves loggers
//! - Reconfiguring means building a new factory and handing it out

use std::sync::Arc;

use crate::context::LogContext;
use crate::error::Error;

use super::{Core, JsonLines, Level, Logger, Sink};

/// Owns the logging configuration and hands out loggers.
#[derive(Clone, Debug)]
pub struct LoggerFactory {
    root: Logger,
}

impl LoggerFactory {
    /// Logger writing `[level, error)` to stdout and `error` and above to stderr.
    pub fn new(level: &str, namespace: &str) -> Self {
        Self::builder(level, namespace).build()
    }

    /// Start a builder for custom outputs.
    pub fn builder(level: &str, namespace: &str) -> LoggerFactoryBuilder {
        LoggerFactoryBuilder {
            level: Level::parse(level),
            namespace: namespace.to_string(),
            routine: None,
            errors: None,
            caller: true,
        }
    }

    /// A factory whose loggers discard everything.
    pub fn nop() -> Self {
        Self {
            root: Logger::nop(),
        }
    }

    /// The root logger, named by the factory namespace.
    pub fn logger(&self) -> &Logger {
        &self.root
    }

    /// Minimum enabled level, `None` for a no-op factory.
    pub fn level(&self) -> Option<Level> {
        self.root.level()
    }

    /// Resolve a logger for `ctx`, named `<namespace>.<sub_namespace>`.
    ///
    /// Attaches `request_id` and `process_id` when the context carries them
    /// (absent IDs are omitted, not generated) and every bound field.
    /// Performs no I/O.
    pub fn from_context(&self, ctx: &LogContext, sub_namespace: &str) -> Logger {
        self.root.with_context(ctx).named(sub_namespace)
    }

    /// Flush buffered output. Call once at shutdown.
    pub fn cleanup(&self) -> Result<(), Error> {
        self.root.sync().map_err(Error::Flush)
    }
}

impl Default for LoggerFactory {
    fn default() -> Self {
        Self::nop()
    }
}

/// Builder for [`LoggerFactory`].
pub struct LoggerFactoryBuilder {
    level: Level,
    namespace: String,
    routine: Option<Sink>,
    errors: Option<Sink>,
    caller: bool,
}

impl LoggerFactoryBuilder {
    /// Destination for records below `error`. Defaults to stdout.
    ///
    /// Accepts a [`Sink`], a [`MemorySink`](super::MemorySink), or any
    /// `tracing_subscriber` writer factory wrapped with [`Sink::new`].
    pub fn routine_output(mut self, sink: impl Into<Sink>) -> Self {
        self.routine = Some(sink.into());
        self
    }

    /// Destination for `error` and `fatal` records. Defaults to stderr.
    pub fn error_output(mut self, sink: impl Into<Sink>) -> Self {
        self.errors = Some(sink.into());
        self
    }

    /// Include the `caller` field (enabled by default).
    pub fn caller(mut self, enabled: bool) -> Self {
        self.caller = enabled;
        self
    }

    pub fn build(self) -> LoggerFactory {
        let core = Core::new(
            self.level,
            JsonLines::new(self.namespace.as_str(), self.caller),
            self.routine.unwrap_or_else(Sink::stdout),
            self.errors.unwrap_or_else(Sink::stderr),
        );
        LoggerFactory {
            root: Logger::from_core(Arc::new(core), &self.namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{Field, MemorySink};
    use std::io;

    fn factory(routine: &MemorySink) -> LoggerFactory {
        LoggerFactory::builder("debug", "test")
            .routine_output(routine.clone())
            .error_output(MemorySink::new())
            .build()
    }

    #[test]
    fn test_from_context_attaches_everything() {
        let routine = MemorySink::new();
        let ctx = LogContext::new()
            .bind_request_id("r1")
            .bind_process_id("p1")
            .bind_fields([Field::string("k", "v")]);

        factory(&routine).from_context(&ctx, "rest").info("any message", &[]);

        let record = &routine.records()[0];
        assert_eq!(record["logger"], "test.rest");
        assert_eq!(record["request_id"], "r1");
        assert_eq!(record["process_id"], "p1");
        assert_eq!(record["k"], "v");
    }

    #[test]
    fn test_from_empty_context_is_bare_logger() {
        let routine = MemorySink::new();
        let logger = factory(&routine).from_context(&LogContext::new(), "exec");

        assert_eq!(logger.name(), "test.exec");
        assert!(logger.fields().is_empty());
    }

    #[test]
    fn test_level_defaults_to_info() {
        let factory = LoggerFactory::builder("loud", "x")
            .routine_output(MemorySink::new())
            .build();
        assert_eq!(factory.level(), Some(Level::Info));
    }

    #[test]
    fn test_caller_can_be_disabled() {
        let routine = MemorySink::new();
        let factory = LoggerFactory::builder("info", "x")
            .routine_output(routine.clone())
            .caller(false)
            .build();
        factory.logger().info("m", &[]);
        assert!(routine.records()[0].get("caller").is_none());
    }

    struct FailingFlush;

    impl io::Write for FailingFlush {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "sync failed"))
        }
    }

    #[test]
    fn test_cleanup_surfaces_flush_error() {
        let factory = LoggerFactory::builder("info", "x")
            .routine_output(Sink::new(|| FailingFlush))
            .error_output(MemorySink::new())
            .build();

        let err = factory.cleanup().unwrap_err();
        assert!(matches!(err, Error::Flush(_)));
        assert!(LoggerFactory::nop().cleanup().is_ok());
    }
}
