//! Message-queue correlation.
//!
//! # Data Flow
//! ```text
//! consume: delivery headers[x-log-process-id] + message ID
//!     → from_delivery → (LogContext, Logger) for the handler
//! publish: LogContext
//!     → to_header → headers[x-log-process-id] on the outgoing message
//! ```
//!
//! # Design Decisions
//! - Broker-agnostic: anything exposing a message ID and a header table
//!   can be a [`Delivery`]; broker client types convert at the edge
//! - Header tables hold JSON values, the shape of an AMQP field table

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;

use crate::context::{generate_id, LogContext};
use crate::instrumentation::PROCESS_ID_HEADER;
use crate::logger::{fields, Logger, LoggerFactory};

/// Message header table.
pub type Table = BTreeMap<String, Value>;

/// A consumed message, as far as correlation is concerned.
pub trait Delivery {
    fn message_id(&self) -> Option<&str>;
    fn headers(&self) -> Option<&Table>;
}

/// Owned message with optional ID and headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub message_id: Option<String>,
    pub headers: Option<Table>,
    pub body: Bytes,
}

impl Message {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_headers(mut self, headers: Table) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Stamp the process ID of `ctx` into this message's headers.
    pub fn with_context(mut self, ctx: &LogContext) -> Self {
        self.headers = Some(to_header(ctx, self.headers.take()));
        self
    }
}

impl Delivery for Message {
    fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    fn headers(&self) -> Option<&Table> {
        self.headers.as_ref()
    }
}

/// Derive a context and logger for handling `delivery`.
///
/// The process ID comes from the `x-log-process-id` header when it holds a
/// non-empty string and is generated otherwise. The message ID, when the
/// delivery has one, is bound as `mq_message_id`.
pub fn from_delivery<D: Delivery + ?Sized>(
    factory: &LoggerFactory,
    parent: &LogContext,
    delivery: &D,
    namespace: &str,
) -> (LogContext, Logger) {
    let process_id = delivery
        .headers()
        .and_then(|headers| headers.get(PROCESS_ID_HEADER))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_id);

    let mut ctx = parent.clone();
    if let Some(message_id) = delivery.message_id() {
        ctx = ctx.bind_fields([fields::mq_message_id(message_id)]);
    }
    let ctx = ctx.bind_process_id(process_id);
    let logger = factory.from_context(&ctx, namespace);
    (ctx, logger)
}

/// Write the process ID of `ctx` into `table`, creating it when absent.
///
/// An unbound context gets a freshly generated ID. Other headers are kept.
pub fn to_header(ctx: &LogContext, table: Option<Table>) -> Table {
    let mut table = table.unwrap_or_default();
    table.insert(PROCESS_ID_HEADER.to_string(), Value::String(ctx.process_id()));
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemorySink;
    use serde_json::json;

    fn capture() -> (LoggerFactory, MemorySink) {
        let routine = MemorySink::new();
        let factory = LoggerFactory::builder("debug", "svc")
            .routine_output(routine.clone())
            .error_output(MemorySink::new())
            .build();
        (factory, routine)
    }

    #[test]
    fn test_round_trip_keeps_process_id() {
        let (factory, routine) = capture();
        let producer = LogContext::new().bind_process_id("p1");
        let message = Message::new("payload")
            .with_message_id("m-7")
            .with_context(&producer);

        let (ctx, logger) = from_delivery(&factory, &LogContext::new(), &message, "consumer");
        assert_eq!(ctx.bound_process_id(), Some("p1"));

        logger.info("handled", &[]);
        let record = &routine.records()[0];
        assert_eq!(record["logger"], "svc.consumer");
        assert_eq!(record["process_id"], "p1");
        assert_eq!(record["mq_message_id"], "m-7");
    }

    #[test]
    fn test_missing_or_invalid_header_generates_id() {
        let (factory, _) = capture();
        let mut headers = Table::new();
        headers.insert(PROCESS_ID_HEADER.to_string(), json!(42));

        for message in [
            Message::new(""),
            Message::new("").with_headers(headers),
            Message::new("").with_headers(Table::from([(PROCESS_ID_HEADER.to_string(), json!(""))])),
        ] {
            let (ctx, _) = from_delivery(&factory, &LogContext::new(), &message, "c");
            let id = ctx.bound_process_id().unwrap();
            assert_eq!(id.len(), 36);
            assert!(ctx.fields().is_empty());
        }
    }

    #[test]
    fn test_parent_fields_are_kept() {
        let (factory, _) = capture();
        let parent = LogContext::new().bind_fields([fields::product_id("x")]);
        let (ctx, _) = from_delivery(&factory, &parent, &Message::new("").with_message_id("m"), "c");

        let keys: Vec<&str> = ctx.fields().iter().map(|f| f.key()).collect();
        assert_eq!(keys, vec!["product_id", "mq_message_id"]);
        assert!(parent.bound_process_id().is_none());
    }

    #[test]
    fn test_to_header_keeps_other_entries() {
        let mut table = Table::new();
        table.insert("x-retry".to_string(), json!(3));

        let table = to_header(&LogContext::new().bind_process_id("p9"), Some(table));
        assert_eq!(table["x-retry"], json!(3));
        assert_eq!(table[PROCESS_ID_HEADER], json!("p9"));

        let fresh = to_header(&LogContext::new(), None);
        assert_eq!(fresh[PROCESS_ID_HEADER].as_str().unwrap().len(), 36);
    }
}
