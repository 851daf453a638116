//! Correlation context store.
//!
//! # Responsibilities
//! - Carry the request ID, process ID and bound fields of one unit of work
//! - Derive child contexts without touching the parent
//! - Generate fallback identifiers for outbound correlation
//!
//! # Data Flow
//! ```text
//! inbound request / message delivery
//!     → adapter seeds request_id + process_id
//!     → business code binds fields (bind_fields)
//!     → logger resolution (LoggerFactory::from_context)
//!     → outbound hop reads process_id() for headers
//! ```
//!
//! # Design Decisions
//! - Every bind returns a new value; the parent is never mutated
//! - Missing IDs are `None`, never empty strings invented on the fly
//! - `process_id()` generates a fallback, `request_id()` does not

use std::sync::Arc;

use uuid::Uuid;

use crate::logger::Field;

/// Generate a fresh correlation identifier (UUID v4, hyphenated).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Immutable correlation metadata for one unit of work.
///
/// Cloning is cheap: the IDs and the field list are shared behind `Arc`s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogContext {
    request_id: Option<Arc<str>>,
    process_id: Option<Arc<str>>,
    fields: Arc<Vec<Field>>,
}

impl LogContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a derived context carrying `id` as its request ID.
    pub fn bind_request_id(&self, id: impl Into<String>) -> Self {
        Self {
            request_id: Some(Arc::from(id.into())),
            ..self.clone()
        }
    }

    /// Return a derived context carrying `id` as its process ID.
    pub fn bind_process_id(&self, id: impl Into<String>) -> Self {
        Self {
            process_id: Some(Arc::from(id.into())),
            ..self.clone()
        }
    }

    /// Return a derived context whose fields are the parent's followed by `fields`.
    pub fn bind_fields(&self, fields: impl IntoIterator<Item = Field>) -> Self {
        let mut merged = Vec::clone(&self.fields);
        merged.extend(fields);
        Self {
            fields: Arc::new(merged),
            ..self.clone()
        }
    }

    /// The bound process ID, or a freshly generated one when absent or empty.
    ///
    /// The generated value is not stored; two calls on an unbound context
    /// return different identifiers.
    pub fn process_id(&self) -> String {
        match self.bound_process_id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_id(),
        }
    }

    /// The bound process ID, if any.
    pub fn bound_process_id(&self) -> Option<&str> {
        self.process_id.as_deref()
    }

    /// The bound request ID, if any. There is no generation fallback.
    // NOTE: unlike process_id() this never generates. Callers emitting
    // outbound headers rely on process_id(); log resolution omits the field.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Fields bound along this context chain, in bind order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// True when nothing has been bound.
    pub fn is_empty(&self) -> bool {
        self.request_id.is_none() && self.process_id.is_none() && self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_fields_appends_in_order() {
        let ctx = LogContext::new()
            .bind_fields([Field::string("a", "1")])
            .bind_fields([Field::string("b", "2"), Field::string("c", "3")])
            .bind_fields([Field::string("a", "4")]);

        let keys: Vec<&str> = ctx.fields().iter().map(Field::key).collect();
        assert_eq!(keys, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_bind_does_not_touch_parent() {
        let parent = LogContext::new().bind_fields([Field::string("k", "v")]);
        let child = parent
            .bind_request_id("r1")
            .bind_process_id("p1")
            .bind_fields([Field::int("n", 1)]);

        assert_eq!(parent.request_id(), None);
        assert_eq!(parent.bound_process_id(), None);
        assert_eq!(parent.fields().len(), 1);

        assert_eq!(child.request_id(), Some("r1"));
        assert_eq!(child.bound_process_id(), Some("p1"));
        assert_eq!(child.fields().len(), 2);
    }

    #[test]
    fn test_rebind_leaves_parent_value() {
        let first = LogContext::new().bind_process_id("p1");
        let second = first.bind_process_id("p2");

        assert_eq!(first.process_id(), "p1");
        assert_eq!(second.process_id(), "p2");
    }

    #[test]
    fn test_process_id_fallback_is_fresh() {
        let ctx = LogContext::new();
        let a = ctx.process_id();
        let b = ctx.process_id();

        assert!(Uuid::parse_str(&a).is_ok());
        assert!(Uuid::parse_str(&b).is_ok());
        assert_ne!(a, b);
        assert_eq!(ctx.bound_process_id(), None);
    }

    #[test]
    fn test_empty_process_id_falls_back() {
        let ctx = LogContext::new().bind_process_id("");
        assert!(!ctx.process_id().is_empty());
    }

    #[test]
    fn test_request_id_has_no_fallback() {
        assert_eq!(LogContext::new().request_id(), None);
    }

    #[test]
    fn test_is_empty() {
        assert!(LogContext::new().is_empty());
        assert!(!LogContext::new().bind_request_id("r").is_empty());
        assert!(!LogContext::new().bind_fields([Field::bool("x", true)]).is_empty());
    }
}
