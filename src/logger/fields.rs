//! Conventional field keys and constructors shared across services.

use std::backtrace::Backtrace;

use super::Field;

pub const APPLICATION_ID_KEY: &str = "application_id";
pub const CONTACT_ID_KEY: &str = "contact_id";
pub const IABS_CLIENT_ID_KEY: &str = "iabs_client_id";
pub const MQ_MESSAGE_ID_KEY: &str = "mq_message_id";
pub const REQUEST_DUMP_KEY: &str = "request_dump";
pub const RESPONSE_DUMP_KEY: &str = "response_dump";
pub const PRODUCT_ID_KEY: &str = "product_id";
pub const PROSPECT_ID_KEY: &str = "prospect_id";
pub const STACK_TRACE_KEY: &str = "stack";

/// `application_id` field.
pub fn application_id(id: impl Into<String>) -> Field {
    Field::string(APPLICATION_ID_KEY, id)
}

/// `contact_id` field holding the contact ID and its value as a pair.
pub fn contact(id: impl Into<String>, value: impl Into<String>) -> Field {
    Field::strings(CONTACT_ID_KEY, [id.into(), value.into()])
}

pub fn iabs_client_id(id: impl Into<String>) -> Field {
    Field::string(IABS_CLIENT_ID_KEY, id)
}

pub fn mq_message_id(id: impl Into<String>) -> Field {
    Field::string(MQ_MESSAGE_ID_KEY, id)
}

pub fn product_id(id: impl Into<String>) -> Field {
    Field::string(PRODUCT_ID_KEY, id)
}

pub fn prospect_id(id: impl Into<String>) -> Field {
    Field::string(PROSPECT_ID_KEY, id)
}

pub fn request_dump(dump: &[u8]) -> Field {
    Field::bytes(REQUEST_DUMP_KEY, dump)
}

pub fn response_dump(dump: &[u8]) -> Field {
    Field::bytes(RESPONSE_DUMP_KEY, dump)
}

/// `stack` field with a backtrace captured at the call site, regardless of
/// `RUST_BACKTRACE`.
pub fn stack() -> Field {
    Field::string(STACK_TRACE_KEY, Backtrace::force_capture().to_string())
}
