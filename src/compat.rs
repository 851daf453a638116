//! Older entry points kept for callers that have not migrated.

use tower::Layer;

use crate::context::LogContext;
use crate::instrumentation::{EndpointPolicy, HttpLogLayer, HttpLogService, PolicyTable};
use crate::logger::LoggerFactory;

#[deprecated(note = "use LogContext::bind_request_id")]
pub fn with_req_id(ctx: &LogContext, id: impl Into<String>) -> LogContext {
    ctx.bind_request_id(id)
}

#[deprecated(note = "use LogContext::bind_process_id")]
pub fn with_process_id(ctx: &LogContext, id: impl Into<String>) -> LogContext {
    ctx.bind_process_id(id)
}

/// Client logging with one policy for every endpoint.
#[deprecated(note = "use HttpLogLayer with a PolicyTable")]
pub fn new_log_transport<S>(
    inner: S,
    factory: LoggerFactory,
    log_req_body: bool,
    log_resp_body: bool,
    pass_context: bool,
) -> HttpLogService<S> {
    let policy = EndpointPolicy {
        log_request: true,
        log_request_body: log_req_body,
        log_response: true,
        log_response_body: log_resp_body,
        forward_correlation: pass_context,
    };
    HttpLogLayer::new(factory, PolicyTable::new(policy)).layer(inner)
}
