//! HTTP instrumentation adapters.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → recovery.rs (panic containment)
//!     → server.rs (seed LogContext from x-log-* headers, access log)
//!     → handler resolves loggers from the LogContext extension
//!     → outbound call through client.rs
//!         (x-log-* headers injected, request/response dumped per policy.rs)
//! ```

pub mod client;
pub mod dump;
pub mod policy;
pub mod recovery;
pub mod server;

use axum::middleware;
use bytes::Bytes;
use futures_util::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Body, Frame};

use crate::config::ServerConfig;
use crate::logger::LoggerFactory;

pub use client::{build_client, HttpLogLayer, HttpLogService, LoggedClient};
pub use dump::{DumpError, RequestHead};
pub use policy::{EndpointKey, EndpointPolicy, PolicyTable, Skip};
pub use recovery::{recovery, AbortedConnection, Recovery};
pub use server::{access_log, AccessLog, RequestErrors};

/// Header carrying the process ID between hops.
pub const PROCESS_ID_HEADER: &str = "x-log-process-id";
/// Header carrying the request ID of the calling hop.
pub const REQUEST_ID_HEADER: &str = "x-log-request-id";

/// Placeholder for a dump disabled by policy.
pub const HIDDEN: &str = "hidden";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type accepted and returned by the instrumented client.
pub type LogBody = UnsyncBoxBody<Bytes, BoxError>;

/// A body holding `bytes`.
pub fn full(bytes: impl Into<Bytes>) -> LogBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty() -> LogBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// Box any byte body into a [`LogBody`].
pub fn boxed<B>(body: B) -> LogBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A body whose first poll yields `err`.
pub(crate) fn failing(err: BoxError) -> LogBody {
    StreamBody::new(stream::iter([Err::<Frame<Bytes>, BoxError>(err)])).boxed_unsync()
}

/// Wrap `router` with recovery and access logging as configured.
///
/// Recovery runs inside the access log, so panic records carry the
/// request's correlation IDs and broken connections show up as request
/// errors.
pub fn instrument<S>(
    router: axum::Router<S>,
    factory: &LoggerFactory,
    config: &ServerConfig,
) -> axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let access = AccessLog::new(factory.clone()).skip_paths(config.skip_paths.iter().cloned());
    router
        .layer(middleware::from_fn_with_state(
            Recovery::new(factory.clone(), config.stack_traces),
            recovery,
        ))
        .layer(middleware::from_fn_with_state(access, access_log))
}
