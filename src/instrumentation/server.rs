//! Inbound HTTP access logging for axum.
//!
//! # Responsibilities
//! - Seed a `LogContext` from the `x-log-*` headers (generating missing IDs)
//! - Expose the context and a per-request error collector to handlers
//! - Emit one access record per request, or one error record per recorded
//!   handler error
//!
//! # Usage
//! ```ignore
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(middleware::from_fn_with_state(Recovery::new(factory.clone(), true), recovery))
//!     .layer(middleware::from_fn_with_state(AccessLog::new(factory), access_log));
//! ```

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::context::{generate_id, LogContext};
use crate::logger::{Field, Level, LoggerFactory};

use super::{PROCESS_ID_HEADER, REQUEST_ID_HEADER};

/// Sub-namespace of the access logger.
pub(crate) const LOGGER_NAME: &str = "http";

/// State of the [`access_log`] middleware.
#[derive(Clone, Debug)]
pub struct AccessLog {
    factory: LoggerFactory,
    skip_paths: Arc<HashSet<String>>,
}

impl AccessLog {
    pub fn new(factory: LoggerFactory) -> Self {
        Self {
            factory,
            skip_paths: Arc::new(HashSet::new()),
        }
    }

    /// Paths (exact match) that never produce a record.
    pub fn skip_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.skip_paths = Arc::new(paths.into_iter().map(Into::into).collect());
        self
    }
}

/// Errors recorded by handlers for the current request.
///
/// Cloning shares the same list. Outside the access-log middleware the
/// extractor yields a detached, empty collector.
#[derive(Clone, Debug, Default)]
pub struct RequestErrors(Arc<Mutex<Vec<String>>>);

impl RequestErrors {
    pub fn push(&self, err: impl fmt::Display) {
        self.lock().push(err.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain the recorded errors.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S> FromRequestParts<S> for RequestErrors
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestErrors>().cloned().unwrap_or_default())
    }
}

impl<S> FromRequestParts<S> for LogContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<LogContext>().cloned().unwrap_or_default())
    }
}

/// Access-log middleware, used with `axum::middleware::from_fn_with_state`.
pub async fn access_log(State(state): State<AccessLog>, mut request: Request, next: Next) -> Response {
    let start = Instant::now();

    let process_id = header_or_generate(request.headers(), PROCESS_ID_HEADER);
    let request_id = header_or_generate(request.headers(), REQUEST_ID_HEADER);
    let ctx = LogContext::new()
        .bind_process_id(process_id)
        .bind_request_id(request_id);
    let errors = RequestErrors::default();
    request.extensions_mut().insert(ctx.clone());
    request.extensions_mut().insert(errors.clone());

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let ip = client_ip(&request);
    let user_agent = header_str(request.headers(), "user-agent").to_string();

    let response = next.run(request).await;

    if state.skip_paths.contains(&path) {
        return response;
    }

    let logger = state.factory.from_context(&ctx, LOGGER_NAME);
    let recorded = errors.take();
    if !recorded.is_empty() {
        for err in &recorded {
            logger.error(err, &[]);
        }
        return response;
    }

    let status = response.status();
    logger.log(
        level_for(status),
        &path,
        &[
            Field::uint("http_code", u64::from(status.as_u16())),
            Field::string("method", method),
            Field::string("path", path.as_str()),
            Field::string("query", query),
            Field::string("ip", ip),
            Field::string("user-agent", user_agent),
            Field::duration("latency", start.elapsed()),
        ],
    );
    response
}

fn level_for(status: StatusCode) -> Level {
    match status.as_u16() {
        code if code >= 400 => Level::Warn,
        300..=399 => Level::Info,
        _ => Level::Debug,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn header_or_generate(headers: &HeaderMap, name: &str) -> String {
    match header_str(headers, name) {
        "" => generate_id(),
        id => id.to_string(),
    }
}

/// First `x-forwarded-for` entry, then `x-real-ip`, then the peer address.
pub(crate) fn client_ip(request: &Request) -> String {
    let headers = request.headers();
    let forwarded = header_str(headers, "x-forwarded-for")
        .split(',')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if !forwarded.is_empty() {
        return forwarded.to_string();
    }

    let real_ip = header_str(headers, "x-real-ip").trim();
    if !real_ip.is_empty() {
        return real_ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}
