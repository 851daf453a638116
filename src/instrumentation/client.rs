//! Outbound HTTP instrumentation.
//!
//! # Responsibilities
//! - Forward the caller's correlation IDs to the next hop
//! - Dump request and response per endpoint policy
//! - Emit one debug record per call without altering its outcome
//!
//! # Design Decisions
//! - Wraps any `tower::Service` over `http::Request<LogBody>`, so the same
//!   layer serves the hyper-util client and test doubles
//! - The caller's `LogContext` travels in the request extensions
//! - Bodies are buffered only when their dump is enabled; a failed read is
//!   handed back to the caller as a body yielding that failure

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, HeaderValue, Request, Response};
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tower::{Layer, Service};

use crate::context::{generate_id, LogContext};
use crate::logger::{fields, Field, Logger, LoggerFactory};

use super::dump::{self, DumpError};
use super::policy::{EndpointPolicy, PolicyTable};
use super::{
    boxed, failing, full, BoxError, LogBody, HIDDEN, PROCESS_ID_HEADER, REQUEST_ID_HEADER,
};

/// Sub-namespace of the per-call logger.
const LOGGER_NAME: &str = "httplog";

/// The hyper-util client wrapped in [`HttpLogService`].
pub type LoggedClient = HttpLogService<Client<HttpConnector, LogBody>>;

/// Build a plain HTTP client that logs every call.
pub fn build_client(factory: LoggerFactory, policies: PolicyTable) -> LoggedClient {
    let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
    HttpLogLayer::new(factory, policies).layer(client)
}

/// Layer producing [`HttpLogService`].
#[derive(Clone, Debug)]
pub struct HttpLogLayer {
    factory: LoggerFactory,
    policies: Arc<PolicyTable>,
}

impl HttpLogLayer {
    pub fn new(factory: LoggerFactory, policies: PolicyTable) -> Self {
        Self {
            factory,
            policies: Arc::new(policies),
        }
    }
}

impl<S> Layer<S> for HttpLogLayer {
    type Service = HttpLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpLogService {
            inner,
            factory: self.factory.clone(),
            policies: self.policies.clone(),
        }
    }
}

/// Service logging each outbound request and its response.
#[derive(Clone, Debug)]
pub struct HttpLogService<S> {
    inner: S,
    factory: LoggerFactory,
    policies: Arc<PolicyTable>,
}

impl<S> HttpLogService<S> {
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, ResBody> Service<Request<LogBody>> for HttpLogService<S>
where
    S: Service<Request<LogBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: fmt::Display + Send + 'static,
    ResBody: Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<LogBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<LogBody>) -> Self::Future {
        // The ready service goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        let ctx = request
            .extensions()
            .get::<LogContext>()
            .cloned()
            .unwrap_or_default();
        let logger = self.factory.from_context(&ctx, LOGGER_NAME);
        let policy = self
            .policies
            .resolve(request.method().as_str(), request.uri().path());

        Box::pin(send(inner, ctx, logger, policy, request))
    }
}

async fn send<S, F, E, ResBody>(
    mut inner: S,
    ctx: LogContext,
    logger: Logger,
    policy: EndpointPolicy,
    request: Request<LogBody>,
) -> Result<Response<LogBody>, E>
where
    S: Service<Request<LogBody>, Response = Response<ResBody>, Future = F, Error = E> + Send,
    F: std::future::Future<Output = Result<Response<ResBody>, E>> + Send,
    E: fmt::Display + Send,
    ResBody: Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    let mut errors: Vec<String> = Vec::new();

    let (mut parts, body) = request.into_parts();
    if policy.forward_correlation {
        inject_correlation(&mut parts.headers, &ctx, &mut errors);
    }
    let (request_dump, body) = dump_request(&parts, body, policy, &mut errors).await;

    match inner.call(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            let (response_dump, body) = dump_response(&parts, body, policy, &mut errors).await;
            log_call(&logger, &request_dump, &response_dump, &errors);
            Ok(Response::from_parts(parts, body))
        }
        Err(e) => {
            errors.push(e.to_string());
            let response_dump = if policy.log_response { "" } else { HIDDEN };
            log_call(&logger, &request_dump, response_dump.as_bytes(), &errors);
            Err(e)
        }
    }
}

async fn dump_request(
    parts: &http::request::Parts,
    body: LogBody,
    policy: EndpointPolicy,
    errors: &mut Vec<String>,
) -> (Vec<u8>, LogBody) {
    if !policy.log_request {
        return (HIDDEN.as_bytes().to_vec(), body);
    }
    if !policy.log_request_body {
        let head = dump::request(&parts.method, &parts.uri, parts.version, &parts.headers, None);
        return (head, body);
    }

    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let dump = dump::request(
                &parts.method,
                &parts.uri,
                parts.version,
                &parts.headers,
                Some(&bytes[..]),
            );
            (dump, full(bytes))
        }
        Err(e) => {
            errors.push(DumpError::Request(e.to_string()).to_string());
            let head = dump::request(&parts.method, &parts.uri, parts.version, &parts.headers, None);
            (head, failing(e))
        }
    }
}

async fn dump_response<B>(
    parts: &http::response::Parts,
    body: B,
    policy: EndpointPolicy,
    errors: &mut Vec<String>,
) -> (Vec<u8>, LogBody)
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    if !policy.log_response {
        return (HIDDEN.as_bytes().to_vec(), boxed(body));
    }
    if !policy.log_response_body {
        let head = dump::response(parts.status, parts.version, &parts.headers, None);
        return (head, boxed(body));
    }

    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let dump = dump::response(parts.status, parts.version, &parts.headers, Some(&bytes[..]));
            (dump, full(bytes))
        }
        Err(e) => {
            let e: BoxError = e.into();
            errors.push(DumpError::Response(e.to_string()).to_string());
            let head = dump::response(parts.status, parts.version, &parts.headers, None);
            (head, failing(e))
        }
    }
}

fn inject_correlation(headers: &mut HeaderMap, ctx: &LogContext, errors: &mut Vec<String>) {
    for (name, value) in [
        (PROCESS_ID_HEADER, ctx.process_id()),
        (REQUEST_ID_HEADER, generate_id()),
    ] {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(e) => errors.push(format!("{name}: {e}")),
        }
    }
}

fn log_call(logger: &Logger, request_dump: &[u8], response_dump: &[u8], errors: &[String]) {
    logger.debug(
        "http request sent",
        &[
            fields::request_dump(request_dump),
            fields::response_dump(response_dump),
            Field::errors("errors", errors),
        ],
    );
}
