//! Panic containment for axum handlers.
//!
//! A panic in the inner chain becomes either an aborted connection (the
//! client already went away) or an empty HTTP 500, with one error record
//! in both cases. Panics never escape the middleware.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::FutureExt;

use crate::context::LogContext;
use crate::logger::fields::STACK_TRACE_KEY;
use crate::logger::{Field, LoggerFactory};

use super::dump::RequestHead;
use super::server::{RequestErrors, LOGGER_NAME};
use super::{failing, BoxError};

/// State of the [`recovery`] middleware.
#[derive(Clone, Debug)]
pub struct Recovery {
    factory: LoggerFactory,
    stack: bool,
}

impl Recovery {
    /// With `stack` set, panic records carry the backtrace of the panic
    /// site. This installs a process-wide panic hook (once) that chains to
    /// the previous one.
    pub fn new(factory: LoggerFactory, stack: bool) -> Self {
        if stack {
            install_backtrace_hook();
        }
        Self { factory, stack }
    }
}

/// Response extension marking a connection the server should drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortedConnection;

/// Recovery middleware, used with `axum::middleware::from_fn_with_state`.
///
/// Layer it inside [`access_log`](super::access_log) so panic records carry
/// the request's correlation IDs.
pub async fn recovery(State(state): State<Recovery>, request: Request, next: Next) -> Response {
    let head = RequestHead::of(&request);
    let ctx = request
        .extensions()
        .get::<LogContext>()
        .cloned()
        .unwrap_or_default();
    let errors = request.extensions().get::<RequestErrors>().cloned();

    let payload = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => return response,
        Err(payload) => payload,
    };

    let logger = state.factory.from_context(&ctx, LOGGER_NAME);
    let message = panic_message(payload.as_ref());
    let request_dump = head.dump(None);

    if is_broken_connection(payload.as_ref(), &message) {
        logger.error(
            head.uri.path(),
            &[
                Field::error(&message),
                Field::bytes("request", &request_dump),
            ],
        );
        if let Some(errors) = errors {
            errors.push(&message);
        }
        return aborted(message);
    }

    let mut fields = vec![
        Field::time("time", Utc::now()),
        Field::error(&message),
        Field::bytes("request", &request_dump),
    ];
    if state.stack {
        fields.push(Field::string(STACK_TRACE_KEY, take_backtrace()));
    }
    logger.error("[Recovery from panic]", &fields);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = payload.downcast_ref::<io::Error>() {
        err.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

fn is_broken_connection(payload: &(dyn Any + Send), message: &str) -> bool {
    if let Some(err) = payload.downcast_ref::<io::Error>() {
        if matches!(
            err.kind(),
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
        ) {
            return true;
        }
    }
    let message = message.to_lowercase();
    message.contains("broken pipe") || message.contains("connection reset by peer")
}

/// A response whose body fails on first poll, so the connection is dropped
/// instead of completing.
fn aborted(message: String) -> Response {
    let err: BoxError = io::Error::new(io::ErrorKind::BrokenPipe, message).into();
    let mut response = Response::new(Body::new(failing(err)));
    response.extensions_mut().insert(AbortedConnection);
    response
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static BACKTRACE_HOOK: Once = Once::new();

fn install_backtrace_hook() {
    BACKTRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

/// Backtrace of the last panic on this thread, or of the current location.
fn take_backtrace() -> String {
    PANIC_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(Backtrace::force_capture)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemorySink;
    use axum::routing::get;
    use axum::{middleware, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(errors: &MemorySink, stack: bool) -> Router {
        let factory = LoggerFactory::builder("debug", "svc")
            .routine_output(MemorySink::new())
            .error_output(errors.clone())
            .build();
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route("/panic", get(panics))
            .route("/pipe", get(broken_pipe))
            .layer(middleware::from_fn_with_state(
                Recovery::new(factory, stack),
                recovery,
            ))
    }

    async fn panics() -> &'static str {
        panic!("An unexpected error happen!")
    }

    async fn broken_pipe() -> &'static str {
        std::panic::panic_any(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn get_request(path: &str) -> Request {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_passthrough_without_panic() {
        let errors = MemorySink::new();
        let response = app(&errors, false).oneshot(get_request("/ok")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(errors.records().is_empty());
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let errors = MemorySink::new();
        let response = app(&errors, true).oneshot(get_request("/panic")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());

        let records = errors.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["msg"], "[Recovery from panic]");
        assert_eq!(records[0]["error"], "An unexpected error happen!");
        assert!(records[0]["request"].as_str().unwrap().starts_with("GET /panic HTTP/1.1"));
        assert!(records[0]["stack"].is_string());
        assert!(records[0]["time"].is_string());
    }

    #[tokio::test]
    async fn test_broken_pipe_aborts_connection() {
        let errors = MemorySink::new();
        let response = app(&errors, true).oneshot(get_request("/pipe")).await.unwrap();

        assert!(response.extensions().get::<AbortedConnection>().is_some());
        assert!(response.into_body().collect().await.is_err());

        let records = errors.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["msg"], "/pipe");
        assert!(records[0].get("stack").is_none());
    }

    #[test]
    fn test_broken_connection_detection() {
        let payload: Box<dyn Any + Send> = Box::new("write: Connection reset by peer");
        assert!(is_broken_connection(payload.as_ref(), &panic_message(payload.as_ref())));

        let payload: Box<dyn Any + Send> = Box::new(String::from("index out of bounds"));
        assert!(!is_broken_connection(payload.as_ref(), &panic_message(payload.as_ref())));

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
