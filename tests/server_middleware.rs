//! Access log and recovery middleware against an axum router.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use ctxlog::config::ServerConfig;
use ctxlog::instrumentation::{self, RequestErrors};
use ctxlog::{LogContext, LoggerFactory};
use http_body_util::BodyExt;
use tower::ServiceExt;

mod common;

fn app(factory: &LoggerFactory) -> Router {
    let config = ServerConfig {
        skip_paths: vec!["/health".to_string()],
        ..ServerConfig::default()
    };
    let router = Router::new()
        .route("/", get(whoami))
        .route("/health", get(|| async { "ok" }))
        .route("/moved", get(|| async { Redirect::to("/") }))
        .route("/panic", get(panics))
        .route("/fail", get(fail))
        .with_state(factory.clone());
    instrumentation::instrument(router, factory, &config)
}

async fn whoami(State(factory): State<LoggerFactory>, ctx: LogContext) -> String {
    factory.from_context(&ctx, "rest").info("handling", &[]);
    format!(
        "{} {}",
        ctx.bound_process_id().unwrap_or_default(),
        ctx.request_id().unwrap_or_default()
    )
}

async fn panics() -> &'static str {
    panic!("An unexpected error happen!")
}

async fn fail(errors: RequestErrors) -> StatusCode {
    errors.push("first failure");
    errors.push("second failure");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_missing_ids_are_generated() {
    let (factory, routine, _) = common::capture("debug");

    let response = app(&factory)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_text(response).await;
    let (process_id, request_id) = body.split_once(' ').unwrap();
    assert_eq!(process_id.len(), 36);
    assert_eq!(request_id.len(), 36);
    assert_ne!(process_id, request_id);

    let records = routine.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["logger"], "test.rest");
    assert_eq!(records[0]["request_id"], request_id);

    let access = &records[1];
    assert_eq!(access["logger"], "test.http");
    assert_eq!(access["level"], "debug");
    assert_eq!(access["msg"], "/");
    assert_eq!(access["http_code"], 200);
    assert_eq!(access["method"], "GET");
    assert_eq!(access["process_id"], process_id);
    assert!(access["latency"].is_f64());
}

#[tokio::test]
async fn test_inbound_ids_are_propagated() {
    let (factory, routine, _) = common::capture("debug");

    let request = Request::get("/?page=2")
        .header("x-log-process-id", "p1")
        .header("x-log-request-id", "r1")
        .header("user-agent", "curl/8.4.0")
        .header("x-forwarded-for", "10.1.2.3, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let response = app(&factory).oneshot(request).await.unwrap();
    assert_eq!(body_text(response).await, "p1 r1");

    for record in routine.records() {
        assert_eq!(record["process_id"], "p1");
        assert_eq!(record["request_id"], "r1");
    }
    let access = &routine.records()[1];
    assert_eq!(access["query"], "page=2");
    assert_eq!(access["user-agent"], "curl/8.4.0");
    assert_eq!(access["ip"], "10.1.2.3");
}

#[tokio::test]
async fn test_panic_is_recovered_with_correlation() {
    let (factory, routine, errors) = common::capture("debug");

    let request = Request::get("/panic")
        .header("x-log-process-id", "p1")
        .body(Body::empty())
        .unwrap();
    let response = app(&factory).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.is_empty());

    let errors = errors.records();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["msg"], "[Recovery from panic]");
    assert_eq!(errors[0]["process_id"], "p1");
    assert_eq!(errors[0]["error"], "An unexpected error happen!");

    let access = &routine.records()[0];
    assert_eq!(access["level"], "warn");
    assert_eq!(access["http_code"], 500);
}

#[tokio::test]
async fn test_skip_paths_emit_nothing() {
    let (factory, routine, errors) = common::capture("debug");

    let response = app(&factory)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(routine.records().is_empty());
    assert!(errors.records().is_empty());
}

#[tokio::test]
async fn test_severity_follows_status() {
    let (factory, routine, _) = common::capture("debug");
    let app = app(&factory);

    for path in ["/moved", "/missing"] {
        app.clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
    }

    let records = routine.records();
    assert_eq!(records[0]["http_code"], 303);
    assert_eq!(records[0]["level"], "info");
    assert_eq!(records[1]["http_code"], 404);
    assert_eq!(records[1]["level"], "warn");
}

#[tokio::test]
async fn test_handler_errors_replace_access_record() {
    let (factory, routine, errors) = common::capture("debug");

    app(&factory)
        .oneshot(Request::get("/fail").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(routine.records().is_empty());
    let messages: Vec<_> = errors.records().iter().map(|r| r["msg"].clone()).collect();
    assert_eq!(messages, vec!["first failure", "second failure"]);
}

#[tokio::test]
async fn test_min_level_hides_successful_requests() {
    let (factory, routine, _) = common::capture("info");

    app(&factory)
        .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
        .await
        .unwrap();
    app(&factory)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let messages: Vec<_> = routine.records().iter().map(|r| r["msg"].clone()).collect();
    assert_eq!(messages, vec!["/health-check", "handling"]);
}
