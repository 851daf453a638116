//! ctxlog demo server.
//!
//! Serves a few instrumented routes and periodically calls an upstream
//! through the instrumented client, so every kind of record can be seen:
//!
//! ```text
//! GET /        logs at every severity from a handler
//! GET /panic   recovered panic → 500
//! GET /fail    handler error → error record instead of the access record
//! ticker       new process ID every tick → outbound POST to --upstream
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use http::Request;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use ctxlog::config::{load_config, Config};
use ctxlog::instrumentation::{self, build_client, LoggedClient, RequestErrors};
use ctxlog::{Field, LogContext, LoggerFactory};

#[derive(Parser, Debug)]
#[command(name = "ctxlog-demo", about = "Contextual logging demo server")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration.
    #[arg(long)]
    bind: Option<String>,

    /// Minimum log level, overrides the configuration.
    #[arg(long)]
    level: Option<String>,

    /// Base URL the background ticker posts to.
    #[arg(long, default_value = "http://localhost:8081")]
    upstream: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(level) = args.level {
        config.logger.level = level;
    }

    let factory = config.logger.build_factory();
    if let Err(e) = factory.install_tracing() {
        factory.logger().warn("tracing bridge not installed", &[Field::error(e)]);
    }
    factory.logger().info("Initialized", &[]);

    let client = build_client(factory.clone(), config.client.policy_table());
    tokio::spawn(run_ticker(factory.clone(), client, args.upstream));

    let app = Router::new()
        .route("/", get(index))
        .route("/panic", get(panics))
        .route("/fail", get(fail))
        .with_state(factory.clone());
    let app = instrumentation::instrument(app, &factory, &config.server)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    factory.logger().info(
        "Listening for connections",
        &[Field::string("address", listener.local_addr()?.to_string())],
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(factory.clone()))
    .await?;

    factory.cleanup()?;
    Ok(())
}

async fn index(
    axum::extract::State(factory): axum::extract::State<LoggerFactory>,
    ctx: LogContext,
) -> Json<serde_json::Value> {
    let logger = factory.from_context(&ctx, "rest");
    let something = [Field::string("something", "in the way")];
    logger.info("test-Info", &something);
    logger.debug("test-Debug", &something);
    logger.warn("test-Warn", &something);
    logger.error("test-Error", &something);
    Json(serde_json::json!({ "logged": true }))
}

async fn panics() -> &'static str {
    panic!("An unexpected error happen!")
}

async fn fail(errors: RequestErrors) -> http::StatusCode {
    errors.push("upstream quota exceeded");
    http::StatusCode::BAD_GATEWAY
}

async fn run_ticker(factory: LoggerFactory, client: LoggedClient, upstream: String) {
    let mut ticker = tokio::time::interval(Duration::from_secs(3));
    ticker.tick().await;
    let mut i = 0_u64;
    loop {
        ticker.tick().await;
        i += 1;
        let ctx = LogContext::new().bind_process_id(format!("process_{i}"));
        exec(&factory, &client, &upstream, ctx).await;
    }
}

async fn exec(factory: &LoggerFactory, client: &LoggedClient, upstream: &str, ctx: LogContext) {
    let logger = factory.from_context(&ctx, "exec");
    let mmm = [Field::string("Mmm", "Mmm")];
    logger.info("test-exec-Info", &mmm);
    logger.debug("test-exec-Debug", &mmm);
    logger.warn("test-exec-Warn", &mmm);
    logger.error("test-exec-Error", &mmm);

    let body = serde_json::json!({
        "test_data": 2,
        "logging": true,
        "Mmm": "Mmm",
        "group": "Nirvana",
    });
    let body = match serde_json::to_vec(&body) {
        Ok(body) => body,
        Err(e) => {
            logger.error("encode body", &[Field::error(e)]);
            return;
        }
    };

    let request = Request::post(format!("{upstream}/totaly-skipped-post-request"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .extension(ctx)
        .body(instrumentation::full(body));
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            logger.error("build request", &[Field::error(e)]);
            return;
        }
    };

    match tokio::time::timeout(Duration::from_secs(20), send_upstream(client, request)).await {
        Ok(Ok(response)) => {
            logger.info("upstream answered", &[Field::uint("http_code", u64::from(response.status().as_u16()))]);
        }
        Ok(Err(e)) => logger.error("upstream call failed", &[Field::error(e)]),
        Err(_) => logger.error("upstream call timed out", &[]),
    }
}

// Boxing outside the async fn keeps the `Send` check off the erased-lifetime
// coroutine witness (rustc cannot prove it there for `Oneshot`).
fn send_upstream(
    client: &LoggedClient,
    request: Request<instrumentation::LogBody>,
) -> futures_util::future::BoxFuture<
    'static,
    Result<http::Response<instrumentation::LogBody>, hyper_util::client::legacy::Error>,
> {
    Box::pin(client.clone().oneshot(request))
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal(factory: LoggerFactory) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        factory.logger().error("failed to listen for Ctrl+C", &[Field::error(e)]);
        std::future::pending::<()>().await;
    }
    factory.logger().info("Shutdown signal received", &[]);
}
