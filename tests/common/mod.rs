//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use ctxlog::logger::MemorySink;
use ctxlog::LoggerFactory;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A factory whose routine and error output are captured.
pub fn capture(level: &str) -> (LoggerFactory, MemorySink, MemorySink) {
    let routine = MemorySink::new();
    let errors = MemorySink::new();
    let factory = LoggerFactory::builder(level, "test")
        .routine_output(routine.clone())
        .error_output(errors.clone())
        .build();
    (factory, routine, errors)
}

/// Raw requests received by a mock backend.
#[derive(Clone, Default)]
pub struct Received(Arc<Mutex<Vec<String>>>);

impl Received {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Start a mock backend on an ephemeral port that answers every request
/// with `status` and `body`, recording what it was sent.
pub async fn start_mock_backend(status: &'static str, body: &'static str) -> (SocketAddr, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Received::default();
    let log = received.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let log = log.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0_u8; 16 * 1024];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        log.0
                            .lock()
                            .unwrap()
                            .push(String::from_utf8_lossy(&buf[..n]).into_owned());

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, received)
}

/// Serve `app` on an ephemeral port with peer addresses available.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// Value of `name` in a raw HTTP request, header names compared case-insensitively.
#[allow(dead_code)]
pub fn header_value<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    raw.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}
