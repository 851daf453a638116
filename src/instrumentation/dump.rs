//! Wire-style text dumps of HTTP messages for log records.
//!
//! A dump is the request or status line, `Host` first for requests, the
//! remaining headers in their stored order, a blank line and, when given,
//! the body.

use http::header::HOST;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use thiserror::Error;

/// A dump could not be produced.
///
/// Recorded in the log record's `errors`; the call itself is unaffected.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("dump request: {0}")]
    Request(String),

    #[error("dump response: {0}")]
    Response(String),
}

/// The parts of a request needed for a head dump, detached from its body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn of<B>(request: &http::Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }

    pub fn dump(&self, body: Option<&[u8]>) -> Vec<u8> {
        request(&self.method, &self.uri, self.version, &self.headers, body)
    }
}

/// Dump a request. The target is the path and query of `uri`.
pub fn request(
    method: &Method,
    uri: &Uri,
    version: Version,
    headers: &HeaderMap,
    body: Option<&[u8]>,
) -> Vec<u8> {
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let mut out = format!("{method} {target} {version:?}\r\n").into_bytes();

    let host = headers
        .get(HOST)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .or_else(|| uri.authority().map(|authority| authority.to_string()));
    if let Some(host) = host {
        out.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
    }
    write_headers(&mut out, headers, true);
    finish(out, body)
}

/// Dump a response starting from its status line.
pub fn response(
    status: StatusCode,
    version: Version,
    headers: &HeaderMap,
    body: Option<&[u8]>,
) -> Vec<u8> {
    let mut out = format!("{version:?} {status}\r\n").into_bytes();
    write_headers(&mut out, headers, false);
    finish(out, body)
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap, skip_host: bool) {
    for (name, value) in headers {
        if skip_host && name == HOST {
            continue;
        }
        out.extend_from_slice(canonical_name(name.as_str()).as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

fn finish(mut out: Vec<u8>, body: Option<&[u8]>) -> Vec<u8> {
    out.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        out.extend_from_slice(body);
    }
    out
}

/// `content-type` → `Content-Type`.
fn canonical_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper { c.to_ascii_uppercase() } else { c };
            upper = c == '-';
            mapped
        })
        .collect()
}
