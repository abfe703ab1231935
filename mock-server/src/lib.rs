//! Upstream fixture for gateway integration tests.
//!
//! Each route reproduces one behavior the gateway has to cope with: slow
//! answers, redirect chains and loops, oversized bodies, cookies, binary
//! payloads and malformed JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Eight bytes of PNG signature followed by bytes that are not UTF-8.
pub const BINARY_PAYLOAD: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0xff, 0xfe, 0x00, 0x81];

/// What `/echo` saw.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Deserialize)]
pub struct RedirectTo {
    pub to: String,
    pub status: Option<u16>,
}

pub fn app() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/text", get(text))
        .route("/html", get(html))
        .route("/binary", get(binary))
        .route("/untyped-binary", get(untyped_binary))
        .route("/slow/{ms}", get(slow))
        .route("/redirect/{n}", get(redirect_chain))
        .route("/loop", get(redirect_loop))
        .route("/redirect-to", any(redirect_to))
        .route("/large/{bytes}", get(large))
        .route("/cookie", get(cookie))
        .route("/echo", any(echo))
        .route("/bad-json", get(bad_json))
        .route("/status/{code}", get(status))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock upstream listening");
    }
    axum::serve(listener, app()).await
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn text() -> &'static str {
    "hello from upstream"
}

async fn html() -> Html<&'static str> {
    Html("<html><body><h1>upstream</h1></body></html>")
}

async fn binary() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], BINARY_PAYLOAD)
}

/// Binary bytes with no `Content-Type` at all.
async fn untyped_binary() -> Response {
    Response::new(Body::from(BINARY_PAYLOAD))
}

async fn slow(Path(ms): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({"slept_ms": ms}))
}

async fn redirect_chain(Path(n): Path<u32>) -> Response {
    if n == 0 {
        return Json(json!({"redirects": "done"})).into_response();
    }
    found(&format!("/redirect/{}", n - 1))
}

async fn redirect_loop() -> Response {
    found("/loop")
}

async fn redirect_to(Query(target): Query<RedirectTo>) -> Response {
    let status = target
        .status
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(StatusCode::is_redirection)
        .unwrap_or(StatusCode::FOUND);
    (status, [(header::LOCATION, target.to)]).into_response()
}

async fn large(Path(bytes): Path<usize>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "a".repeat(bytes))
}

async fn cookie() -> Response {
    let mut response = Json(json!({"cookies": "set"})).into_response();
    let headers = response.headers_mut();
    headers.append(header::SET_COOKIE, header::HeaderValue::from_static("session=abc123; HttpOnly"));
    headers.append(header::SET_COOKIE, header::HeaderValue::from_static("theme=dark"));
    response
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: String) -> Json<Echo> {
    let mut seen = BTreeMap::new();
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            seen.insert(name.as_str().to_string(), value.to_string());
        }
    }
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: seen,
        body,
    })
}

async fn bad_json() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], "{\"unterminated\": ")
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, Json(json!({"status": code}))).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_payload_is_not_utf8() {
        assert!(std::str::from_utf8(BINARY_PAYLOAD).is_err());
    }

    #[test]
    fn redirect_to_query_parses() {
        let q: RedirectTo = serde_json::from_value(json!({"to": "http://x/"})).unwrap();
        assert_eq!(q.to, "http://x/");
        assert!(q.status.is_none());
    }

    #[test]
    fn echo_roundtrips_through_json() {
        let echo = Echo {
            method: "POST".to_string(),
            path: "/echo".to_string(),
            query: Some("a=1".to_string()),
            headers: BTreeMap::from([("x-trace".to_string(), "1".to_string())]),
            body: "payload".to_string(),
        };
        let back: Echo = serde_json::from_str(&serde_json::to_string(&echo).unwrap()).unwrap();
        assert_eq!(back.method, "POST");
        assert_eq!(back.headers["x-trace"], "1");
    }
}
