use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo, BINARY_PAYLOAD};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn get(uri: &str) -> axum::response::Response {
    app()
        .oneshot(Request::builder().uri(uri).body(String::new()).unwrap())
        .await
        .unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

// --- content ---

#[tokio::test]
async fn health_returns_json() {
    let resp = get("/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let value: serde_json::Value = body_json(resp).await;
    assert_eq!(value, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn text_and_html_are_typed() {
    let resp = get("/text").await;
    assert!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
    assert_eq!(body_bytes(resp).await, "hello from upstream");

    let resp = get("/html").await;
    assert!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
}

#[tokio::test]
async fn binary_routes_serve_raw_bytes() {
    let resp = get("/binary").await;
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(body_bytes(resp).await.as_ref(), BINARY_PAYLOAD);

    let resp = get("/untyped-binary").await;
    assert!(resp.headers().get(header::CONTENT_TYPE).is_none());
    assert_eq!(body_bytes(resp).await.as_ref(), BINARY_PAYLOAD);
}

#[tokio::test]
async fn bad_json_is_declared_json_but_unparseable() {
    let resp = get("/bad-json").await;
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    let bytes = body_bytes(resp).await;
    assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_err());
}

#[tokio::test]
async fn large_returns_requested_size() {
    let resp = get("/large/4096").await;
    assert_eq!(body_bytes(resp).await.len(), 4096);
}

#[tokio::test]
async fn cookie_sets_two_cookies() {
    let resp = get("/cookie").await;
    let cookies: Vec<_> = resp.headers().get_all(header::SET_COOKIE).iter().collect();
    assert_eq!(cookies.len(), 2);
}

#[tokio::test]
async fn status_route_returns_code() {
    assert_eq!(get("/status/503").await.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(get("/status/404").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn slow_route_answers_after_delay() {
    let value: serde_json::Value = body_json(get("/slow/10").await).await;
    assert_eq!(value["slept_ms"], 10);
}

// --- redirects ---

#[tokio::test]
async fn redirect_chain_counts_down() {
    let resp = get("/redirect/3").await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/redirect/2");

    let resp = get("/redirect/0").await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn loop_points_at_itself() {
    let resp = get("/loop").await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/loop");
}

#[tokio::test]
async fn redirect_to_uses_requested_status() {
    let resp = get("/redirect-to?to=http%3A%2F%2Flocalhost%2Fhealth").await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "http://localhost/health");

    let resp = get("/redirect-to?to=%2Fecho&status=307").await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);

    let resp = get("/redirect-to?to=%2Fecho&status=200").await;
    assert_eq!(resp.status(), StatusCode::FOUND);
}

// --- echo ---

#[tokio::test]
async fn echo_reflects_method_headers_and_body() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/echo?x=1")
                .header("x-trace", "abc")
                .body("payload".to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.path, "/echo");
    assert_eq!(echo.query.as_deref(), Some("x=1"));
    assert_eq!(echo.headers["x-trace"], "abc");
    assert_eq!(echo.body, "payload");
}
