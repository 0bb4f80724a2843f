use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use go2_api::middleware::AuthenticatedUser;
use go2_common::AppConfig;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

const CONFIG: &str = r#"
rate_limit:
  skip_paths: [/health]
  global:
    limit: 3
    window_secs: 60
  endpoints:
    - pattern: /api/admin/
      limit: 2
      window_secs: 60
"#;

fn app() -> Router {
    let config = AppConfig::from_yaml(CONFIG).unwrap();
    go2_api::build_router(go2_api::new_shared_state(config).unwrap())
}

fn get(uri: &str, client: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_global_limit_returns_429_with_retry_after() {
    let app = app();

    for _ in 0..3 {
        let response = send(&app, get("/", "203.0.113.9")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&app, get("/", "203.0.113.9")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=61).contains(&retry_after));

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["error"]["details"]["retry_after"], retry_after);
}

#[tokio::test]
async fn test_admitted_responses_carry_usage_headers() {
    let app = app();

    let response = send(&app, get("/", "198.51.100.1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");

    let reset: i64 = response.headers()["x-ratelimit-reset"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(reset > chrono::Utc::now().timestamp());
}

#[tokio::test]
async fn test_clients_are_limited_independently() {
    let app = app();

    for _ in 0..3 {
        send(&app, get("/", "10.0.0.1")).await;
    }
    assert_eq!(
        send(&app, get("/", "10.0.0.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    // First forwarded hop is the client.
    let response = send(&app, get("/", "10.0.0.2, 10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_authenticated_user_counted_separately_from_address() {
    let app = app();

    for _ in 0..3 {
        send(&app, get("/", "10.0.0.5")).await;
    }

    let mut request = get("/", "10.0.0.5");
    request
        .extensions_mut()
        .insert(AuthenticatedUser("42".to_string()));
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
}

#[tokio::test]
async fn test_endpoint_limit_applies_before_global() {
    let app = app();

    for expected_remaining in ["2", "1"] {
        let response = send(&app, get("/api/admin/breakers", "10.1.1.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let response = send(&app, get("/api/admin/breakers", "10.1.1.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = send(&app, get("/api/metrics", "10.9.9.9")).await;
    let text = text_body(response).await;
    assert!(text.contains("go2_rate_limited_total{scope=\"/api/admin/\"} 1"));
}

#[tokio::test]
async fn test_skip_paths_are_never_counted() {
    let app = app();

    for _ in 0..10 {
        let response = send(&app, get("/health", "10.2.2.2")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    let response = send(&app, get("/", "10.2.2.2")).await;
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
}

#[tokio::test]
async fn test_rejections_show_up_in_metrics() {
    let app = app();

    for _ in 0..4 {
        send(&app, get("/", "10.3.3.3")).await;
    }

    let response = send(&app, get("/api/metrics", "10.9.9.9")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = text_body(response).await;
    assert!(text.contains("go2_rate_limited_total{scope=\"global\"} 1"));
    assert!(text.contains("go2_requests_total"));
}

#[tokio::test]
async fn test_disabled_limiter_admits_everything() {
    let mut config = AppConfig::from_yaml(CONFIG).unwrap();
    config.rate_limit.enabled = false;
    let app = go2_api::build_router(go2_api::new_shared_state(config).unwrap());

    for _ in 0..10 {
        let response = send(&app, get("/", "10.4.4.4")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
