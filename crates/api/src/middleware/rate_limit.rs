use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use go2_rate_limit::{ClientIdentity, GateDecision};

use crate::error::ApiError;
use crate::state::SharedState;

/// Request extension set by an authentication layer; requests carrying it
/// are counted against the user rather than the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Resolve who a request is counted against.
pub fn client_identity(request: &Request) -> ClientIdentity {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.0.as_str());
    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    ClientIdentity::resolve(user, forwarded_for, peer)
}

/// Admission middleware: global then endpoint sliding window checks.
///
/// Rejected requests never reach the handler. Admitted responses carry
/// `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
/// for the global policy.
pub async fn rate_limit(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let identity = client_identity(&request);

    match state.gate.check(&identity, &path) {
        GateDecision::Skipped => next.run(request).await,
        GateDecision::Rejected {
            retry_after_secs,
            scope,
        } => {
            state
                .metrics
                .rate_limited_total
                .with_label_values(&[scope.label()])
                .inc();
            ApiError::RateLimited {
                retry_after: retry_after_secs,
            }
            .into_response()
        }
        GateDecision::Admitted => {
            let mut response = next.run(request).await;
            let usage = state.gate.usage(&identity);
            set_usage_headers(response.headers_mut(), usage.limit, usage.remaining, usage.reset);
            response
        }
    }
}

fn set_usage_headers(headers: &mut HeaderMap, limit: u64, remaining: u64, reset: i64) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn identity_prefers_authenticated_user() {
        let mut req = request("/api/links");
        req.headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        req.extensions_mut()
            .insert(AuthenticatedUser("42".to_string()));

        assert_eq!(client_identity(&req).key(), "user:42");
    }

    #[test]
    fn identity_uses_first_forwarded_hop() {
        let mut req = request("/api/links");
        req.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 4000))));

        assert_eq!(client_identity(&req).key(), "ip:203.0.113.9");
    }

    #[test]
    fn identity_falls_back_to_peer_then_unknown() {
        let mut req = request("/");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 4000))));
        assert_eq!(client_identity(&req).key(), "ip:192.168.1.7");

        assert_eq!(client_identity(&request("/")).key(), "ip:unknown");
    }
}
