use std::fmt;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use go2_resilience::BreakerError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced to API clients as `{"error": {code, message, details}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after: u64 },

    #[error("{resource} '{identifier}' not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },

    #[error("{service}: External service unavailable")]
    ServiceUnavailable { service: String },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            ApiError::ServiceUnavailable { .. } => "EXTERNAL_SERVICE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::RateLimited { retry_after } => Some(json!({ "retry_after": retry_after })),
            ApiError::NotFound {
                resource,
                identifier,
            } => Some(json!({ "resource": resource, "identifier": identifier })),
            ApiError::ServiceUnavailable { service } => Some(json!({ "service": service })),
            ApiError::Internal(_) => None,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(e) => tracing::error!(error = %e, "internal error"),
            other => tracing::warn!(
                error_code = other.code(),
                status_code = other.status().as_u16(),
                "API error: {}",
                other
            ),
        }

        let mut response = (self.status(), Json(self.body())).into_response();
        if let ApiError::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

/// For handlers that call a breaker without a fallback.
impl<E: fmt::Display> From<BreakerError<E>> for ApiError {
    fn from(err: BreakerError<E>) -> Self {
        match err {
            BreakerError::Open { name } | BreakerError::Timeout { name, .. } => {
                ApiError::ServiceUnavailable { service: name }
            }
            BreakerError::Operation(e) => ApiError::Internal(anyhow::anyhow!(e.to_string())),
        }
    }
}
