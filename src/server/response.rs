//! JSON bodies and error responses of the contact API.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::validation::FieldErrors;

/// Body of `GET /api/csrf-token`.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub csrf_token: String,
}

/// Body of a successful `POST /api/contact`.
#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
    pub csrf_token: String,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitBody {
    success: bool,
    error: &'static str,
    message: String,
    retry_after: i64,
    limit: u32,
    window: i64,
}

/// Every way the contact API can refuse a request.
#[derive(Debug)]
pub enum ApiError {
    /// Per-client window exhausted
    RateLimited {
        message: String,
        retry_after_secs: i64,
        limit: u32,
        window_minutes: i64,
    },
    /// Session submitted too recently
    TooSoon { retry_after_secs: i64 },
    /// Token missing or invalid
    Forbidden(&'static str),
    /// Field validation failed
    Validation(FieldErrors),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RateLimited {
                message,
                retry_after_secs,
                limit,
                window_minutes,
            } => {
                let body = RateLimitBody {
                    success: false,
                    error: "Rate limit exceeded",
                    message,
                    retry_after: retry_after_secs,
                    limit,
                    window: window_minutes,
                };
                with_retry_after(StatusCode::TOO_MANY_REQUESTS, Json(body), retry_after_secs)
            }
            ApiError::TooSoon { retry_after_secs } => with_retry_after(
                StatusCode::TOO_MANY_REQUESTS,
                error_body("Please wait before submitting again", None),
                retry_after_secs,
            ),
            ApiError::Forbidden(reason) => {
                (StatusCode::FORBIDDEN, error_body(reason, None)).into_response()
            }
            ApiError::Validation(fields) => {
                let error = match fields.len() {
                    1 => "Invalid field",
                    _ => "Invalid fields",
                };
                (StatusCode::BAD_REQUEST, error_body(error, Some(fields))).into_response()
            }
            ApiError::Internal(msg) => {
                // Log the real error server-side, return a generic message to the client
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("Failed to send message. Please try again.", None),
                )
                    .into_response()
            }
        }
    }
}

fn error_body(error: &str, fields: Option<FieldErrors>) -> Json<ErrorBody> {
    Json(ErrorBody {
        success: false,
        error: error.to_string(),
        fields,
    })
}

fn with_retry_after(status: StatusCode, body: impl IntoResponse, secs: i64) -> Response {
    let mut response = (status, body).into_response();
    if let Ok(value) = HeaderValue::from_str(&secs.max(0).to_string()) {
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, value);
    }
    response
}
