//! Mapping of core and auth failures onto HTTP responses.

use api_shared::{AuthError, ErrorRes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hatch_core::CoreError;

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Core(CoreError),
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Core(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthError::Expired(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::Core(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Core(
                CoreError::PathTraversal(_)
                | CoreError::EmptySelection
                | CoreError::InvalidInput(_)
                | CoreError::FileChanged { .. },
            ) => StatusCode::BAD_REQUEST,
            ApiError::Core(CoreError::RangeNotSatisfiable { .. }) => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            ApiError::Core(CoreError::UploadTransientError(_) | CoreError::UploadFatalError(_)) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Core(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            ApiError::Auth(AuthError::Expired(_)) => "Unauthorized".to_string(),
            ApiError::Auth(_) => "Forbidden".to_string(),
            ApiError::Core(e) if status != StatusCode::INTERNAL_SERVER_ERROR => e.to_string(),
            ApiError::Core(e) => {
                tracing::error!("request failed: {}", e);
                "internal server error".to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!("request failed: {}", e);
                "internal server error".to_string()
            }
        };

        let mut response = (status, Json(ErrorRes { error: message })).into_response();

        if let ApiError::Core(CoreError::RangeNotSatisfiable { size }) = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}
