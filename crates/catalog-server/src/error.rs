//! HTTP error responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogError;

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Mapping for list, get and delete: store failures are server errors.
    pub fn from_read(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { .. } => Self::not_found(err.to_string()),
            CatalogError::StoreUnavailable(_) | CatalogError::StoreWriteFailed(_) => {
                Self::internal(err.to_string())
            }
        }
    }

    /// Mapping for create and update: store failures are reported as a bad
    /// request.
    pub fn from_write(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { .. } => Self::not_found(err.to_string()),
            CatalogError::StoreUnavailable(_) | CatalogError::StoreWriteFailed(_) => {
                Self::bad_request(err.to_string())
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_by_operation() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (
                ApiError::from_read(CatalogError::not_found("1")),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from_read(CatalogError::StoreUnavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from_read(CatalogError::StoreWriteFailed("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from_write(CatalogError::not_found("1")),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from_write(CatalogError::StoreWriteFailed("down".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from_write(CatalogError::StoreUnavailable("down".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{err:?}");
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn not_found_message() {
        let err = ApiError::from_read(CatalogError::not_found("abc"));
        assert_eq!(err.to_string(), "Product not found");
    }
}
