//! Error responses for route handlers.
//!
//! Every failure leaves the server as JSON: `{"error": ...}` for client
//! errors, `{"error": ..., "details": ...}` for server-side failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::multipart::{MultipartError, MultipartRejection};
use pdf_watermark_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Standard result type for route handlers.
pub type RouteResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The submission itself is unusable
    #[error("{0}")]
    BadRequest(String),

    /// Multipart body could not be read (includes the upload size limit)
    #[error("{0}")]
    Multipart(#[from] MultipartError),

    /// Request was not multipart at all
    #[error("{0}")]
    MultipartRejection(#[from] MultipartRejection),

    /// Validation, processing, compositor and packaging failures
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::MultipartRejection(e) => e.status(),
            Self::Core(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            Self::Core(CoreError::CompositorTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Core(e) if e.is_compositor() => StatusCode::BAD_GATEWAY,
            Self::Core(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, stable summary used as the `error` field of 5xx responses.
    fn summary(&self) -> &'static str {
        match self {
            Self::Core(CoreError::CompositorTimeout(_)) => "Watermarking service timed out",
            Self::Core(e) if e.is_compositor() => "Watermarking service failed",
            Self::Core(CoreError::NothingToPackage | CoreError::Archive(_)) => {
                "Failed to package watermarked files"
            }
            Self::Core(_) => "Failed to watermark PDF",
            _ => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = if status.is_server_error() {
            error!("Request failed ({}): {}", status.as_u16(), self);
            json!({
                "error": self.summary(),
                "details": self.to_string(),
            })
        } else {
            let message = match &self {
                Self::Multipart(e) => e.body_text(),
                Self::MultipartRejection(e) => e.body_text(),
                other => other.to_string(),
            };
            json!({ "error": message })
        };

        (status, Json(body)).into_response()
    }
}

/// Extension trait for converting `Result<T, E>` to `RouteResult<T>`.
pub trait ResultExt<T, E: std::fmt::Display> {
    /// Converts the error to 500 Internal Server Error.
    fn or_internal_error(self) -> RouteResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for Result<T, E> {
    fn or_internal_error(self) -> RouteResult<T> {
        self.map_err(|e| ApiError::Internal(anyhow::anyhow!("{e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(CoreError::NotPdf).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(CoreError::NoPhrases).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(CoreError::CompositorAuth("denied".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(CoreError::CompositorQuota { retry_after: None }).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(CoreError::CompositorTimeout(120)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::from(CoreError::Archive("disk full".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(CoreError::PdfOpen("bad xref".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_summaries() {
        assert_eq!(
            ApiError::from(CoreError::CompositorJobFailed("x".into())).summary(),
            "Watermarking service failed"
        );
        assert_eq!(
            ApiError::from(CoreError::Archive("x".into())).summary(),
            "Failed to package watermarked files"
        );
    }
}
