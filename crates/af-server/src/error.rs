//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, AppError>`; request-level failures render as
//! the same `{status, error_kind, message}` body a failed job produces.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for [`af_core::Error`].
#[derive(Debug)]
pub struct AppError {
    inner: af_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: af_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }
}

impl From<af_core::Error> for AppError {
    fn from(e: af_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let kind = self.inner.kind();
        let body = json!({
            "status": "failed",
            "job_id": null,
            "error_kind": kind,
            "message": format!("{}: {}", kind.summary(), self.inner.detail()),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn invalid_input_produces_400() {
        let err = AppError::new(af_core::Error::invalid("No file uploaded"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn io_produces_500() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = AppError::new(af_core::Error::from(io));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn body_carries_error_kind() {
        let response = AppError::new(af_core::Error::invalid("No file uploaded"))
            .with_request_id("req-123".into())
            .into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["status"], "failed");
        assert_eq!(body["error_kind"], "invalid_input");
        assert_eq!(body["request_id"], "req-123");
        assert!(body["message"].as_str().unwrap().contains("No file uploaded"));
    }
}
