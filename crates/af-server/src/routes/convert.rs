//! Conversion route handlers: multipart uploads and remote URLs.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use af_engine::{ConversionRequest, Outcome};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;

/// Multipart field carrying the uploaded media.
pub const FILE_FIELD: &str = "video";

/// Multipart field carrying the requested format token.
pub const FORMAT_FIELD: &str = "format";

/// Request body for converting a remote URL.
#[derive(Debug, Deserialize)]
pub struct ConvertUrlRequest {
    pub url: Option<String>,
    pub format: Option<String>,
}

/// Renders an [`Outcome`] with the matching status code.
pub struct OutcomeResponse(pub Outcome);

impl IntoResponse for OutcomeResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

/// POST /upload
///
/// Streams the `video` field into the staging directory and converts it to
/// the format named by the optional `format` field.
pub async fn upload(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<OutcomeResponse, AppError> {
    let mut multipart = multipart.map_err(|e| {
        AppError::new(af_core::Error::invalid(format!("expected a multipart upload: {}", e.body_text())))
            .with_request_id(request_id.0.clone())
    })?;

    let mut staged: Option<PathBuf> = None;
    let mut format: Option<String> = None;

    if let Err(e) = read_upload(&ctx, &mut multipart, &mut staged, &mut format).await {
        if let Some(path) = staged {
            discard_upload(&path).await;
        }
        return Err(e.with_request_id(request_id.0));
    }

    let Some(file) = staged else {
        return Err(AppError::new(af_core::Error::invalid("No file uploaded"))
            .with_request_id(request_id.0));
    };

    let outcome = ctx
        .conversions
        .submit(ConversionRequest::local(file.clone(), format))
        .await;

    // A rejected request never became a job, so the upload is still ours.
    if outcome.job_id().is_none() {
        discard_upload(&file).await;
    }

    Ok(OutcomeResponse(outcome))
}

/// POST /api/convert
pub async fn convert_url(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Json<ConvertUrlRequest>, JsonRejection>,
) -> Result<OutcomeResponse, AppError> {
    let Json(body) = body.map_err(|e| {
        AppError::new(af_core::Error::invalid(format!("malformed request body: {}", e.body_text())))
            .with_request_id(request_id.0)
    })?;

    let request = ConversionRequest {
        file: None,
        url: body.url,
        format: body.format,
    };
    Ok(OutcomeResponse(ctx.conversions.submit(request).await))
}

async fn read_upload(
    ctx: &AppContext,
    multipart: &mut Multipart,
    staged: &mut Option<PathBuf>,
    format: &mut Option<String>,
) -> Result<(), AppError> {
    while let Some(mut field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(FILE_FIELD) if staged.is_none() => {
                let path = ctx.conversions.staging_path(field.file_name());
                *staged = Some(path.clone());
                let bytes = write_field(&mut field, &path).await?;
                tracing::debug!(bytes, "upload staged");
            }
            Some(FORMAT_FIELD) => {
                *format = Some(field.text().await.map_err(bad_multipart)?);
            }
            _ => {}
        }
    }
    Ok(())
}

async fn write_field(field: &mut Field<'_>, path: &Path) -> Result<u64, AppError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(af_core::Error::from)?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
        file.write_all(&chunk).await.map_err(af_core::Error::from)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(af_core::Error::from)?;
    Ok(written)
}

async fn discard_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            let err = af_core::Error::cleanup(path, e);
            tracing::warn!(error_kind = %err.kind(), "{err}");
        }
    }
}

fn bad_multipart(e: MultipartError) -> AppError {
    AppError::new(af_core::Error::invalid(format!("malformed upload: {}", e.body_text())))
}
