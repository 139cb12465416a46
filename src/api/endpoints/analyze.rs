use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Multipart, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::{ImageUpload, InputError};

/// Multipart field carrying the photo.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub message: &'static str,
    pub run_id: Uuid,
    pub report_ids: Vec<Uuid>,
    pub risk_count: usize,
    pub skipped: usize,
}

/// `POST /analyze-image`: run the pipeline on one uploaded photo.
///
/// The pipeline blocks on model calls and SQLite, so it runs on the
/// blocking pool. A missing `image` field is rejected before any work.
pub async fn analyze_image(
    State(ctx): State<ApiContext>,
    connect: Option<ConnectInfo<SocketAddr>>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let caller = connect.map(|ConnectInfo(addr)| addr.ip().to_string());
    let upload = read_image_field(multipart).await?.ok_or_else(|| {
        tracing::warn!(caller = caller.as_deref().unwrap_or("unknown"), "Upload without image field");
        ApiError::BadRequest(InputError::MissingImage.to_string())
    })?;

    let service = ctx.service.clone();
    let worker_caller = caller.clone();
    let result =
        tokio::task::spawn_blocking(move || service.process(&upload, worker_caller.as_deref()))
            .await?;

    let report = result.map_err(|e| {
        tracing::error!(
            caller = caller.as_deref().unwrap_or("unknown"),
            error = %e,
            "Image analysis failed"
        );
        ApiError::from(e)
    })?;

    Ok(Json(AnalyzeResponse {
        message: "Image analyzed and risk reports stored.",
        run_id: report.run_id,
        risk_count: report.report_ids.len(),
        skipped: report.failures.len(),
        report_ids: report.report_ids,
    }))
}

/// Pull the `image` field out of the form. Other fields are ignored.
async fn read_image_field(mut multipart: Multipart) -> Result<Option<ImageUpload>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read image data: {e}")))?;
        return Ok(Some(ImageUpload {
            bytes: bytes.to_vec(),
            content_type,
            file_name,
        }));
    }
    Ok(None)
}
