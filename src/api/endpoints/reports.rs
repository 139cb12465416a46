use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::{ReportListItem, StoredReport};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

impl ListParams {
    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// `GET /reports`: newest first, without image payloads.
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ReportListItem>>, ApiError> {
    let limit = params.effective_limit();
    let service = ctx.service.clone();
    let reports = tokio::task::spawn_blocking(move || service.reports(limit)).await??;
    Ok(Json(reports))
}

/// `GET /reports/:id`: one report including its image.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<StoredReport>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid report id: {id}")))?;
    let service = ctx.service.clone();
    tokio::task::spawn_blocking(move || service.report(&id))
        .await??
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Report {id} not found")))
}
