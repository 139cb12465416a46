//! Outbox relay: an external mailer polls pending notifications and
//! acknowledges each one after delivery.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::OutboxMessage;

/// `GET /notifications/pending`: oldest first.
pub async fn pending(State(ctx): State<ApiContext>) -> Result<Json<Vec<OutboxMessage>>, ApiError> {
    let service = ctx.service.clone();
    let messages = tokio::task::spawn_blocking(move || service.pending_notifications()).await??;
    Ok(Json(messages))
}

/// `POST /notifications/:id/sent`: 204 on success, 404 for an unknown id.
pub async fn mark_sent(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid notification id: {id}")))?;
    let service = ctx.service.clone();
    tokio::task::spawn_blocking(move || service.mark_notification_sent(&id)).await??;
    Ok(StatusCode::NO_CONTENT)
}
