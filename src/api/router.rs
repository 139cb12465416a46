//! API router.
//!
//! Layers (outermost first): CORS, access log, body limit. CORS is
//! permissive since the upload page may be served from another origin.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

pub fn api_router(ctx: ApiContext) -> Router {
    let body_limit = ctx.body_limit();

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    Router::new()
        .route("/analyze-image", post(endpoints::analyze::analyze_image))
        .route("/health", get(endpoints::health::check))
        .route("/reports", get(endpoints::reports::list))
        .route("/reports/:id", get(endpoints::reports::detail))
        .route(
            "/notifications/pending",
            get(endpoints::notifications::pending),
        )
        .route(
            "/notifications/:id/sent",
            post(endpoints::notifications::mark_sent),
        )
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(CorsLayer::permissive())
}
