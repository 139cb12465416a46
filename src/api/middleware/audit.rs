//! Access logging middleware.
//!
//! Logs every request with method, path, caller address, response status
//! and elapsed time. Handlers run inside a `request` span carrying the
//! caller, so pipeline logs can be tied back to the client.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

/// Client address as seen by the server, when the connection info is known.
pub fn caller_of<B>(req: &Request<B>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let caller = caller_of(&req).unwrap_or_else(|| "unknown".into());
    let started = Instant::now();

    let span = tracing::info_span!("request", %method, %path, %caller);
    let response = next.run(req).instrument(span).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        tracing::error!(%method, %path, %caller, status, elapsed_ms, "API request failed");
    } else {
        tracing::info!(%method, %path, %caller, status, elapsed_ms, "API request");
    }

    response
}
