//! Shared state for the API router.

use std::sync::Arc;

use crate::pipeline::ReportService;

/// Multipart framing on top of the image itself.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared context for all routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub service: Arc<ReportService>,
    pub max_upload_bytes: usize,
}

impl ApiContext {
    pub fn new(service: Arc<ReportService>, max_upload_bytes: usize) -> Self {
        Self {
            service,
            max_upload_bytes,
        }
    }

    /// Request body limit applied to every route.
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes + MULTIPART_OVERHEAD_BYTES
    }
}
