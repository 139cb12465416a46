//! Report service: runs the pipeline for one upload, persists every entry,
//! then announces each stored report.
//!
//! Persistence only starts once all pipeline stages have succeeded, so a
//! failed run writes nothing. Rows already written are kept when a later
//! row or a notification fails.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::orchestrator::{ImageUpload, ItemFailure, RiskPipeline};
use super::PipelineError;
use crate::db::{
    DatabaseError, OutboxMessage, ReportAudit, ReportListItem, RiskStore, StoredReport,
};
use crate::models::*;
use crate::notify::{build_notification, Notifier, NotifyError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Notification failed: {0}")]
    Notify(#[from] NotifyError),
}

/// Who stored a report and where notifications go.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub author: String,
    pub recipient: Option<String>,
    pub subject: String,
}

/// Result of one processed upload.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub run_id: Uuid,
    pub report_ids: Vec<Uuid>,
    pub failures: Vec<ItemFailure>,
}

pub struct ReportService {
    pipeline: RiskPipeline,
    store: Arc<dyn RiskStore + Send + Sync>,
    notifier: Box<dyn Notifier + Send + Sync>,
    settings: ServiceSettings,
}

impl ReportService {
    pub fn new(
        pipeline: RiskPipeline,
        store: Arc<dyn RiskStore + Send + Sync>,
        notifier: Box<dyn Notifier + Send + Sync>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            pipeline,
            store,
            notifier,
            settings,
        }
    }

    /// Run the full flow for one upload. `caller` is the client address.
    pub fn process(
        &self,
        upload: &ImageUpload,
        caller: Option<&str>,
    ) -> Result<ProcessingReport, ServiceError> {
        let run_id = Uuid::new_v4();
        let mut outcome = self.pipeline.run(run_id, upload)?;

        let audit = ReportAudit {
            run_id: outcome.tracker.run_id(),
            created_by: self.settings.author.clone(),
            caller: caller.map(str::to_string),
            image_sha256: outcome.image.sha256.clone(),
            created_at: chrono::Local::now().naive_local(),
        };

        let mut report_ids = Vec::with_capacity(outcome.entries.len());
        for entry in &outcome.entries {
            let id = self.store.save(entry, &audit).map_err(|e| {
                tracing::error!(
                    run_id = %run_id,
                    index = entry.risk.index,
                    stored = report_ids.len(),
                    error = %e,
                    "Failed to store risk report"
                );
                e
            })?;
            report_ids.push(id);
        }
        outcome.tracker.advance(PipelineState::Persisted);

        let recipient = self.settings.recipient.as_deref().unwrap_or_default();
        for (entry, id) in outcome.entries.iter().zip(&report_ids) {
            let notification = build_notification(entry, recipient, &self.settings.subject)?;
            self.notifier.send(Some(id), &notification).map_err(|e| {
                tracing::error!(run_id = %run_id, report_id = %id, error = %e, "Notification failed");
                e
            })?;
        }

        tracing::info!(
            run_id = %run_id,
            caller = caller.unwrap_or("unknown"),
            stored = report_ids.len(),
            skipped = outcome.failures.len(),
            "Upload processed"
        );
        Ok(ProcessingReport {
            run_id,
            report_ids,
            failures: outcome.failures,
        })
    }

    pub fn report(&self, id: &Uuid) -> Result<Option<StoredReport>, DatabaseError> {
        self.store.get(id)
    }

    pub fn reports(&self, limit: usize) -> Result<Vec<ReportListItem>, DatabaseError> {
        self.store.list(limit)
    }

    /// Queued notifications for an external relay to deliver.
    pub fn pending_notifications(&self) -> Result<Vec<OutboxMessage>, DatabaseError> {
        self.store.pending_notifications()
    }

    pub fn mark_notification_sent(&self, id: &Uuid) -> Result<(), DatabaseError> {
        self.store.mark_notification_sent(id)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::SqliteRiskStore;
    use crate::pipeline::inference::InferenceClient;
    use crate::pipeline::orchestrator::testing::{all_documents, pipeline_with};

    pub fn settings() -> ServiceSettings {
        ServiceSettings {
            author: "nearmiss".into(),
            recipient: Some("safety@example.com".into()),
            subject: "유해위험 신고 알림".into(),
        }
    }

    /// Service over an on-disk store in `dir`.
    pub fn service_with(
        dir: &std::path::Path,
        client: impl InferenceClient + Send + Sync + 'static,
        notifier: impl Notifier + Send + Sync + 'static,
    ) -> (ReportService, Arc<SqliteRiskStore>) {
        let store = Arc::new(SqliteRiskStore::open(dir.join("reports.db")).unwrap());
        let service = ReportService::new(
            pipeline_with(client, all_documents()),
            store.clone(),
            Box::new(notifier),
            settings(),
        );
        (service, store)
    }

    /// Service whose notifications land in the store's outbox.
    pub fn outbox_service_with(
        dir: &std::path::Path,
        client: impl InferenceClient + Send + Sync + 'static,
    ) -> ReportService {
        let store = Arc::new(SqliteRiskStore::open(dir.join("reports.db")).unwrap());
        ReportService::new(
            pipeline_with(client, all_documents()),
            store.clone(),
            Box::new(crate::notify::OutboxNotifier::new(store)),
            settings(),
        )
    }
}
