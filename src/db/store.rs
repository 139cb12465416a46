use std::path::PathBuf;

use rusqlite::Connection;
use uuid::Uuid;

use super::repository::{self, OutboxMessage, ReportAudit, ReportListItem, StoredReport};
use super::sqlite::open_database;
use super::DatabaseError;
use crate::models::*;

/// Storage collaborator for finished risk entries.
pub trait RiskStore {
    /// Persist one entry, returning its row id.
    fn save(&self, entry: &RiskEntry, audit: &ReportAudit) -> Result<Uuid, DatabaseError>;
    fn get(&self, id: &Uuid) -> Result<Option<StoredReport>, DatabaseError>;
    fn list(&self, limit: usize) -> Result<Vec<ReportListItem>, DatabaseError>;
    /// Queue a notification for delivery, optionally linked to a stored report.
    fn enqueue_notification(
        &self,
        report_id: Option<&Uuid>,
        notification: &Notification,
    ) -> Result<Uuid, DatabaseError>;
    /// Outbox messages a relay still has to deliver, oldest first.
    fn pending_notifications(&self) -> Result<Vec<OutboxMessage>, DatabaseError>;
    /// Record delivery by the relay. Unknown ids are `NotFound`.
    fn mark_notification_sent(&self, id: &Uuid) -> Result<(), DatabaseError>;
}

/// SQLite-backed store. Opens a fresh connection per operation so request
/// threads never share a handle.
pub struct SqliteRiskStore {
    db_path: PathBuf,
}

impl SqliteRiskStore {
    /// Create the store, running migrations once up front.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let db_path = db_path.into();
        open_database(&db_path)?;
        Ok(Self { db_path })
    }

    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection, DatabaseError> {
        open_database(&self.db_path)
    }
}

impl RiskStore for SqliteRiskStore {
    fn save(&self, entry: &RiskEntry, audit: &ReportAudit) -> Result<Uuid, DatabaseError> {
        let conn = self.connect()?;
        let id = repository::insert_risk_report(&conn, entry, audit)?;
        tracing::debug!(
            report_id = %id,
            run_id = %audit.run_id,
            index = entry.risk.index,
            "Risk report stored"
        );
        Ok(id)
    }

    fn get(&self, id: &Uuid) -> Result<Option<StoredReport>, DatabaseError> {
        let conn = self.connect()?;
        repository::get_risk_report(&conn, id)
    }

    fn list(&self, limit: usize) -> Result<Vec<ReportListItem>, DatabaseError> {
        let conn = self.connect()?;
        repository::list_risk_reports(&conn, limit)
    }

    fn enqueue_notification(
        &self,
        report_id: Option<&Uuid>,
        notification: &Notification,
    ) -> Result<Uuid, DatabaseError> {
        let conn = self.connect()?;
        repository::insert_notification(
            &conn,
            report_id,
            notification,
            chrono::Local::now().naive_local(),
        )
    }

    fn pending_notifications(&self) -> Result<Vec<OutboxMessage>, DatabaseError> {
        let conn = self.connect()?;
        repository::list_pending_notifications(&conn)
    }

    fn mark_notification_sent(&self, id: &Uuid) -> Result<(), DatabaseError> {
        let conn = self.connect()?;
        repository::mark_notification_sent(&conn, id, chrono::Local::now().naive_local())?;
        tracing::info!(notification_id = %id, "Notification marked sent");
        Ok(())
    }
}
