use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

/// A queued notification row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub report_id: Option<Uuid>,
    pub notification: Notification,
    pub status: NotificationStatus,
    pub created_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
}

pub fn insert_notification(
    conn: &Connection,
    report_id: Option<&Uuid>,
    notification: &Notification,
    created_at: NaiveDateTime,
) -> Result<Uuid, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO notification_outbox (id, report_id, recipient, subject, body, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            report_id.map(|r| r.to_string()),
            notification.recipient,
            notification.subject,
            notification.body,
            NotificationStatus::Pending.as_str(),
            created_at,
        ],
    )?;
    Ok(id)
}

/// Pending messages, oldest first.
pub fn list_pending_notifications(conn: &Connection) -> Result<Vec<OutboxMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, recipient, subject, body, status, created_at, sent_at
         FROM notification_outbox WHERE status = ?1 ORDER BY created_at ASC",
    )?;

    let rows = stmt.query_map(params![NotificationStatus::Pending.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, NaiveDateTime>(6)?,
            row.get::<_, Option<NaiveDateTime>>(7)?,
        ))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (id, report_id, recipient, subject, body, status, created_at, sent_at) = row?;
        messages.push(OutboxMessage {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            report_id: report_id
                .map(|r| Uuid::parse_str(&r))
                .transpose()
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            notification: Notification {
                recipient,
                subject,
                body,
            },
            status: NotificationStatus::from_str(&status)?,
            created_at,
            sent_at,
        });
    }
    Ok(messages)
}

pub fn mark_notification_sent(
    conn: &Connection,
    id: &Uuid,
    sent_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE notification_outbox SET status = ?1, sent_at = ?2 WHERE id = ?3",
        params![NotificationStatus::Sent.as_str(), sent_at, id.to_string()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "notification".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
