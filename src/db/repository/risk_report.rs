use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

/// Server-assigned fields stored alongside every report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportAudit {
    pub run_id: Uuid,
    pub created_by: String,
    /// Remote address of the uploader, when known.
    pub caller: Option<String>,
    pub image_sha256: String,
    pub created_at: NaiveDateTime,
}

/// A stored report including the image payload.
#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub id: Uuid,
    pub entry: RiskEntry,
    pub audit: ReportAudit,
}

/// A stored report without the image payload, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ReportListItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub risk: EnrichedRisk,
    pub audit: ReportAudit,
}

pub fn insert_risk_report(
    conn: &Connection,
    entry: &RiskEntry,
    audit: &ReportAudit,
) -> Result<Uuid, DatabaseError> {
    let id = Uuid::new_v4();
    let risk = &entry.risk;
    let keywords = serde_json::to_string(&risk.keywords)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("keywords: {e}")))?;

    conn.execute(
        "INSERT INTO risk_reports (id, run_id, record_index, risk_level, content_potential_risk,
         content_mitigation_plan, content_simulation, keywords, manager_name, manager_department,
         manager_contact_phone, manager_contact_email, document_title, document_summary,
         image_base64, image_sha256, caller, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            id.to_string(),
            audit.run_id.to_string(),
            risk.index,
            risk.risk_level.value(),
            risk.content.potential_risk,
            risk.content.mitigation_plan,
            risk.content.simulation,
            keywords,
            risk.manager.name,
            risk.manager.department,
            risk.manager.phone,
            risk.manager.email,
            risk.documents.title,
            risk.documents.summary,
            entry.image_base64,
            audit.image_sha256,
            audit.caller,
            audit.created_by,
            audit.created_at,
        ],
    )?;
    Ok(id)
}

const REPORT_COLUMNS: &str = "id, run_id, record_index, risk_level, content_potential_risk,
     content_mitigation_plan, content_simulation, keywords, manager_name, manager_department,
     manager_contact_phone, manager_contact_email, document_title, document_summary,
     image_sha256, caller, created_by, created_at";

pub fn get_risk_report(conn: &Connection, id: &Uuid) -> Result<Option<StoredReport>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPORT_COLUMNS}, image_base64 FROM risk_reports WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok((read_report_row(row)?, row.get::<_, String>(18)?))
    });

    match result {
        Ok((row, image_base64)) => {
            let (id, risk, audit) = report_from_row(row)?;
            Ok(Some(StoredReport {
                id,
                entry: RiskEntry::new(risk, image_base64),
                audit,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Newest reports first, without image payloads.
pub fn list_risk_reports(conn: &Connection, limit: usize) -> Result<Vec<ReportListItem>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPORT_COLUMNS} FROM risk_reports
         ORDER BY created_at DESC, record_index ASC LIMIT ?1"
    ))?;

    let rows = stmt
        .query_map(params![limit as i64], read_report_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| {
            let (id, risk, audit) = report_from_row(row)?;
            Ok(ReportListItem { id, risk, audit })
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn count_reports_for_run(conn: &Connection, run_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM risk_reports WHERE run_id = ?1",
        params![run_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct ReportRow {
    id: String,
    run_id: String,
    record_index: i64,
    risk_level: i64,
    potential_risk: String,
    mitigation_plan: String,
    simulation: String,
    keywords: String,
    manager_name: String,
    manager_department: String,
    manager_phone: String,
    manager_email: String,
    document_title: String,
    document_summary: String,
    image_sha256: String,
    caller: Option<String>,
    created_by: String,
    created_at: NaiveDateTime,
}

fn read_report_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        record_index: row.get(2)?,
        risk_level: row.get(3)?,
        potential_risk: row.get(4)?,
        mitigation_plan: row.get(5)?,
        simulation: row.get(6)?,
        keywords: row.get(7)?,
        manager_name: row.get(8)?,
        manager_department: row.get(9)?,
        manager_phone: row.get(10)?,
        manager_email: row.get(11)?,
        document_title: row.get(12)?,
        document_summary: row.get(13)?,
        image_sha256: row.get(14)?,
        caller: row.get(15)?,
        created_by: row.get(16)?,
        created_at: row.get(17)?,
    })
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidEnum {
        field: field.into(),
        value: value.into(),
    })
}

fn report_from_row(row: ReportRow) -> Result<(Uuid, EnrichedRisk, ReportAudit), DatabaseError> {
    let id = parse_uuid("id", &row.id)?;
    let run_id = parse_uuid("run_id", &row.run_id)?;
    let risk_level = RiskLevel::new(row.risk_level).ok_or_else(|| DatabaseError::InvalidEnum {
        field: "risk_level".into(),
        value: row.risk_level.to_string(),
    })?;
    let keywords: [String; KEYWORD_COUNT] = serde_json::from_str(&row.keywords)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("keywords: {e}")))?;

    let risk = EnrichedRisk {
        index: row.record_index,
        risk_level,
        content: RiskContent {
            potential_risk: row.potential_risk,
            mitigation_plan: row.mitigation_plan,
            simulation: row.simulation,
        },
        keywords,
        manager: Manager {
            name: row.manager_name,
            department: row.manager_department,
            phone: row.manager_phone,
            email: row.manager_email,
        },
        documents: DocumentReference {
            title: row.document_title,
            summary: row.document_summary,
        },
    };
    let audit = ReportAudit {
        run_id,
        created_by: row.created_by,
        caller: row.caller,
        image_sha256: row.image_sha256,
        created_at: row.created_at,
    };
    Ok((id, risk, audit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::risk::fixtures;

    fn audit(run_id: Uuid, at: &str) -> ReportAudit {
        ReportAudit {
            run_id,
            created_by: "석정우".into(),
            caller: Some("10.0.0.7".into()),
            image_sha256: "abc123".into(),
            created_at: NaiveDateTime::parse_from_str(at, "%Y-%m-%d %H:%M:%S").unwrap(),
        }
    }

    #[test]
    fn insert_then_get_round_trips_entry() {
        let conn = open_memory_database().unwrap();
        let entry = RiskEntry::new(fixtures::enriched(1, "추락"), "aW1hZ2U=");
        let run = Uuid::new_v4();
        let audit = audit(run, "2025-01-10 09:30:00");

        let id = insert_risk_report(&conn, &entry, &audit).unwrap();
        let stored = get_risk_report(&conn, &id).unwrap().expect("report exists");

        assert_eq!(stored.id, id);
        assert_eq!(stored.entry, entry);
        assert_eq!(stored.audit, audit);
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_risk_report(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn list_orders_newest_first_and_respects_limit() {
        let conn = open_memory_database().unwrap();
        let run = Uuid::new_v4();
        let older = RiskEntry::new(fixtures::enriched(1, "추락"), "x");
        let newer = RiskEntry::new(fixtures::enriched(2, "화재"), "y");
        insert_risk_report(&conn, &older, &audit(run, "2025-01-10 09:00:00")).unwrap();
        insert_risk_report(&conn, &newer, &audit(run, "2025-01-11 09:00:00")).unwrap();

        let all = list_risk_reports(&conn, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].risk.content.potential_risk, "화재");

        let one = list_risk_reports(&conn, 1).unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn listing_never_serializes_image() {
        let conn = open_memory_database().unwrap();
        let entry = RiskEntry::new(fixtures::enriched(1, "추락"), "secret-image");
        insert_risk_report(&conn, &entry, &audit(Uuid::new_v4(), "2025-01-10 09:00:00")).unwrap();

        let json = serde_json::to_string(&list_risk_reports(&conn, 10).unwrap()).unwrap();
        assert!(!json.contains("secret-image"));
        assert!(json.contains("\"riskLevel\":4"));
    }

    #[test]
    fn count_by_run() {
        let conn = open_memory_database().unwrap();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        let entry = RiskEntry::new(fixtures::enriched(1, "추락"), "x");
        insert_risk_report(&conn, &entry, &audit(run_a, "2025-01-10 09:00:00")).unwrap();
        insert_risk_report(&conn, &entry, &audit(run_a, "2025-01-10 09:00:00")).unwrap();
        insert_risk_report(&conn, &entry, &audit(run_b, "2025-01-10 09:00:00")).unwrap();

        assert_eq!(count_reports_for_run(&conn, &run_a).unwrap(), 2);
        assert_eq!(count_reports_for_run(&conn, &run_b).unwrap(), 1);
    }

    #[test]
    fn corrupt_keywords_surface_as_constraint_error() {
        let conn = open_memory_database().unwrap();
        let entry = RiskEntry::new(fixtures::enriched(1, "추락"), "x");
        let id = insert_risk_report(&conn, &entry, &audit(Uuid::new_v4(), "2025-01-10 09:00:00"))
            .unwrap();
        conn.execute(
            "UPDATE risk_reports SET keywords = '[\"only-one\"]' WHERE id = ?1",
            params![id.to_string()],
        )
        .unwrap();

        let err = get_risk_report(&conn, &id).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }
}
