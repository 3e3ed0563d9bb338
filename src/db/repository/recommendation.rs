use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::DatabaseError;
use crate::models::{Recommendation, RecommendationStatus};

/// Recommendation joined with patient and doctor context (review list).
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationListEntry {
    pub recommendation_id: i64,
    pub hn_number: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub test_date: String,
    pub status: String,
}

/// Application-level idempotency pre-check. The UNIQUE (hn_number,
/// test_date) constraint remains the authoritative guard; this only
/// avoids pointless external calls.
pub fn recommendation_exists(
    conn: &Connection,
    hn_number: &str,
    test_date: NaiveDate,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM recommendations WHERE hn_number = ?1 AND test_date = ?2",
        params![hn_number, test_date.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_recommendation(
    conn: &Connection,
    hn_number: &str,
    doctor_id: i64,
    test_date: NaiveDate,
    generated_text: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO recommendations (hn_number, doctor_id, test_date, generated_text, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            hn_number,
            doctor_id,
            test_date.to_string(),
            generated_text,
            RecommendationStatus::Pending.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_recommendation(
    conn: &Connection,
    id: i64,
) -> Result<Option<Recommendation>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, hn_number, doctor_id, test_date, generated_text, status, updated_at
             FROM recommendations WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((id, hn, doctor_id, date, text, status, updated_at)) => Ok(Some(Recommendation {
            id,
            hn_number: hn,
            doctor_id,
            test_date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").unwrap_or_default(),
            generated_text: text,
            status: RecommendationStatus::from_str(&status)?,
            updated_at,
        })),
    }
}

pub fn list_recommendations(
    conn: &Connection,
) -> Result<Vec<RecommendationListEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.hn_number, p.name, d.name, r.test_date, r.status
         FROM recommendations r
         JOIN patients p ON r.hn_number = p.hn_number
         JOIN doctors d ON r.doctor_id = d.id
         ORDER BY r.updated_at DESC, r.id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(RecommendationListEntry {
            recommendation_id: row.get(0)?,
            hn_number: row.get(1)?,
            patient_name: row.get(2)?,
            doctor_name: row.get(3)?,
            test_date: row.get(4)?,
            status: row.get(5)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// Transition a recommendation's review status. Returns false when no
/// such recommendation exists.
pub fn update_recommendation_status(
    conn: &Connection,
    id: i64,
    status: RecommendationStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE recommendations
         SET status = ?1, updated_at = datetime('now')
         WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(changed > 0)
}
