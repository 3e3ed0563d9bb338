use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::DatabaseError;
use crate::models::{TestInstance, TestStatus};

/// One stored measurement joined with its item metadata, the shape the
/// Classification Invoker works on.
#[derive(Debug, Clone)]
pub struct NamedMeasurement {
    pub item_id: i64,
    pub name: String,
    pub value: f64,
    pub classification: Option<String>,
}

/// One measurement joined with panel and item metadata for a patient/date
/// aggregate, the shape the Recommendation Generator works on.
#[derive(Debug, Clone)]
pub struct DateMeasurement {
    pub panel_name: String,
    pub item_name: String,
    pub unit: Option<String>,
    pub value: f64,
    pub classification: Option<String>,
}

/// Recent test instance for a doctor's assigned patients (review surface).
#[derive(Debug, Clone, Serialize)]
pub struct RecentTest {
    pub test_instance_id: i64,
    pub hn_number: String,
    pub patient_name: String,
    pub panel_name: String,
    pub test_date: String,
    pub status: String,
}

pub fn insert_test_instance(
    conn: &Connection,
    patient_id: i64,
    panel_id: i64,
    test_date: NaiveDate,
    doctor_id: i64,
    uploaded_by: i64,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO test_instances (patient_id, panel_id, test_date, doctor_id, uploaded_by, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            patient_id,
            panel_id,
            test_date.to_string(),
            doctor_id,
            uploaded_by,
            TestStatus::Pending.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a raw measurement value; classification stays NULL until the
/// Classification Invoker has processed the instance.
pub fn insert_measurement_value(
    conn: &Connection,
    test_instance_id: i64,
    item_id: i64,
    value: f64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO measurement_values (test_instance_id, item_id, value, classification)
         VALUES (?1, ?2, ?3, NULL)",
        params![test_instance_id, item_id, value],
    )?;
    Ok(())
}

pub fn get_test_instance(
    conn: &Connection,
    id: i64,
) -> Result<Option<TestInstance>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, panel_id, test_date, doctor_id, uploaded_by, status
             FROM test_instances WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((id, patient_id, panel_id, date, doctor_id, uploaded_by, status)) => {
            Ok(Some(TestInstance {
                id,
                patient_id,
                panel_id,
                test_date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").unwrap_or_default(),
                doctor_id,
                uploaded_by,
                status: TestStatus::from_str(&status)?,
            }))
        }
    }
}

/// All measurements of one instance with their canonical item names.
pub fn get_instance_measurements(
    conn: &Connection,
    test_instance_id: i64,
) -> Result<Vec<NamedMeasurement>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT mv.item_id, mi.name, mv.value, mv.classification
         FROM measurement_values mv
         JOIN measurement_items mi ON mv.item_id = mi.id
         WHERE mv.test_instance_id = ?1
         ORDER BY mv.item_id",
    )?;
    let rows = stmt.query_map(params![test_instance_id], |row| {
        Ok(NamedMeasurement {
            item_id: row.get(0)?,
            name: row.get(1)?,
            value: row.get(2)?,
            classification: row.get(3)?,
        })
    })?;

    let mut measurements = Vec::new();
    for row in rows {
        measurements.push(row?);
    }
    Ok(measurements)
}

/// Attach a classification label to one stored measurement. Only the
/// label is mutated, never the value.
pub fn set_measurement_classification(
    conn: &Connection,
    test_instance_id: i64,
    item_id: i64,
    classification: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE measurement_values SET classification = ?1
         WHERE test_instance_id = ?2 AND item_id = ?3",
        params![classification, test_instance_id, item_id],
    )?;
    Ok(())
}

pub fn set_test_status(
    conn: &Connection,
    test_instance_id: i64,
    status: TestStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE test_instances SET status = ?1 WHERE id = ?2",
        params![status.as_str(), test_instance_id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "test_instance".into(),
            id: test_instance_id.to_string(),
        });
    }
    Ok(())
}

/// Every measurement recorded for a patient on one calendar date, joined
/// with panel and item metadata, ordered by panel name then item name.
pub fn get_measurements_for_patient_date(
    conn: &Connection,
    hn_number: &str,
    test_date: NaiveDate,
) -> Result<Vec<DateMeasurement>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT pa.name, mi.name, mi.unit, mv.value, mv.classification
         FROM measurement_values mv
         JOIN test_instances ti ON mv.test_instance_id = ti.id
         JOIN panels pa ON ti.panel_id = pa.id
         JOIN measurement_items mi ON mv.item_id = mi.id
         JOIN patients p ON ti.patient_id = p.id
         WHERE p.hn_number = ?1 AND ti.test_date = ?2
         ORDER BY pa.name, mi.name",
    )?;
    let rows = stmt.query_map(params![hn_number, test_date.to_string()], |row| {
        Ok(DateMeasurement {
            panel_name: row.get(0)?,
            item_name: row.get(1)?,
            unit: row.get(2)?,
            value: row.get(3)?,
            classification: row.get(4)?,
        })
    })?;

    let mut measurements = Vec::new();
    for row in rows {
        measurements.push(row?);
    }
    Ok(measurements)
}

/// Latest test instances ordered for patients assigned to a doctor.
pub fn recent_tests_for_doctor(
    conn: &Connection,
    doctor_id: i64,
    limit: u32,
) -> Result<Vec<RecentTest>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT ti.id, p.hn_number, p.name, pa.name, ti.test_date, ti.status
         FROM test_instances ti
         JOIN patients p ON ti.patient_id = p.id
         JOIN panels pa ON ti.panel_id = pa.id
         JOIN patient_doctor pd ON pd.patient_id = p.id
         WHERE pd.doctor_id = ?1
         ORDER BY ti.test_date DESC, ti.id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![doctor_id, limit], |row| {
        Ok(RecentTest {
            test_instance_id: row.get(0)?,
            hn_number: row.get(1)?,
            patient_name: row.get(2)?,
            panel_name: row.get(3)?,
            test_date: row.get(4)?,
            status: row.get(5)?,
        })
    })?;

    let mut tests = Vec::new();
    for row in rows {
        tests.push(row?);
    }
    Ok(tests)
}
