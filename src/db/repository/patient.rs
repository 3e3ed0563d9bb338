use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::{Demographics, Gender, Patient};

pub fn get_patient_by_hn(
    conn: &Connection,
    hn_number: &str,
) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            "SELECT id, hn_number, name, lab_data_status
             FROM patients WHERE hn_number = ?1",
            params![hn_number],
            |row| {
                Ok(Patient {
                    id: row.get(0)?,
                    hn_number: row.get(1)?,
                    name: row.get(2)?,
                    lab_data_status: row.get::<_, i64>(3)? != 0,
                })
            },
        )
        .optional()?;
    Ok(patient)
}

pub fn get_demographics(
    conn: &Connection,
    hn_number: &str,
) -> Result<Option<Demographics>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT hn_number, gender, date_of_birth
             FROM patient_demographics WHERE hn_number = ?1",
            params![hn_number],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((hn, gender, dob)) => Ok(Some(Demographics {
            hn_number: hn,
            gender: Gender::from_str(&gender)?,
            date_of_birth: dob
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        })),
    }
}

/// Flip the patient's "has lab data" flag after a successful ingestion.
pub fn set_lab_data_status(
    conn: &Connection,
    patient_id: i64,
    status: bool,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE patients SET lab_data_status = ?1 WHERE id = ?2",
        params![status as i64, patient_id],
    )?;
    Ok(())
}

pub fn doctor_exists(conn: &Connection, doctor_id: i64) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM doctors WHERE id = ?1",
        params![doctor_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO patients (id, hn_number, name) VALUES (1, '000000123', 'Ann Chai');
             INSERT INTO patient_demographics (hn_number, gender, date_of_birth)
             VALUES ('000000123', 'female', '1980-05-02');
             INSERT INTO doctors (id, name) VALUES (7, 'Dr. Prasert');",
        )
        .unwrap();
    }

    #[test]
    fn patient_lookup_by_hn() {
        let conn = open_memory_database().unwrap();
        seed(&conn);

        let found = get_patient_by_hn(&conn, "000000123").unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert_eq!(found.name, "Ann Chai");
        assert!(!found.lab_data_status);

        assert!(get_patient_by_hn(&conn, "999999999").unwrap().is_none());
    }

    #[test]
    fn demographics_lookup_parses_gender_and_dob() {
        let conn = open_memory_database().unwrap();
        seed(&conn);

        let demo = get_demographics(&conn, "000000123").unwrap().unwrap();
        assert_eq!(demo.gender, Gender::Female);
        assert_eq!(
            demo.date_of_birth,
            Some(NaiveDate::from_ymd_opt(1980, 5, 2).unwrap())
        );
    }

    #[test]
    fn lab_data_status_flag() {
        let conn = open_memory_database().unwrap();
        seed(&conn);

        set_lab_data_status(&conn, 1, true).unwrap();
        let patient = get_patient_by_hn(&conn, "000000123").unwrap().unwrap();
        assert!(patient.lab_data_status);
    }

    #[test]
    fn doctor_existence_check() {
        let conn = open_memory_database().unwrap();
        seed(&conn);

        assert!(doctor_exists(&conn, 7).unwrap());
        assert!(!doctor_exists(&conn, 42).unwrap());
    }
}
