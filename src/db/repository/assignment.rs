use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Idempotently record that a doctor ordered tests for a patient.
///
/// Uses `INSERT OR IGNORE` against the (patient, doctor) unique constraint
/// instead of catching a duplicate-key error after the fact. Returns true
/// when a new assignment row was created, false when the pair already
/// existed.
pub fn assign_patient_doctor(
    conn: &Connection,
    patient_id: i64,
    doctor_id: i64,
    assigned_by: i64,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO patient_doctor (patient_id, doctor_id, assigned_by)
         VALUES (?1, ?2, ?3)",
        params![patient_id, doctor_id, assigned_by],
    )?;
    Ok(changed > 0)
}

pub fn assignment_exists(
    conn: &Connection,
    patient_id: i64,
    doctor_id: i64,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM patient_doctor WHERE patient_id = ?1 AND doctor_id = ?2",
        params![patient_id, doctor_id],
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
             INSERT INTO doctors (id, name) VALUES (7, 'Dr. Prasert');",
        )
        .unwrap();
    }

    #[test]
    fn first_assignment_is_created() {
        let conn = open_memory_database().unwrap();
        seed(&conn);

        assert!(assign_patient_doctor(&conn, 1, 7, 99).unwrap());
        assert!(assignment_exists(&conn, 1, 7).unwrap());
    }

    #[test]
    fn duplicate_assignment_is_ignored_not_an_error() {
        let conn = open_memory_database().unwrap();
        seed(&conn);

        assert!(assign_patient_doctor(&conn, 1, 7, 99).unwrap());
        // Second call must succeed and report "already existed"
        assert!(!assign_patient_doctor(&conn, 1, 7, 99).unwrap());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM patient_doctor", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
