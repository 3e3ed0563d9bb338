use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{MeasurementItem, Panel};

pub fn get_all_panels(conn: &Connection) -> Result<Vec<Panel>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, name FROM panels ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Panel {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;

    let mut panels = Vec::new();
    for row in rows {
        panels.push(row?);
    }
    Ok(panels)
}

/// Required measurement items for one panel, in catalog order.
pub fn get_panel_items(
    conn: &Connection,
    panel_id: i64,
) -> Result<Vec<MeasurementItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT mi.id, mi.name, mi.unit
         FROM panel_items pi
         JOIN measurement_items mi ON pi.item_id = mi.id
         WHERE pi.panel_id = ?1
         ORDER BY mi.id",
    )?;
    let rows = stmt.query_map(params![panel_id], |row| {
        Ok(MeasurementItem {
            id: row.get(0)?,
            name: row.get(1)?,
            unit: row.get(2)?,
        })
    })?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn all_six_panels_seeded() {
        let conn = open_memory_database().unwrap();
        let panels = get_all_panels(&conn).unwrap();
        assert_eq!(panels.len(), 6);
        assert_eq!(panels[0].name, "Blood Pressure");
        assert_eq!(panels[5].name, "CBC");
    }

    #[test]
    fn blood_pressure_requires_systolic_and_diastolic() {
        let conn = open_memory_database().unwrap();
        let items = get_panel_items(&conn, 1).unwrap();
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Systolic", "Diastolic"]);
        assert_eq!(items[0].unit.as_deref(), Some("mmHg"));
    }

    #[test]
    fn kidney_health_includes_gender() {
        let conn = open_memory_database().unwrap();
        let items = get_panel_items(&conn, 3).unwrap();
        assert!(items.iter().any(|i| i.name == "Gender"));
    }

    #[test]
    fn unknown_panel_has_no_items() {
        let conn = open_memory_database().unwrap();
        assert!(get_panel_items(&conn, 42).unwrap().is_empty());
    }
}
