//! Ingestion Coordinator: persists one grouped batch inside one atomic
//! transaction.
//!
//! Order inside the transaction: doctor assignment → test instances →
//! measurement values → lab-data flag → commit. A failure rolls back that
//! batch only; sibling batches are untouched.

use std::collections::HashSet;

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::catalog::{is_complete, PanelCatalog, PanelEntry};
use crate::db::repository::{
    assign_patient_doctor, doctor_exists, get_demographics, get_patient_by_hn,
    insert_measurement_value, insert_test_instance, set_lab_data_status,
};
use crate::db::DatabaseError;
use crate::models::Demographics;
use crate::pipeline::grouper::Batch;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result of ingesting one batch: either committed with the created
/// instances, or skipped whole with a referential warning.
#[derive(Debug)]
pub enum BatchOutcome {
    Ingested(IngestedBatch),
    Skipped { reason: String },
}

#[derive(Debug)]
pub struct IngestedBatch {
    pub patient_id: i64,
    pub hn_number: String,
    pub test_date: NaiveDate,
    pub doctor_id: i64,
    /// False when the (patient, doctor) pair was already assigned.
    pub assignment_created: bool,
    pub instances: Vec<IngestedInstance>,
}

#[derive(Debug)]
pub struct IngestedInstance {
    pub test_instance_id: i64,
    pub panel_id: i64,
    pub measurement_count: usize,
}

/// Ingest one batch in its own transaction.
///
/// Referential problems (unknown patient, unknown panel, missing
/// demographic record when a panel needs gender) skip the batch with a
/// warning and never fail the upload; persistence errors abort and roll
/// back this batch only.
pub fn ingest_batch(
    conn: &mut Connection,
    catalog: &PanelCatalog,
    batch: &Batch,
    uploaded_by: i64,
) -> Result<BatchOutcome, IngestError> {
    let tx = conn.transaction().map_err(DatabaseError::from)?;

    let Some(patient) = get_patient_by_hn(&tx, &batch.hn_number)? else {
        return Ok(BatchOutcome::Skipped {
            reason: format!("unknown patient: {}", batch.hn_number),
        });
    };

    if !doctor_exists(&tx, batch.doctor_id)? {
        return Ok(BatchOutcome::Skipped {
            reason: format!("unknown doctor: {}", batch.doctor_id),
        });
    }

    // Referential check before any write: one unknown panel id skips the
    // whole batch.
    let mut entries: Vec<&PanelEntry> = Vec::with_capacity(batch.panels.len());
    for panel in &batch.panels {
        match catalog.panel(panel.panel_id) {
            Some(entry) => entries.push(entry),
            None => {
                return Ok(BatchOutcome::Skipped {
                    reason: format!("unknown panel: {}", panel.panel_id),
                });
            }
        }
    }

    let gender_code = match gender_demographics(&tx, catalog, batch)? {
        Some(demographics) => Some(demographics.gender.code()),
        None if needs_gender_synthesis(catalog, batch) => {
            return Ok(BatchOutcome::Skipped {
                reason: format!("no demographic record for patient: {}", batch.hn_number),
            });
        }
        None => None,
    };

    let assignment_created =
        assign_patient_doctor(&tx, patient.id, batch.doctor_id, uploaded_by)?;

    let mut instances = Vec::new();
    for (panel, entry) in batch.panels.iter().zip(entries) {
        if panel.values.is_empty() {
            tracing::debug!(
                panel_id = panel.panel_id,
                hn_number = %batch.hn_number,
                "Panel has no uploaded values; no test instance created"
            );
            continue;
        }

        let test_instance_id = insert_test_instance(
            &tx,
            patient.id,
            panel.panel_id,
            batch.test_date,
            batch.doctor_id,
            uploaded_by,
        )?;

        let mut values = panel.values.clone();
        if let Some(gender_item) = entry.gender_item() {
            let uploaded = values.iter().any(|(id, _)| *id == gender_item.id);
            if let (false, Some(code)) = (uploaded, gender_code) {
                // Synthesize from the stored demographic record (0/1)
                values.push((gender_item.id, code));
            }
        }

        let stored: HashSet<i64> = values.iter().map(|(id, _)| *id).collect();
        if !is_complete(&entry.required_item_ids(), &stored) {
            tracing::debug!(
                panel_id = panel.panel_id,
                test_instance_id,
                "Instance covers only part of the panel's required items"
            );
        }

        for (item_id, value) in &values {
            insert_measurement_value(&tx, test_instance_id, *item_id, *value)?;
        }

        instances.push(IngestedInstance {
            test_instance_id,
            panel_id: panel.panel_id,
            measurement_count: values.len(),
        });
    }

    set_lab_data_status(&tx, patient.id, true)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        hn_number = %batch.hn_number,
        test_date = %batch.test_date,
        instances = instances.len(),
        "Batch ingested"
    );

    Ok(BatchOutcome::Ingested(IngestedBatch {
        patient_id: patient.id,
        hn_number: batch.hn_number.clone(),
        test_date: batch.test_date,
        doctor_id: batch.doctor_id,
        assignment_created,
        instances,
    }))
}

fn needs_gender_synthesis(catalog: &PanelCatalog, batch: &Batch) -> bool {
    batch.panels.iter().any(|panel| {
        catalog
            .panel(panel.panel_id)
            .and_then(|entry| entry.gender_item())
            .is_some_and(|item| !panel.values.iter().any(|(id, _)| *id == item.id))
    })
}

fn gender_demographics(
    conn: &Connection,
    catalog: &PanelCatalog,
    batch: &Batch,
) -> Result<Option<Demographics>, DatabaseError> {
    if !needs_gender_synthesis(catalog, batch) {
        return Ok(None);
    }
    get_demographics(conn, &batch.hn_number)
}
