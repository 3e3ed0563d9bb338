use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::TestStatus;

/// One occurrence of a patient undergoing one panel on one date.
/// Re-uploading the same panel for the same patient/date always creates a
/// new instance rather than updating an old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestInstance {
    pub id: i64,
    pub patient_id: i64,
    pub panel_id: i64,
    pub test_date: NaiveDate,
    pub doctor_id: i64,
    pub uploaded_by: i64,
    pub status: TestStatus,
}

/// A stored value for one (test instance, measurement item) pair. The
/// classification label stays NULL until the Classification Invoker has
/// processed the owning instance; only that field is ever mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementValue {
    pub id: i64,
    pub test_instance_id: i64,
    pub item_id: i64,
    pub value: f64,
    pub classification: Option<String>,
}
