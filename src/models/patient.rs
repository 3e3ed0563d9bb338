use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::Gender;

/// Collaborator-owned patient record. The pipeline only reads it, apart
/// from flipping `lab_data_status` after a first successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub hn_number: String,
    pub name: String,
    pub lab_data_status: bool,
}

/// Demographic record keyed by patient number, used to synthesize the
/// Gender measurement when an upload omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demographics {
    pub hn_number: String,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
}
