use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::RecommendationStatus;

/// Generated clinical recommendation for one patient on one test date.
/// At most one row may exist per (hn_number, test_date); the store-level
/// unique constraint is the authoritative guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: i64,
    pub hn_number: String,
    pub doctor_id: i64,
    pub test_date: NaiveDate,
    pub generated_text: String,
    pub status: RecommendationStatus,
    pub updated_at: String,
}
