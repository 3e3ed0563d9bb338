//! Recommendation Generator: aggregates a patient's measurements for one
//! test date, renders a deterministic prompt, calls the external
//! text-generation service and stores the result.
//!
//! Best-effort post-processing: it runs only after the owning ingestion
//! has committed, and its failures never propagate back to the uploader.
//! The UNIQUE (hn_number, test_date) constraint is the authoritative
//! guard against duplicate generation; the existence pre-check only
//! avoids pointless external calls.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::catalog::GENDER_ITEM_NAME;
use crate::db::repository::{
    get_measurements_for_patient_date, get_patient_by_hn, insert_recommendation,
    recommendation_exists, DateMeasurement,
};
use crate::db::DatabaseError;
use crate::models::Gender;
use crate::pipeline::classify::UNKNOWN_CLASSIFICATION;

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("No lab results found for {hn_number} on {test_date}")]
    NoDataForDate {
        hn_number: String,
        test_date: NaiveDate,
    },

    #[error("Cannot reach text-generation service at {0}")]
    Connection(String),

    #[error("Text-generation request failed: {0}")]
    HttpClient(String),

    #[error("Text-generation service returned {status}: {body}")]
    ServiceError { status: u16, body: String },

    #[error("Malformed text-generation response: {0}")]
    ResponseParsing(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for RecommendError {
    fn from(err: DatabaseError) -> Self {
        RecommendError::Database(err)
    }
}

/// Outcome of one generation attempt for a (patient, date) pair.
#[derive(Debug, PartialEq, Eq)]
pub enum RecommendOutcome {
    Created { recommendation_id: i64 },
    AlreadyExists,
}

/// External text-generation service, called synchronously with the full
/// prompt.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, RecommendError>;
}

// ---------------------------------------------------------------------------
// HTTP-backed generator
// ---------------------------------------------------------------------------

/// HTTP client for a local `/api/generate`-style text-generation service.
pub struct HttpTextGenerator {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpTextGenerator {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        }
    }
}

impl TextGenerator for HttpTextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, RecommendError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                RecommendError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                RecommendError::HttpClient(format!(
                    "Request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                RecommendError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RecommendError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| RecommendError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }
}

// ---------------------------------------------------------------------------
// Prompt rendering
// ---------------------------------------------------------------------------

/// Render the deterministic clinical-summary prompt: measurements grouped
/// per panel, demographics re-expressed as readable labels with their
/// classification cleared (demographics are never "abnormal").
pub fn build_recommendation_prompt(patient_name: &str, rows: &[DateMeasurement]) -> String {
    let mut items_description = String::new();
    let mut current_panel: Option<&str> = None;

    for row in rows {
        if current_panel != Some(row.panel_name.as_str()) {
            items_description.push_str(&format!("\n{}:\n", row.panel_name));
            current_panel = Some(row.panel_name.as_str());
        }

        let (value_text, status) = if row.item_name == GENDER_ITEM_NAME {
            (
                Gender::from_code(row.value).display_label().to_string(),
                None,
            )
        } else {
            (format_value(row.value), row.classification.clone())
        };

        let status_text = match status.as_deref() {
            None | Some(UNKNOWN_CLASSIFICATION) => "Status is unknown".to_string(),
            Some(label) => format!("Status: {label}"),
        };

        let unit = row.unit.as_deref().unwrap_or("");
        items_description.push_str(&format!(
            "  - {} = {} {} ({})\n",
            row.item_name, value_text, unit, status_text
        ));
    }

    format!(
        "Generate an overall short and simple clinical interpretation of the \
following lab results from today's testing, not more than 50 words:

Patient: {patient_name}
Lab Values:
{items_description}
Format your response as:
1) Summary of all tests performed
2) Abnormal findings across all tests
3) Overall assessment and priority level

Use medical terminology. Be direct, specific, and precise. Consider the \
complete clinical picture from all tests performed on this date. Keep it \
short enough for a doctor to review quickly."
    )
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct RecommendationGenerator {
    generator: Box<dyn TextGenerator + Send + Sync>,
}

impl RecommendationGenerator {
    pub fn new(generator: Box<dyn TextGenerator + Send + Sync>) -> Self {
        Self { generator }
    }

    /// Generate and persist at most one recommendation for the
    /// (patient, test date) pair.
    pub fn generate_for_date(
        &self,
        conn: &Connection,
        hn_number: &str,
        doctor_id: i64,
        test_date: NaiveDate,
    ) -> Result<RecommendOutcome, RecommendError> {
        let rows = get_measurements_for_patient_date(conn, hn_number, test_date)?;
        if rows.is_empty() {
            return Err(RecommendError::NoDataForDate {
                hn_number: hn_number.to_string(),
                test_date,
            });
        }

        if recommendation_exists(conn, hn_number, test_date)? {
            return Ok(RecommendOutcome::AlreadyExists);
        }

        let patient =
            get_patient_by_hn(conn, hn_number)?.ok_or_else(|| RecommendError::NoDataForDate {
                hn_number: hn_number.to_string(),
                test_date,
            })?;

        let prompt = build_recommendation_prompt(&patient.name, &rows);
        let text = self.generator.generate(&prompt)?;

        match insert_recommendation(conn, hn_number, doctor_id, test_date, &text) {
            Ok(recommendation_id) => {
                tracing::info!(
                    hn_number,
                    test_date = %test_date,
                    recommendation_id,
                    "Recommendation stored"
                );
                Ok(RecommendOutcome::Created { recommendation_id })
            }
            // Lost the race against a concurrent generator; the unique
            // constraint already holds a row for this pair.
            Err(err) if err.is_unique_violation() => Ok(RecommendOutcome::AlreadyExists),
            Err(err) => Err(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Mock text generator for testing — returns a configurable response and
/// records every prompt.
pub struct MockTextGenerator {
    response: Result<String, String>,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

impl MockTextGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl TextGenerator for MockTextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, RecommendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(RecommendError::HttpClient(message.clone())),
        }
    }
}
