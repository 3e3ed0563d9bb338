//! Classification Invoker: runs the external classifier once per test
//! instance and reconciles the returned labels onto the stored
//! measurements.
//!
//! The classifier is an external process: argv carries the panel id and a
//! JSON object of measurement name → value; stdout carries a JSON object
//! of measurement key → `{ "classification": ... }`. Its key convention
//! does not always match the stored canonical names, so reconciliation
//! tries a fixed, ordered list of key normalizations.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::catalog::GENDER_ITEM_NAME;
use crate::db::repository::{
    get_instance_measurements, set_measurement_classification, set_test_status,
};
use crate::db::DatabaseError;
use crate::models::{Gender, TestStatus};
use crate::pipeline::classifier_gate::{ClassifierGate, GateError};

/// Sentinel stored when no response key variant matches a measurement.
pub const UNKNOWN_CLASSIFICATION: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Failed to start classifier process: {0}")]
    Spawn(std::io::Error),

    #[error("Classifier process I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("Classifier exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// One entry of the classifier response. Entries without a
/// `classification` field are treated as non-matches during
/// reconciliation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierEntry {
    #[serde(default)]
    pub classification: Option<String>,
}

pub type ClassifierResponse = HashMap<String, ClassifierEntry>;

/// External classification step, invoked once per test instance
/// (never per measurement).
pub trait Classifier {
    fn classify(
        &self,
        panel_id: i64,
        values: &Map<String, Value>,
    ) -> Result<ClassifierResponse, ClassifyError>;
}

// ---------------------------------------------------------------------------
// Key reconciliation
// ---------------------------------------------------------------------------

/// The ordered key normalizations tried against the classifier response,
/// part of the consumed contract: lowercase-with-underscores, plain
/// lowercase, exact canonical name, whitespace stripped. First variant
/// whose entry carries a classification wins.
pub fn key_variants(name: &str) -> [String; 4] {
    [
        name.to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_"),
        name.to_lowercase(),
        name.to_string(),
        name.split_whitespace().collect(),
    ]
}

/// Resolve one measurement's classification from the response, falling
/// back to the `"unknown"` sentinel rather than leaving it null.
pub fn resolve_classification(name: &str, response: &ClassifierResponse) -> String {
    for key in key_variants(name) {
        if let Some(label) = response.get(&key).and_then(|e| e.classification.clone()) {
            return label;
        }
    }
    UNKNOWN_CLASSIFICATION.to_string()
}

// ---------------------------------------------------------------------------
// Process-backed classifier
// ---------------------------------------------------------------------------

/// Classifier backed by an external process (e.g. the clinic's rule-based
/// Python script). The invocation is time-boxed; a hung process is killed.
pub struct ProcessClassifier {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ProcessClassifier {
    /// `command` is the program plus any leading arguments, whitespace
    /// separated (e.g. `"python3 rba/classifier.py"`).
    pub fn new(command: &str, timeout_secs: u64) -> Self {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            base_args: parts.collect(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Classifier for ProcessClassifier {
    fn classify(
        &self,
        panel_id: i64,
        values: &Map<String, Value>,
    ) -> Result<ClassifierResponse, ClassifyError> {
        let input = serde_json::to_string(values)
            .map_err(|e| ClassifyError::MalformedResponse(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .arg(panel_id.to_string())
            .arg(&input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ClassifyError::Spawn)?;

        // Drain the pipes off-thread so a chatty child can't dead-lock the
        // try_wait polling below.
        let stdout_handle = drain_pipe(child.stdout.take());
        let stderr_handle = drain_pipe(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if started.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ClassifyError::Timeout(self.timeout));
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
            }
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        if !status.success() {
            return Err(ClassifyError::NonZeroExit {
                code: status.code(),
                stderr,
            });
        }

        serde_json::from_str(&stdout)
            .map_err(|e| ClassifyError::MalformedResponse(format!("{e}: {stdout}")))
    }
}

fn drain_pipe<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// Drives classification for committed test instances.
pub struct ClassificationInvoker {
    classifier: Box<dyn Classifier + Send + Sync>,
    gate: Arc<ClassifierGate>,
}

impl ClassificationInvoker {
    pub fn new(classifier: Box<dyn Classifier + Send + Sync>, gate: Arc<ClassifierGate>) -> Self {
        Self { classifier, gate }
    }

    /// Classify one committed test instance: serialize its measurements,
    /// invoke the classifier under the gate, reconcile the returned keys,
    /// and mark the instance completed. Demographic measurements go into
    /// the input (re-expressed as M/F) but never receive a label.
    ///
    /// Returns the number of measurements that received a label.
    pub fn classify_instance(
        &self,
        conn: &Connection,
        test_instance_id: i64,
        panel_id: i64,
    ) -> Result<usize, ClassifyError> {
        let measurements = get_instance_measurements(conn, test_instance_id)?;

        let mut input = Map::new();
        for m in &measurements {
            let value = if m.name == GENDER_ITEM_NAME {
                Value::String(Gender::from_code(m.value).classifier_label().to_string())
            } else {
                serde_json::Number::from_f64(m.value)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            };
            input.insert(m.name.clone(), value);
        }

        let response = {
            let _guard = self.gate.acquire(panel_id, test_instance_id)?;
            self.classifier.classify(panel_id, &input)?
        };

        let mut labeled = 0;
        for m in &measurements {
            if m.name == GENDER_ITEM_NAME {
                continue;
            }
            let label = resolve_classification(&m.name, &response);
            set_measurement_classification(conn, test_instance_id, m.item_id, &label)?;
            labeled += 1;
        }

        set_test_status(conn, test_instance_id, TestStatus::Completed)?;

        tracing::info!(
            test_instance_id,
            panel_id,
            labeled,
            "Test instance classified"
        );
        Ok(labeled)
    }
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Mock classifier for testing — returns a configurable response and
/// records every invocation.
pub struct MockClassifier {
    response: Result<ClassifierResponse, String>,
    pub invocations: std::sync::Mutex<Vec<(i64, Map<String, Value>)>>,
}

impl MockClassifier {
    pub fn with_response(response: ClassifierResponse) -> Self {
        Self {
            response: Ok(response),
            invocations: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            invocations: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Classifier for MockClassifier {
    fn classify(
        &self,
        panel_id: i64,
        values: &Map<String, Value>,
    ) -> Result<ClassifierResponse, ClassifyError> {
        self.invocations
            .lock()
            .unwrap()
            .push((panel_id, values.clone()));
        match &self.response {
            Ok(response) => Ok(response.clone()),
            Err(message) => Err(ClassifyError::NonZeroExit {
                code: Some(1),
                stderr: message.clone(),
            }),
        }
    }
}
