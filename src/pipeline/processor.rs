//! Upload processing orchestrator.
//!
//! Single entry point that drives the full pipeline for one uploaded
//! file: group rows → ingest each batch in its own transaction →
//! classify each committed instance → generate at most one
//! recommendation per (patient, test date).
//!
//! Uses trait-based DI for both external services so the orchestrator
//! remains fully testable with mock implementations.

use std::io::Read;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::catalog::PanelCatalog;
use crate::pipeline::classify::ClassificationInvoker;
use crate::pipeline::grouper::{group_rows, GroupError};
use crate::pipeline::ingest::{ingest_batch, BatchOutcome};
use crate::pipeline::recommend::{RecommendError, RecommendOutcome, RecommendationGenerator};

/// Counts returned to the uploader after processing a file.
#[derive(Debug, Default, Clone, Serialize)]
pub struct UploadSummary {
    pub batches_processed: usize,
    pub batches_skipped: usize,
    pub batches_failed: usize,
    pub test_instances_created: usize,
    pub measurements_recorded: usize,
    pub assignments_created: usize,
    pub assignments_existing: usize,
    pub instances_classified: usize,
    pub classification_failures: usize,
    pub recommendations_created: usize,
    pub recommendations_existing: usize,
    pub recommendation_failures: usize,
}

/// Structured result of one upload: counts plus every per-row and
/// per-batch warning. Partial success never fails the upload.
#[derive(Debug, Serialize)]
pub struct UploadReport {
    pub summary: UploadSummary,
    pub warnings: Vec<String>,
}

impl UploadReport {
    /// True when not a single batch made it past validation, the
    /// all-rows-invalid case the API maps to a 400.
    pub fn processed_nothing(&self) -> bool {
        let s = &self.summary;
        s.batches_processed + s.batches_skipped + s.batches_failed == 0
    }
}

pub struct UploadProcessor {
    invoker: ClassificationInvoker,
    recommender: RecommendationGenerator,
}

impl UploadProcessor {
    pub fn new(invoker: ClassificationInvoker, recommender: RecommendationGenerator) -> Self {
        Self {
            invoker,
            recommender,
        }
    }

    /// Process one uploaded file end to end.
    ///
    /// Returns `GroupError` only for whole-file problems (zero data rows,
    /// missing fixed columns, unreadable CSV); everything downstream is
    /// recovered per batch / per instance and reported in the summary.
    pub fn process_upload<R: Read>(
        &self,
        conn: &mut Connection,
        catalog: &PanelCatalog,
        reader: R,
        uploaded_by: i64,
    ) -> Result<UploadReport, GroupError> {
        let grouped = group_rows(reader, catalog)?;

        let mut summary = UploadSummary::default();
        let mut warnings: Vec<String> = grouped
            .warnings
            .iter()
            .map(|w| format!("row {}: {}", w.row, w.message))
            .collect();

        // One recommendation attempt per distinct (patient, date); the
        // first batch's doctor is the one recorded on the recommendation.
        let mut recommendation_keys: Vec<(String, NaiveDate, i64)> = Vec::new();

        for batch in &grouped.batches {
            match ingest_batch(conn, catalog, batch, uploaded_by) {
                Ok(BatchOutcome::Ingested(ingested)) => {
                    summary.batches_processed += 1;
                    summary.test_instances_created += ingested.instances.len();
                    summary.measurements_recorded += ingested
                        .instances
                        .iter()
                        .map(|i| i.measurement_count)
                        .sum::<usize>();
                    if ingested.assignment_created {
                        summary.assignments_created += 1;
                    } else {
                        summary.assignments_existing += 1;
                    }

                    // Classification runs strictly after the batch commit;
                    // one instance's failure never touches its siblings.
                    for instance in &ingested.instances {
                        match self.invoker.classify_instance(
                            conn,
                            instance.test_instance_id,
                            instance.panel_id,
                        ) {
                            Ok(_) => summary.instances_classified += 1,
                            Err(err) => {
                                tracing::warn!(
                                    test_instance_id = instance.test_instance_id,
                                    panel_id = instance.panel_id,
                                    error = %err,
                                    "Classification failed; measurements stay unclassified"
                                );
                                summary.classification_failures += 1;
                            }
                        }
                    }

                    let key_exists = recommendation_keys
                        .iter()
                        .any(|(hn, date, _)| hn == &ingested.hn_number && *date == ingested.test_date);
                    if !ingested.instances.is_empty() && !key_exists {
                        recommendation_keys.push((
                            ingested.hn_number.clone(),
                            ingested.test_date,
                            ingested.doctor_id,
                        ));
                    }
                }
                Ok(BatchOutcome::Skipped { reason }) => {
                    tracing::warn!(
                        hn_number = %batch.hn_number,
                        test_date = %batch.test_date,
                        reason,
                        "Batch skipped"
                    );
                    summary.batches_skipped += 1;
                    warnings.push(format!(
                        "batch {} / {}: {}",
                        batch.hn_number, batch.test_date, reason
                    ));
                }
                Err(err) => {
                    tracing::error!(
                        hn_number = %batch.hn_number,
                        test_date = %batch.test_date,
                        error = %err,
                        "Batch failed and was rolled back"
                    );
                    summary.batches_failed += 1;
                    warnings.push(format!(
                        "batch {} / {}: failed and rolled back",
                        batch.hn_number, batch.test_date
                    ));
                }
            }
        }

        // Best-effort post-processing after all ingestion and
        // classification attempts; never unwinds into the upload result.
        for (hn_number, test_date, doctor_id) in recommendation_keys {
            match self
                .recommender
                .generate_for_date(conn, &hn_number, doctor_id, test_date)
            {
                Ok(RecommendOutcome::Created { .. }) => summary.recommendations_created += 1,
                Ok(RecommendOutcome::AlreadyExists) => {
                    tracing::info!(
                        hn_number = %hn_number,
                        test_date = %test_date,
                        "Recommendation already exists for this date"
                    );
                    summary.recommendations_existing += 1;
                }
                Err(RecommendError::NoDataForDate { .. }) => {
                    // Expected when nothing landed for the date; skip silently
                    tracing::debug!(
                        hn_number = %hn_number,
                        test_date = %test_date,
                        "No measurements for date; recommendation skipped"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        hn_number = %hn_number,
                        test_date = %test_date,
                        error = %err,
                        "Recommendation generation failed"
                    );
                    summary.recommendation_failures += 1;
                }
            }
        }

        Ok(UploadReport { summary, warnings })
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build an `UploadProcessor` with production implementations:
/// the external classifier process behind the shared gate, and the HTTP
/// text-generation service.
pub fn build_processor(config: &crate::config::Config) -> UploadProcessor {
    use std::sync::Arc;

    use crate::pipeline::classifier_gate::ClassifierGate;
    use crate::pipeline::classify::ProcessClassifier;
    use crate::pipeline::recommend::HttpTextGenerator;

    let classifier = ProcessClassifier::new(
        &config.classifier_command,
        config.classifier_timeout_secs,
    );
    let generator = HttpTextGenerator::new(
        &config.generate_url,
        &config.generate_model,
        config.generate_timeout_secs,
    );
    tracing::info!(
        classifier = %config.classifier_command,
        generate_url = %config.generate_url,
        model = %config.generate_model,
        "Upload processor built"
    );

    UploadProcessor::new(
        ClassificationInvoker::new(Box::new(classifier), Arc::new(ClassifierGate::new())),
        RecommendationGenerator::new(Box::new(generator)),
    )
}
