//! Bulk lab-result upload endpoint.
//!
//! `POST /bulk/upload-lab-results`: multipart `file` field plus an
//! `X-Uploader-Id` header naming the authenticated identity (resolved by
//! the auth layer in front of this service). Partial success never fails
//! the request; the response always carries counts and itemized warnings.

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::grouper::GroupError;
use crate::pipeline::processor::{UploadReport, UploadSummary};

const UPLOADER_HEADER: &str = "x-uploader-id";

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub summary: UploadSummary,
    pub warnings: Vec<String>,
}

/// `POST /bulk/upload-lab-results`
pub async fn upload_lab_results(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let uploaded_by = uploader_id(&headers)?;
    let file = read_file_field(&mut multipart).await?;

    // The pipeline blocks on the database and on external processes; keep
    // it off the async runtime.
    let report = tokio::task::spawn_blocking(move || -> Result<UploadReport, ApiError> {
        let mut conn = ctx.open_db()?;
        ctx.processor
            .process_upload(&mut conn, &ctx.catalog, file.as_slice(), uploaded_by)
            .map_err(|err| match err {
                GroupError::NoData => ApiError::BadRequest("No data found in CSV".into()),
                GroupError::MissingColumns(cols) => {
                    ApiError::BadRequest(format!("Missing required columns: {cols}"))
                }
                GroupError::Csv(e) => ApiError::BadRequest(format!("Unreadable CSV: {e}")),
            })
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    if report.processed_nothing() && !report.warnings.is_empty() {
        return Err(ApiError::ValidationFailed {
            errors: report.warnings,
        });
    }

    Ok(Json(UploadResponse {
        message: "Lab results uploaded and processed successfully.".into(),
        summary: report.summary,
        warnings: report.warnings,
    }))
}

fn uploader_id(headers: &HeaderMap) -> Result<i64, ApiError> {
    headers
        .get(UPLOADER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            ApiError::BadRequest(format!("{UPLOADER_HEADER} header is required"))
        })
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
            if bytes.is_empty() {
                return Err(ApiError::BadRequest("CSV file is required.".into()));
            }
            return Ok(bytes.to_vec());
        }
    }
    Err(ApiError::BadRequest("CSV file is required.".into()))
}
