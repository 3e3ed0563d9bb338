//! Recommendation review endpoints: list, detail, and the
//! pending → sent → approved status transitions.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::catalog::GENDER_ITEM_NAME;
use crate::db::repository::{
    get_measurements_for_patient_date, get_patient_by_hn, get_recommendation,
    list_recommendations, update_recommendation_status, RecommendationListEntry,
};
use crate::models::{Gender, RecommendationStatus};

#[derive(Serialize)]
pub struct RecommendationList {
    pub data: Vec<RecommendationListEntry>,
}

/// `GET /recommendations`
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<RecommendationList>, ApiError> {
    let conn = ctx.open_db()?;
    let data = list_recommendations(&conn)?;
    Ok(Json(RecommendationList { data }))
}

#[derive(Serialize)]
pub struct RecommendationDetail {
    pub recommendation_id: i64,
    pub hn_number: String,
    pub patient_name: String,
    pub test_date: String,
    pub status: String,
    pub generated_text: String,
    pub results: Vec<ResultLine>,
}

#[derive(Serialize)]
pub struct ResultLine {
    pub panel_name: String,
    pub item_name: String,
    pub value: String,
    pub unit: Option<String>,
    pub classification: Option<String>,
}

/// `GET /recommendations/:id`: the recommendation plus every measurement
/// recorded for that patient on that date.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<RecommendationDetail>, ApiError> {
    let conn = ctx.open_db()?;
    let rec = get_recommendation(&conn, id)?
        .ok_or_else(|| ApiError::NotFound("Recommendation not found".into()))?;
    let patient = get_patient_by_hn(&conn, &rec.hn_number)?
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;

    let results = get_measurements_for_patient_date(&conn, &rec.hn_number, rec.test_date)?
        .into_iter()
        .map(|m| {
            let value = if m.item_name == GENDER_ITEM_NAME {
                Gender::from_code(m.value).display_label().to_string()
            } else {
                m.value.to_string()
            };
            ResultLine {
                panel_name: m.panel_name,
                item_name: m.item_name,
                value,
                unit: m.unit,
                classification: m.classification,
            }
        })
        .collect();

    Ok(Json(RecommendationDetail {
        recommendation_id: rec.id,
        hn_number: rec.hn_number,
        patient_name: patient.name,
        test_date: rec.test_date.to_string(),
        status: rec.status.as_str().to_string(),
        generated_text: rec.generated_text,
        results,
    }))
}

#[derive(Serialize)]
pub struct StatusUpdateResponse {
    pub message: String,
    pub recommendation_id: i64,
    pub status: String,
}

/// `POST /recommendations/:id/send`
pub async fn send(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<StatusUpdateResponse>, ApiError> {
    transition(ctx, id, RecommendationStatus::Sent).await
}

/// `POST /recommendations/:id/approve`
pub async fn approve(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<StatusUpdateResponse>, ApiError> {
    transition(ctx, id, RecommendationStatus::Approved).await
}

async fn transition(
    ctx: ApiContext,
    id: i64,
    status: RecommendationStatus,
) -> Result<Json<StatusUpdateResponse>, ApiError> {
    let conn = ctx.open_db()?;
    if !update_recommendation_status(&conn, id, status)? {
        return Err(ApiError::NotFound("Recommendation not found".into()));
    }
    Ok(Json(StatusUpdateResponse {
        message: format!("Recommendation {} successfully", status.as_str()),
        recommendation_id: id,
        status: status.as_str().to_string(),
    }))
}
