//! Recent test instances for a doctor's assigned patients.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::{recent_tests_for_doctor, RecentTest};

#[derive(Deserialize)]
pub struct RecentTestsQuery {
    pub doctor_id: i64,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct RecentTestsResponse {
    pub doctor_id: i64,
    pub tests: Vec<RecentTest>,
}

/// `GET /recent-tests?doctor_id=N&limit=K`
pub async fn recent(
    State(ctx): State<ApiContext>,
    Query(query): Query<RecentTestsQuery>,
) -> Result<Json<RecentTestsResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let limit = query.limit.unwrap_or(20).min(100);
    let tests = recent_tests_for_doctor(&conn, query.doctor_id, limit)?;
    Ok(Json(RecentTestsResponse {
        doctor_id: query.doctor_id,
        tests,
    }))
}
