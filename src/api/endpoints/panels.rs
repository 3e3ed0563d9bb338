//! Panel Catalog reads, served from the in-memory catalog.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{MeasurementItem, Panel};

#[derive(Serialize)]
pub struct PanelList {
    pub panels: Vec<Panel>,
}

/// `GET /panels`
pub async fn list(State(ctx): State<ApiContext>) -> Json<PanelList> {
    let mut panels: Vec<Panel> = ctx
        .catalog
        .panels_iter()
        .map(|entry| entry.panel.clone())
        .collect();
    panels.sort_by_key(|p| p.id);
    Json(PanelList { panels })
}

#[derive(Serialize)]
pub struct PanelItems {
    pub panel: Panel,
    pub items: Vec<MeasurementItem>,
}

/// `GET /panels/:id/items`: required measurement items for one panel.
pub async fn items(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<PanelItems>, ApiError> {
    let entry = ctx
        .catalog
        .panel(id)
        .ok_or_else(|| ApiError::NotFound(format!("No panel with id {id}")))?;
    Ok(Json(PanelItems {
        panel: entry.panel.clone(),
        items: entry.items.clone(),
    }))
}
