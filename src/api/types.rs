use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;

use crate::api::error::ApiError;
use crate::catalog::PanelCatalog;
use crate::db::sqlite::open_database;
use crate::pipeline::processor::UploadProcessor;

/// Shared state for all handlers. Connections are opened per request;
/// the catalog and processor are built once at startup.
#[derive(Clone)]
pub struct ApiContext {
    pub db_path: PathBuf,
    pub catalog: Arc<PanelCatalog>,
    pub processor: Arc<UploadProcessor>,
}

impl ApiContext {
    pub fn open_db(&self) -> Result<Connection, ApiError> {
        open_database(&self.db_path).map_err(|e| ApiError::Internal(e.to_string()))
    }
}
