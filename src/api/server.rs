//! Server bootstrap: run migrations, load the panel catalog, build the
//! production pipeline and serve the router.

use std::sync::Arc;

use crate::api::router::build_router;
use crate::api::types::ApiContext;
use crate::catalog::PanelCatalog;
use crate::config::Config;
use crate::db::sqlite::open_database;
use crate::db::DatabaseError;
use crate::pipeline::processor::build_processor;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Startup task failed: {0}")]
    Startup(String),
}

pub async fn serve(config: Config) -> Result<(), ServerError> {
    // Database open (migrations), catalog load and client construction
    // are all blocking; keep them off the async runtime.
    let startup_config = config.clone();
    let ctx = tokio::task::spawn_blocking(move || -> Result<ApiContext, ServerError> {
        let conn = open_database(&startup_config.db_path)?;
        let catalog = Arc::new(PanelCatalog::load(&conn)?);
        let processor = Arc::new(build_processor(&startup_config));
        Ok(ApiContext {
            db_path: startup_config.db_path,
            catalog,
            processor,
        })
    })
    .await
    .map_err(|e| ServerError::Startup(e.to_string()))??;

    let router = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "labflow listening");
    axum::serve(listener, router).await?;
    Ok(())
}
