pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Initialize tracing, read configuration and start the HTTP server.
pub async fn run() -> Result<(), api::server::ServerError> {
    // Best-effort .env loading before reading configuration
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("labflow starting v{}", config::APP_VERSION);

    let config = config::Config::from_env();
    api::server::serve(config).await
}
