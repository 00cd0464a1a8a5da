use std::sync::Arc;

use compressor_report::config::Config;
use compressor_report::repositories::PgReportSource;
use compressor_report::services::ReportService;
use compressor_report::{api, db};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Starting compressor-report");

    let cfg_path = std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!(
        timezone_offset_hours = cfg.engine.timezone_offset_hours,
        fallback_rate = ?cfg.engine.fallback_rate_usd_per_kwh,
        "Configuration loaded"
    );

    let pool = db::connect(&cfg.database.url, cfg.database.max_connections).await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!("Connected to database");

    let source = Arc::new(PgReportSource::new(pool));
    let reports = Arc::new(ReportService::new(source, cfg.engine.clone()));
    let router = api::create_router(reports);
    let addr = cfg.api_bind_address();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!("API server listening on {}", addr);

    let serve = axum::serve(listener, router);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    };

    if let Err(e) = serve.with_graceful_shutdown(shutdown).await {
        tracing::error!(error = %e, "API server error");
    }

    info!("Application shutdown complete");
    Ok(())
}
