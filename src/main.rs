use api_rest::{router, AppState, Settings};
use hatch_core::JobServerClient;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the hatch release service
///
/// Serves the REST API until interrupted, then lets in-flight requests (including running
/// uploads) finish before exiting.
///
/// # Environment Variables
/// - `HATCH_WORKSPACES_DIR`, `HATCH_RELEASES_DIR`: data directories (required)
/// - `JOB_SERVER_ENDPOINT`, `JOB_SERVER_TOKEN`: job-server URL and shared secret (required)
/// - `HATCH_REST_ADDR`: REST server address (default: "0.0.0.0:8001")
/// - `HATCH_SPA_ORIGIN`: origin of the release SPA
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hatch_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("hatch_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    tracing::info!("++ Starting hatch REST on {}", settings.addr);

    let job_server = Arc::new(JobServerClient::new(&settings.cfg)?);
    let state = AppState::new(settings.cfg.clone(), job_server, settings.spa_origin.clone());

    let listener = tokio::net::TcpListener::bind(&settings.addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("++ hatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("++ Shutdown requested");
}
