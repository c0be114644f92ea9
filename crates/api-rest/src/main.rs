//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the hatch REST API on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `hatch-run` binary runs the same
//! router with graceful shutdown.

use api_rest::{router, AppState, Settings};
use hatch_core::JobServerClient;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the hatch REST API server
///
/// See [`Settings::from_env`] for the environment variables read at startup.
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the settings are incomplete or invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("hatch_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    tracing::info!("-- Starting hatch REST API on {}", settings.addr);
    tracing::info!(
        "-- Workspaces: {}, releases: {}",
        settings.cfg.workspaces_dir().display(),
        settings.cfg.releases_dir().display()
    );

    let job_server = Arc::new(JobServerClient::new(&settings.cfg)?);
    let state = AppState::new(settings.cfg.clone(), job_server, settings.spa_origin.clone());

    let listener = tokio::net::TcpListener::bind(&settings.addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
