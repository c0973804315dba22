//! Judge Server - Main Entry Point
//!
//! Bootstraps storage and the service context, then reports readiness.

use anyhow::Result;
use tracing::{info, warn};

use judge_server::{config::Config, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "judge_server=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        identity = %config.service_identity,
        "Starting Judge Server"
    );

    // Open storage and run migrations
    let state = AppState::new(config).await?;

    let missing = state.registry().missing();
    if !missing.is_empty() {
        warn!(
            ?missing,
            "Permissions without a configured bit; checks against them will fail"
        );
    }

    info!(
        editable_fields = state.config.editable_fields.len(),
        accepted_languages = ?state.config.accepted_languages,
        registration_limit = state.limiter.config().enabled,
        "Judge Server ready"
    );

    Ok(())
}
