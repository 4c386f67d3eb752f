// shiptrack - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use shiptrack::api::{router, AppState};
use shiptrack::{logging, Config, Database, TokenSigner};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init_logging(config.log_json);

    tracing::info!(version = shiptrack::VERSION, "🌐 shiptrack web server starting");

    if config.ephemeral_secret {
        tracing::warn!("SHIPTRACK_SECRET not set; tokens will not survive a restart");
    }

    // Schema only; sample data comes from `shiptrack init`
    let db = Database::new(&config.db_path);
    db.init()
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    tracing::info!(path = %db.path().display(), "database ready");

    let state = AppState::new(db, TokenSigner::new(&config.secret));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(addr = %config.bind, "🚀 server listening (routes also under /api)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
