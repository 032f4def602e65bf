/**
 * TRAFFICDASH CONSOLE - Point d'entrée
 *
 * RÔLE : Orchestration : config, pollers backend, alertes, HTTP, health.
 * Bootstrap complet avec logging tracing et arrêt propre sur Ctrl-C.
 *
 * ARCHITECTURE : 3 pollers (stats / signal / streetlight) -> vues -> AppState -> API Axum.
 */

use anyhow::Context;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trafficdash_console::config::load_config;
use trafficdash_console::{http, Console};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env optionnel (TRAFFICDASH_CONFIG, TRAFFICDASH_API_KEY, RUST_LOG)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trafficdash_console=info")),
        )
        .init();

    let cfg = load_config().await;
    if cfg.api_key.is_none() {
        info!("no api_key configured: streetlight and demo commands are disabled");
    }
    let bind = cfg.http.bind.clone();

    let console = Console::start(cfg)?;
    let state = console.state();
    let health_logger = state.health.spawn_health_logger(Duration::from_secs(60));

    let app = http::build_router(state);
    let listener = TcpListener::bind(&bind).await.with_context(|| format!("binding {bind}"))?;
    info!("listening on http://{bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("HTTP server failed")?;

    health_logger.abort();
    console.shutdown().await;
    info!("console stopped");
    Ok(())
}
