use std::net::SocketAddr;

use academy_backend::{config, db, state::AppState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Config ────────────────────────────────────────────────
    let config = config::Config::from_env()?;
    tracing::info!(env = %config.app_env, development = config.is_development(), "Starting academy backend");

    // ── Database ──────────────────────────────────────────────
    let pool = db::connect(&config).await?;
    db::run_migrations(&pool).await?;

    let app_state = AppState { pool, config };

    // Read address before moving state into the router
    let addr: SocketAddr = format!(
        "{}:{}",
        app_state.config.backend_host,
        app_state.config.backend_port
    )
    .parse()?;

    // ── Router ────────────────────────────────────────────────
    let app = academy_backend::app(app_state);
    tracing::info!(%addr, "Listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
