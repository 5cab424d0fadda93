mod api;
mod config;
mod consumption;
mod slots;
mod store;
mod time;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use api::{build_router, ApiSecurity, AppState};
use config::BrainConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = BrainConfig::load();
    info!(?config, "starting chaos brain");

    let (state, promoted_tx) = AppState::new(config.clone());
    slots::spawn_dispatcher(
        state.store.clone(),
        state.slots.clone(),
        promoted_tx,
        config.tick_interval_secs,
    );

    let security = ApiSecurity::from_env();
    let app = build_router(state, security);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
