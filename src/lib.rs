pub mod adapters;
mod app;
pub mod auth;
pub mod config;
pub mod ports;
pub mod reaper;
pub mod state;
pub mod store;

pub use app::app;

use std::sync::Arc;

/// Run the HTTP service until ctrl-c, with the session reaper alongside it.
pub async fn serve(config: config::AppConfig) -> std::io::Result<()> {
    let addr = config.bind;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let state = state::AppState::new(config);
    let reaper = reaper::Reaper::new(
        adapters::SystemClock,
        Arc::clone(&state.store),
        state.config.sweep_interval,
        state.config.session_max_age,
    )
    .spawn();

    let result = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    reaper.stop();
    result
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
