//! Library surface for the game server: every module is exposed so the
//! binary (and integration tests) can drive the pieces directly, without
//! a real socket.

pub mod board_loader;
pub mod config;
pub mod connection;
pub mod dto;
pub mod ids;
pub mod routing;
pub mod state;
pub mod tick;

use board::Board;
use config::ServerConfig;
use state::AppState;
use std::path::Path;
use std::sync::Arc;

/// Builds the app, binds the listener, and serves forever (until the
/// process is killed) — the function-shaped entry point spec §6 asks for,
/// so it can be driven directly from `main` or from a test harness.
pub async fn run_server(board: Arc<Board>, config: ServerConfig) -> anyhow::Result<()> {
    let app_state = AppState::new(board, config.clone());

    let tick_state = app_state.clone();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler = broadcast::TickScheduler::new(std::time::Duration::from_millis(config.broadcast_interval_ms));
    let tick_handle = tokio::spawn(async move {
        scheduler
            .run(move |_tick| tick::on_tick(&tick_state), shutdown_rx)
            .await;
    });

    let router = axum::Router::new()
        .route("/ws", axum::routing::get(connection::websocket_handler))
        .with_state(app_state.clone());

    let addr = format!("{}:{}", config.websocket.host, config.websocket.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router).await?;

    let _ = shutdown_tx.send(());
    let _ = tick_handle.await;
    state::teardown(&app_state);
    Ok(())
}

pub async fn load_board(path: Option<&Path>, max_spawns: usize) -> anyhow::Result<Board> {
    match path {
        Some(path) => board_loader::load_board_file(path, max_spawns)
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        None => Ok(board_loader::empty_board(40, 20)),
    }
}
