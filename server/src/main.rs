use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(about = "Authoritative multiplayer grid-game server")]
struct Cli {
    /// JSON config file (falls back to defaults for anything unset).
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON board file; without one, an empty 40x20 board is used.
    #[arg(long)]
    board: Option<PathBuf>,

    /// Overrides `websocket.host` from the config file.
    #[arg(long)]
    host: Option<String>,

    /// Overrides `websocket.port` from the config file.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let cli = Cli::parse();

    let mut config = server::config::ServerConfig::load(cli.config.as_deref()).await?;
    if let Some(host) = cli.host {
        config.websocket.host = host;
    }
    if let Some(port) = cli.port {
        config.websocket.port = port;
    }

    let board = Arc::new(server::load_board(cli.board.as_deref(), config.effective_max_spawn_points()).await?);

    server::run_server(board, config).await
}
