mod prediction;

use clap::Parser;
use client_net::{Client, ClientConfig, ClientEvent};
use client_render::{CrosstermSurface, RenderDriver};
use crossterm::event::{Event, EventStream, KeyCode};
use futures_util::StreamExt;
use prediction::Prediction;
use protocol::PlayerDto;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(about = "Terminal client for the authoritative grid-game server")]
struct Cli {
    /// Server websocket URL, e.g. ws://127.0.0.1:8080/ws
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Display name offered on join.
    #[arg(long)]
    name: Option<String>,

    /// JSON config file for `reconnection.*` / `prediction.*`.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PredictionConfig {
    enabled: bool,
    reconciliation_interval: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        PredictionConfig { enabled: true, reconciliation_interval: 5000 }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatusBarConfig {
    threshold: u32,
}

impl Default for StatusBarConfig {
    fn default() -> Self {
        StatusBarConfig {
            threshold: client_render::DEFAULT_STATUS_BAR_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FileConfig {
    reconnection: client_net::ReconnectConfig,
    prediction: PredictionConfig,
    status_bar: StatusBarConfig,
}

impl FileConfig {
    async fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(FileConfig::default());
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))
    }
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
                .with_thread_names(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let file_config = FileConfig::load(cli.config.as_deref()).await?;

    let client_config = ClientConfig {
        url: cli.url,
        player_name: cli.name,
        reconnection: file_config.reconnection,
    };

    let mut net = Client::connect(client_config).await?;
    net.send_join().await?;

    crossterm::terminal::enable_raw_mode()?;
    let result = run(&mut net, &file_config.prediction, &file_config.status_bar).await;
    crossterm::terminal::disable_raw_mode()?;
    result
}

async fn run(net: &mut Client, prediction_config: &PredictionConfig, status_bar_config: &StatusBarConfig) -> anyhow::Result<()> {
    let mut prediction = Prediction::new(prediction_config.enabled);
    let mut driver: Option<RenderDriver<CrosstermSurface<std::io::Stdout>>> = None;
    let mut self_name = String::new();
    let mut latest_players: Vec<PlayerDto> = Vec::new();

    let mut input = EventStream::new();
    let mut reconcile_timer = tokio::time::interval(Duration::from_millis(prediction_config.reconciliation_interval));
    reconcile_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = net.next_event() => {
                match event {
                    ClientEvent::Connected { client_id } => {
                        tracing::info!(%client_id, "connected");
                    }
                    ClientEvent::Joined { player_id, game_state, is_reconnection } => {
                        tracing::info!(%player_id, is_reconnection, "joined");
                        latest_players = game_state.players.clone();
                        if let Some(me) = latest_players.iter().find(|p| p.player_id == player_id) {
                            self_name = me.player_name.clone();
                            prediction.set_board(game_state.board.clone());
                            prediction.bind(player_id, (me.x, me.y));
                        }
                        if driver.is_none() {
                            let surface = CrosstermSurface::new(std::io::stdout(), game_state.board.height as u16)
                                .with_status_bar_threshold(status_bar_config.threshold);
                            driver = Some(RenderDriver::new(surface));
                        }
                        driver.as_mut().unwrap().on_snapshot(game_state);
                    }
                    ClientEvent::StateUpdate { game_state, tick } => {
                        tracing::trace!(tick, "state update");
                        latest_players = game_state.players.clone();
                        if let Some(driver) = driver.as_mut() {
                            driver.on_snapshot(game_state);
                        }
                    }
                    ClientEvent::PlayerJoined(payload) => {
                        tracing::info!(player_id = %payload.player_id, "a player joined");
                    }
                    ClientEvent::PlayerLeft(payload) => {
                        tracing::info!(player_id = %payload.player_id, "a player left");
                    }
                    ClientEvent::MoveFailed(reason) => {
                        tracing::warn!(?reason, "move rejected");
                        // The server is authoritative; the next STATE_UPDATE or
                        // reconciliation tick will snap prediction back in line.
                    }
                    ClientEvent::Error { code, message } => {
                        tracing::warn!(%code, %message, "protocol error");
                    }
                    ClientEvent::Disconnected => {
                        tracing::error!("disconnected, giving up");
                        return Ok(());
                    }
                    ClientEvent::Reconnecting { attempt } => {
                        tracing::warn!(attempt, "reconnecting");
                    }
                    ClientEvent::Reconnected => {
                        tracing::info!("reconnected");
                    }
                    ClientEvent::ServerRestart { old_player_id, new_player_id } => {
                        tracing::warn!(%old_player_id, %new_player_id, "server restarted, forgetting prediction");
                        prediction.reset();
                    }
                }
            }

            _ = reconcile_timer.tick() => {
                let previous = prediction.predicted_position();
                if let Some(server_position) = prediction.reconcile(&latest_players) {
                    if let (Some(driver), Some(previous)) = (driver.as_mut(), previous) {
                        driver.move_player(&self_name, previous, server_position);
                    }
                }
            }

            input_event = input.next() => {
                match input_event {
                    Some(Ok(Event::Key(key))) => match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            net.disconnect().await;
                            return Ok(());
                        }
                        KeyCode::Up | KeyCode::Char('w') => handle_move(net, &mut prediction, driver.as_mut(), &self_name, 0, -1).await,
                        KeyCode::Down | KeyCode::Char('s') => handle_move(net, &mut prediction, driver.as_mut(), &self_name, 0, 1).await,
                        KeyCode::Left | KeyCode::Char('a') => handle_move(net, &mut prediction, driver.as_mut(), &self_name, -1, 0).await,
                        KeyCode::Right | KeyCode::Char('d') => handle_move(net, &mut prediction, driver.as_mut(), &self_name, 1, 0).await,
                        _ => {}
                    },
                    Some(Ok(_)) => {}
                    Some(Err(error)) => tracing::warn!(%error, "terminal input error"),
                    None => {
                        tracing::info!("input stream closed");
                        net.disconnect().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn handle_move(
    net: &mut Client,
    prediction: &mut Prediction,
    driver: Option<&mut RenderDriver<CrosstermSurface<std::io::Stdout>>>,
    self_name: &str,
    dx: i8,
    dy: i8,
) {
    let before = prediction.predicted_position();
    if let Some(after) = prediction.try_move(dx, dy) {
        if let (Some(driver), Some(before)) = (driver, before) {
            driver.move_player(self_name, before, after);
        }
    }
    if let Err(error) = net.send_move(dx, dy).await {
        tracing::warn!(%error, "failed to send move");
    }
}
