//! Client transport and reconnect (spec §4.8).
//!
//! The redesign flag "callback-soup on the client" (spec §9) is addressed
//! here by replacing the source's per-event callback surface with a single
//! tagged [`ClientEvent`] stream: callers drive one loop, awaiting
//! [`Client::next_event`] alongside whatever else they cooperate with
//! (reconciliation timer, terminal input) — matching the single-threaded
//! cooperative concurrency model of spec §5.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{ConnectPayload, Message, MessageType, MovePayload, Payload, SetPlayerNamePayload};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientNetError {
    #[error("not connected and reconnection is disabled or exhausted")]
    NotConnected,
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("websocket write failed: {0}")]
    Write(#[source] tokio_tungstenite::tungstenite::Error),
}

/// Reconnect policy (spec §6 `reconnection.*`).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    #[serde(with = "retry_delay_millis")]
    pub retry_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            enabled: true,
            max_attempts: 10,
            retry_delay: Duration::from_millis(500),
        }
    }
}

mod retry_delay_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub player_name: Option<String>,
    pub reconnection: ReconnectConfig,
}

/// The single tagged event stream replacing the source's callback surface.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Initial greeting before a player identity exists.
    Connected { client_id: String },
    Joined {
        player_id: String,
        game_state: protocol::GameStateDto,
        is_reconnection: bool,
    },
    StateUpdate {
        game_state: protocol::GameStateDto,
        tick: u64,
    },
    PlayerJoined(protocol::PlayerJoinedPayload),
    PlayerLeft(protocol::PlayerLeftPayload),
    MoveFailed(protocol::MoveFailReason),
    Error {
        code: String,
        message: String,
    },
    /// The connection dropped and reconnection is disabled, exhausted, or
    /// the caller explicitly disconnected.
    Disconnected,
    Reconnecting {
        attempt: u32,
    },
    Reconnected,
    /// Spec §4.8: the server answered a reconnect request with
    /// `isReconnection=false` despite a `playerId` being supplied — the
    /// server process was restarted and forgot the old identity.
    ServerRestart {
        old_player_id: String,
        new_player_id: String,
    },
}

enum SocketState {
    Open {
        sink: SplitSink<WsStream, WsMessage>,
        stream: SplitStream<WsStream>,
    },
    Reconnecting {
        attempt: u32,
    },
    Closed,
}

pub struct Client {
    config: ClientConfig,
    state: SocketState,
    player_id: Option<String>,
    queued: VecDeque<Message>,
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    let scaled = base.saturating_mul(factor);
    scaled.min(Duration::from_secs(30))
}

impl Client {
    /// Dials the server once. Reconnection after an unexpected close is
    /// handled internally by [`Self::next_event`]; this only performs the
    /// first connection attempt.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientNetError> {
        let (sink, stream) = dial(&config.url).await?;
        Ok(Client {
            config,
            state: SocketState::Open { sink, stream },
            player_id: None,
            queued: VecDeque::new(),
        })
    }

    /// Sends the join/reconnect `CONNECT` request, carrying the last known
    /// `playerId` if this is a reconnect (spec §4.8).
    pub async fn send_join(&mut self) -> Result<(), ClientNetError> {
        let payload = ConnectPayload {
            player_name: self.config.player_name.clone(),
            player_id: self.player_id.clone(),
            ..Default::default()
        };
        self.write(Message::new(MessageType::Connect, Payload::Connect(payload))).await
    }

    pub async fn send_move(&mut self, dx: i8, dy: i8) -> Result<(), ClientNetError> {
        self.write(Message::new(MessageType::Move, Payload::Move(MovePayload { dx, dy })))
            .await
    }

    pub async fn send_restart(&mut self) -> Result<(), ClientNetError> {
        self.write(Message::new(MessageType::Restart, Payload::Empty(Default::default())))
            .await
    }

    pub async fn send_set_player_name(&mut self, name: impl Into<String>) -> Result<(), ClientNetError> {
        self.write(Message::new(
            MessageType::SetPlayerName,
            Payload::SetPlayerName(SetPlayerNamePayload { player_name: name.into() }),
        ))
        .await
    }

    /// User-initiated close: no reconnect attempt follows.
    pub async fn disconnect(&mut self) {
        let _ = self
            .write(Message::new(MessageType::Disconnect, Payload::Empty(Default::default())))
            .await;
        self.state = SocketState::Closed;
    }

    /// Three-mode send (spec §4.8): write through while open, queue while
    /// reconnecting (if armed), fail with `NotConnected` otherwise.
    async fn write(&mut self, message: Message) -> Result<(), ClientNetError> {
        match &mut self.state {
            SocketState::Open { sink, .. } => {
                let bytes = protocol::encode(message, now_millis());
                sink.send(WsMessage::Text(String::from_utf8_lossy(&bytes).into_owned().into()))
                    .await
                    .map_err(ClientNetError::Write)
            }
            SocketState::Reconnecting { .. } if self.config.reconnection.enabled => {
                self.queued.push_back(message);
                Ok(())
            }
            SocketState::Reconnecting { .. } | SocketState::Closed => Err(ClientNetError::NotConnected),
        }
    }

    async fn flush_queued(&mut self) {
        while let Some(message) = self.queued.pop_front() {
            let _ = self.write(message).await;
        }
    }

    /// The core of the event stream. Awaiting this repeatedly in a
    /// `tokio::select!` alongside a reconciliation timer and terminal input
    /// is the whole client main loop (spec §4.9, §5).
    pub async fn next_event(&mut self) -> ClientEvent {
        loop {
            match &mut self.state {
                SocketState::Open { stream, .. } => match stream.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(event) = self.interpret(text.as_bytes()) {
                            return event;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::warn!("connection closed by peer");
                        self.state = SocketState::Reconnecting { attempt: 1 };
                    }
                    Some(Err(error)) => {
                        tracing::warn!(%error, "websocket read error");
                        self.state = SocketState::Reconnecting { attempt: 1 };
                    }
                    Some(Ok(_)) => {} // ping/pong/binary frames carry no protocol meaning here
                },
                SocketState::Reconnecting { attempt } => {
                    if !self.config.reconnection.enabled || *attempt > self.config.reconnection.max_attempts {
                        self.state = SocketState::Closed;
                        return ClientEvent::Disconnected;
                    }
                    let this_attempt = *attempt;
                    let delay = backoff_delay(self.config.reconnection.retry_delay, this_attempt);
                    tokio::time::sleep(delay).await;

                    match dial(&self.config.url).await {
                        Ok((sink, stream)) => {
                            self.state = SocketState::Open { sink, stream };
                            // The server sees this as a brand-new connection sitting in
                            // `awaitingJoin`; the rejoin CONNECT must land before any
                            // queued intent or the server rejects it with NOT_JOINED.
                            let _ = self.send_join().await;
                            self.flush_queued().await;
                            return ClientEvent::Reconnected;
                        }
                        Err(error) => {
                            tracing::warn!(%error, attempt = this_attempt, "reconnect attempt failed");
                            self.state = SocketState::Reconnecting { attempt: this_attempt + 1 };
                            return ClientEvent::Reconnecting { attempt: this_attempt };
                        }
                    }
                }
                SocketState::Closed => return ClientEvent::Disconnected,
            }
        }
    }

    fn interpret(&mut self, bytes: &[u8]) -> Option<ClientEvent> {
        let message = match protocol::parse(bytes) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, "malformed frame from server");
                return None;
            }
        };

        match message.payload {
            Payload::Connect(payload) => {
                if payload.game_state.is_none() {
                    // The initial greeting: {clientId} only, no player yet.
                    return payload.client_id.map(|client_id| ClientEvent::Connected { client_id });
                }
                let player_id = payload.player_id?;
                let game_state = payload.game_state?;
                let is_reconnection = payload.is_reconnection.unwrap_or(false);

                if !is_reconnection {
                    if let Some(old_player_id) = self.player_id.take() {
                        self.player_id = Some(player_id.clone());
                        return Some(ClientEvent::ServerRestart {
                            old_player_id,
                            new_player_id: player_id,
                        });
                    }
                }
                self.player_id = Some(player_id.clone());
                Some(ClientEvent::Joined {
                    player_id,
                    game_state,
                    is_reconnection,
                })
            }
            Payload::StateUpdate(payload) => Some(ClientEvent::StateUpdate {
                game_state: payload.game_state,
                tick: payload.tick,
            }),
            Payload::PlayerJoined(payload) => Some(ClientEvent::PlayerJoined(payload)),
            Payload::PlayerLeft(payload) => Some(ClientEvent::PlayerLeft(payload)),
            Payload::MoveFailed(payload) => Some(ClientEvent::MoveFailed(payload.reason)),
            Payload::Error(payload) => Some(ClientEvent::Error {
                code: payload.code,
                message: payload.message,
            }),
            Payload::Empty(_) => None, // PONG and similar carry no event
            Payload::SetPlayerName(_) => None, // server never sends this back
        }
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }
}

async fn dial(url: &str) -> Result<(SplitSink<WsStream, WsMessage>, SplitStream<WsStream>), ClientNetError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|source| ClientNetError::Connect {
            url: url.to_string(),
            source,
        })?;
    Ok(stream.split())
}

#[cfg(test)]
impl Client {
    /// Builds a `Client` with no live socket, for exercising `interpret`
    /// and the send-mode logic without dialing anything.
    fn for_test(player_id: Option<&str>) -> Self {
        Client {
            config: ClientConfig {
                url: String::new(),
                player_name: None,
                reconnection: ReconnectConfig::default(),
            },
            state: SocketState::Closed,
            player_id: player_id.map(String::from),
            queued: VecDeque::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{BoardDto, GameStateDto};

    fn sample_game_state() -> GameStateDto {
        GameStateDto {
            board: BoardDto { width: 5, height: 5, grid: vec![false; 25] },
            players: vec![],
            entities: vec![],
            score: 0,
        }
    }

    fn connect_bytes(player_id: &str, is_reconnection: bool) -> Vec<u8> {
        protocol::encode(
            Message::new(
                MessageType::Connect,
                Payload::Connect(ConnectPayload {
                    player_id: Some(player_id.to_string()),
                    game_state: Some(sample_game_state()),
                    is_reconnection: Some(is_reconnection),
                    ..Default::default()
                }),
            ),
            0,
        )
    }

    #[test]
    fn backoff_doubles_and_caps_at_thirty_seconds() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 10), Duration::from_secs(30));
    }

    #[test]
    fn a_fresh_join_with_no_prior_identity_is_not_mistaken_for_a_restart() {
        let mut client = Client::for_test(None);
        let event = client.interpret(&connect_bytes("p1", false));
        assert!(matches!(event, Some(ClientEvent::Joined { ref player_id, is_reconnection: false, .. }) if player_id == "p1"));
    }

    #[test]
    fn a_reconnect_reply_that_denies_reconnection_is_a_server_restart() {
        let mut client = Client::for_test(Some("p7"));
        let event = client.interpret(&connect_bytes("p9", false));
        match event {
            Some(ClientEvent::ServerRestart { old_player_id, new_player_id }) => {
                assert_eq!(old_player_id, "p7");
                assert_eq!(new_player_id, "p9");
            }
            other => panic!("expected ServerRestart, got {other:?}"),
        }
        assert_eq!(client.player_id(), Some("p9"));
    }

    #[test]
    fn a_genuine_reconnect_is_reported_as_such() {
        let mut client = Client::for_test(Some("p7"));
        let event = client.interpret(&connect_bytes("p7", true));
        assert!(matches!(event, Some(ClientEvent::Joined { ref player_id, is_reconnection: true, .. }) if player_id == "p7"));
    }
}
