//! Server protocol state machine (spec §4.7): routes an inbound message by
//! the sender's connection phase, enforcing the per-state table. Malformed
//! frames never reach here — the wire codec already rejected them.

use crate::dto::snapshot_to_dto;
use crate::ids::{client_id_to_wire, parse_player_id, player_id_to_wire};
use crate::state::AppState;
use protocol::{
    ConnectPayload, ErrorPayload, Message, MessageType, MovePayload, Payload, PlayerJoinedPayload,
    PlayerLeftPayload, SetPlayerNamePayload,
};
use session::{ClientId, ConnectionPhase};
use std::sync::Arc;

/// Effects the connection handler must carry out after routing a message:
/// replies addressed to the sender, notifications fanned out to every
/// other joined connection, and whether the connection should now close.
#[derive(Debug, Default)]
pub struct RoutingEffects {
    pub to_sender: Vec<Message>,
    pub to_others: Vec<Message>,
    pub close: bool,
}

impl RoutingEffects {
    fn reply(message: Message) -> Self {
        RoutingEffects {
            to_sender: vec![message],
            ..Default::default()
        }
    }

    fn error(code: &str, text: impl Into<String>) -> Self {
        Self::reply(Message::new(
            MessageType::Error,
            Payload::Error(ErrorPayload {
                code: code.to_string(),
                message: text.into(),
                context: None,
            }),
        ))
    }
}

/// A malformed frame never transitions connection state (spec §4.7): it
/// just produces an `ERROR` reply.
pub fn protocol_error(error: protocol::ProtocolError) -> RoutingEffects {
    RoutingEffects::error("MALFORMED_FRAME", error.to_string())
}

/// Routes one parsed, validated message for `client_id` and applies any
/// resulting world-state mutation under the single game lock.
pub fn handle_inbound(app: &Arc<AppState>, client_id: ClientId, message: Message) -> RoutingEffects {
    match message.msg_type {
        MessageType::Connect => handle_connect(app, client_id, message),
        MessageType::Move => handle_move(app, client_id, message),
        MessageType::Restart => handle_restart(app, client_id),
        MessageType::Disconnect => disconnect_client(app, client_id),
        MessageType::Ping => RoutingEffects::reply(Message::new(MessageType::Pong, Payload::Empty(Default::default()))),
        MessageType::SetPlayerName => handle_set_player_name(app, client_id, message),
        // Every other wire type is server-originated; a client sending one
        // is routed as the table's "other" column.
        _ => handle_other(app, client_id),
    }
}

fn handle_connect(app: &Arc<AppState>, client_id: ClientId, message: Message) -> RoutingEffects {
    let mut state = app.state.lock().unwrap();
    let Some(phase) = state.session.phase(client_id) else {
        return RoutingEffects::error("UNEXPECTED", "unknown connection");
    };

    match phase {
        ConnectionPhase::Waiting => RoutingEffects::default(), // ignore duplicate join requests
        ConnectionPhase::Joined => RoutingEffects::error("ALREADY_JOINED", "already joined"),
        ConnectionPhase::AwaitingJoin => {
            let Payload::Connect(payload) = &message.payload else {
                return RoutingEffects::error("UNEXPECTED", "malformed connect payload");
            };
            let requested = payload.player_id.as_deref().and_then(parse_player_id);
            let tick = state.game.tick();

            let outcome = match state.session.begin_join(client_id, requested, tick) {
                Ok(outcome) => outcome,
                Err(e) => return RoutingEffects::error("UNEXPECTED", e.to_string()),
            };

            if outcome.is_reconnection {
                let position = outcome.restored_position.expect("reconnection always carries a position");
                let name = outcome.restored_name.unwrap_or_default();
                state.game.place_player(outcome.player_id, name.clone(), position);
                tracing::info!(%client_id, player_id = %outcome.player_id, "player reconnected within grace");
                join_response(&mut state, client_id, outcome.player_id, true)
            } else {
                let name = payload
                    .player_name
                    .clone()
                    .unwrap_or_else(|| format!("Player {}", outcome.player_id.0));
                match state.game.allocate_spawn() {
                    Some(position) => {
                        state.game.place_player(outcome.player_id, name, position);
                        let (_player_id, _pending_name) = state
                            .session
                            .mark_joined(client_id)
                            .expect("connection was just bound to this player");
                        tracing::info!(%client_id, player_id = %outcome.player_id, "player joined");
                        join_response(&mut state, client_id, outcome.player_id, false)
                    }
                    None => {
                        state
                            .session
                            .enqueue_waiting(client_id, name)
                            .expect("connection was just bound to this player");
                        tracing::info!(%client_id, player_id = %outcome.player_id, "no spawn available, queued");
                        RoutingEffects::reply(Message::new(
                            MessageType::Error,
                            Payload::Error(ErrorPayload {
                                code: "WAITING_FOR_SPAWN".to_string(),
                                message: app.config.spawn_points.wait_message.clone(),
                                context: None,
                            }),
                        ))
                    }
                }
            }
        }
    }
}

/// Builds the `CONNECT` join-response plus the `PLAYER_JOINED` broadcast to
/// every other connection, for both fresh joins and reconnections.
fn join_response(state: &mut crate::state::GameState, client_id: ClientId, player_id: session::PlayerId, is_reconnection: bool) -> RoutingEffects {
    let player = state.game.player(player_id).expect("just placed").clone();
    let snapshot = state.game.snapshot();

    let reply = Message::new(
        MessageType::Connect,
        Payload::Connect(ConnectPayload {
            client_id: Some(client_id_to_wire(client_id)),
            player_id: Some(player_id_to_wire(player_id)),
            player_name: Some(player.name.clone()),
            game_state: Some(snapshot_to_dto(&snapshot)),
            is_reconnection: Some(is_reconnection),
        }),
    );

    let announcement = Message::new(
        MessageType::PlayerJoined,
        Payload::PlayerJoined(PlayerJoinedPayload {
            client_id: client_id_to_wire(client_id),
            player_id: player_id_to_wire(player_id),
            player_name: player.name,
            x: player.x,
            y: player.y,
        }),
    );

    RoutingEffects {
        to_sender: vec![reply],
        to_others: vec![announcement],
        close: false,
    }
}

fn handle_move(app: &Arc<AppState>, client_id: ClientId, message: Message) -> RoutingEffects {
    let mut state = app.state.lock().unwrap();
    let Some(ConnectionPhase::Joined) = state.session.phase(client_id) else {
        return RoutingEffects::error("NOT_JOINED", "must join before moving");
    };
    let Some(player_id) = state.session.player_for_client(client_id) else {
        return RoutingEffects::error("NOT_JOINED", "must join before moving");
    };
    let Payload::Move(MovePayload { dx, dy }) = &message.payload else {
        return RoutingEffects::error("UNEXPECTED", "malformed move payload");
    };

    match state.game.apply_move(player_id, *dx as i32, *dy as i32) {
        Ok(_) => RoutingEffects::default(), // accepted moves surface on the next STATE_UPDATE
        Err(game_core::ApplyMoveError::Rejected(reason)) => RoutingEffects::reply(Message::new(
            MessageType::MoveFailed,
            Payload::MoveFailed(protocol::MoveFailedPayload {
                reason: wire_reason(reason),
            }),
        )),
        Err(game_core::ApplyMoveError::Unknown(error)) => {
            // handle_move already checked player_for_client above; a session
            // lookup succeeding while game-core has no such player is an
            // internal inconsistency, not a gameplay rejection.
            tracing::error!(%client_id, %error, "player vanished between session and game-core lookups");
            RoutingEffects::error("UNEXPECTED", error.to_string())
        }
    }
}

fn wire_reason(reason: game_core::MoveFailReason) -> protocol::MoveFailReason {
    match reason {
        game_core::MoveFailReason::OutOfBounds => protocol::MoveFailReason::OutOfBounds,
        game_core::MoveFailReason::Wall => protocol::MoveFailReason::Wall,
        game_core::MoveFailReason::PlayerCollision => protocol::MoveFailReason::PlayerCollision,
    }
}

fn handle_restart(app: &Arc<AppState>, client_id: ClientId) -> RoutingEffects {
    let mut state = app.state.lock().unwrap();
    let Some(ConnectionPhase::Joined) = state.session.phase(client_id) else {
        return RoutingEffects::error("NOT_JOINED", "must join before restarting");
    };
    let Some(player_id) = state.session.player_for_client(client_id) else {
        return RoutingEffects::error("NOT_JOINED", "must join before restarting");
    };
    if !state.restart_policy.allows_restart(player_id) {
        return RoutingEffects::error("RESTART_DENIED", "this client may not request a restart");
    }
    state.game.restart();
    tracing::info!(%client_id, "game restarted");
    RoutingEffects::default()
}

/// `SET_PLAYER_NAME` is a recognized wire message (spec §6) but absent from
/// the §4.7 routing table; this implementation extends the table the same
/// way as `MOVE`/`RESTART` — allowed only once joined.
fn handle_set_player_name(app: &Arc<AppState>, client_id: ClientId, message: Message) -> RoutingEffects {
    let mut state = app.state.lock().unwrap();
    let Some(ConnectionPhase::Joined) = state.session.phase(client_id) else {
        return RoutingEffects::error("NOT_JOINED", "must join before renaming");
    };
    let Some(player_id) = state.session.player_for_client(client_id) else {
        return RoutingEffects::error("NOT_JOINED", "must join before renaming");
    };
    let Payload::SetPlayerName(SetPlayerNamePayload { player_name }) = &message.payload else {
        return RoutingEffects::error("UNEXPECTED", "malformed name payload");
    };
    if let Some(player) = state.game.player_mut(player_id) {
        player.name = player_name.clone();
    }
    RoutingEffects::default()
}

fn handle_other(app: &Arc<AppState>, client_id: ClientId) -> RoutingEffects {
    let state = app.state.lock().unwrap();
    match state.session.phase(client_id) {
        Some(_) => RoutingEffects::error("UNEXPECTED", "message not valid in the current state"),
        None => RoutingEffects::error("UNEXPECTED", "unknown connection"),
    }
}

/// Shared disconnect path: used both for an explicit `DISCONNECT` message
/// and for an unexpected transport close (spec §7 "transport faults").
pub fn disconnect_client(app: &Arc<AppState>, client_id: ClientId) -> RoutingEffects {
    let mut state = app.state.lock().unwrap();
    let Some(player_id) = state.session.player_for_client(client_id) else {
        return RoutingEffects {
            close: true,
            ..Default::default()
        };
    };
    // A `Waiting` connection was never placed and never got a `PLAYER_JOINED`
    // announcement (that only happens in `join_response`/`broadcast_admission`),
    // so other clients must not hear about its departure either.
    let was_joined = state.session.phase(client_id) == Some(ConnectionPhase::Joined);

    let (position, name) = state
        .game
        .player(player_id)
        .map(|p| (p.position(), p.name.clone()))
        .unwrap_or((board::Coord::new(0, 0), String::new()));

    let tick = state.game.tick();
    state.game.remove_player(player_id);
    state.session.disconnect(client_id, position, name, tick);
    tracing::info!(%client_id, player_id = %player_id, "player disconnected");

    let to_others = if was_joined {
        vec![Message::new(
            MessageType::PlayerLeft,
            Payload::PlayerLeft(PlayerLeftPayload {
                player_id: player_id_to_wire(player_id),
            }),
        )]
    } else {
        Vec::new()
    };

    RoutingEffects {
        close: true,
        to_others,
        ..Default::default()
    }
}
