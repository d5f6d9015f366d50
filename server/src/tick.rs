//! The broadcast tick (spec §4.6): once per interval, evict expired
//! disconnect-grace entries, re-drain the wait queue against freed spawns,
//! snapshot the world, and fan `STATE_UPDATE` out to every joined
//! connection. Runs synchronously under the game lock — the only
//! suspension point is [`broadcast::TickScheduler`]'s own sleep.

use crate::dto::snapshot_to_dto;
use crate::ids::{client_id_to_wire, player_id_to_wire};
use crate::state::AppState;
use broadcast::OutboundFrame;
use protocol::{ConnectPayload, Message, MessageType, Payload, PlayerJoinedPayload, StateUpdatePayload};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One tick. Called synchronously by [`broadcast::TickScheduler::run`].
pub fn on_tick(app: &Arc<AppState>) {
    let mut admitted = Vec::new();
    {
        let mut state = app.state.lock().unwrap();
        state.game.advance_tick();
        let tick = state.game.tick();

        for expired in state.session.evict_expired(tick) {
            state.game.remove_player(expired);
        }

        while let Some(position) = state.game.allocate_spawn() {
            let Some(player_id) = state.session.pop_wait_queue_front() else {
                break;
            };
            let Some(client_id) = state.session.client_for_player(player_id) else {
                continue;
            };
            let (_player_id, name) = state
                .session
                .mark_joined(client_id)
                .expect("wait-queue entries always have a bound connection");
            let name = name.unwrap_or_else(|| format!("Player {}", player_id.0));
            state.game.place_player(player_id, name, position);
            tracing::info!(%client_id, %player_id, "spawn freed up, admitting queued player");
            admitted.push((client_id, player_id));
        }
    }

    for (client_id, player_id) in admitted {
        broadcast_admission(app, client_id, player_id);
    }

    broadcast_state_update(app);
}

fn broadcast_admission(app: &Arc<AppState>, client_id: session::ClientId, player_id: session::PlayerId) {
    let mut state = app.state.lock().unwrap();
    let Some(player) = state.game.player(player_id).cloned() else {
        return;
    };
    let snapshot = state.game.snapshot();
    drop(state);

    let reply = Message::new(
        MessageType::Connect,
        Payload::Connect(ConnectPayload {
            client_id: Some(client_id_to_wire(client_id)),
            player_id: Some(player_id_to_wire(player_id)),
            player_name: Some(player.name.clone()),
            game_state: Some(snapshot_to_dto(&snapshot)),
            is_reconnection: Some(false),
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

    let mut broadcaster = app.broadcaster.lock().unwrap();
    let reply_bytes = protocol::encode(reply, now_millis());
    broadcaster.send(client_id, OutboundFrame::mandatory(reply_bytes));

    let targets: Vec<_> = broadcaster.connected_clients().filter(|c| *c != client_id).collect();
    for target in targets {
        let bytes = protocol::encode(announcement.clone(), now_millis());
        broadcaster.send(target, OutboundFrame::mandatory(bytes));
    }
}

fn broadcast_state_update(app: &Arc<AppState>) {
    let (tick, dto) = {
        let state = app.state.lock().unwrap();
        let snapshot = state.game.snapshot();
        (snapshot.tick, snapshot_to_dto(&snapshot))
    };

    let message = Message::new(
        MessageType::StateUpdate,
        Payload::StateUpdate(StateUpdatePayload {
            game_state: dto,
            tick,
        }),
    );
    let bytes = protocol::encode(message, now_millis());

    let mut broadcaster = app.broadcaster.lock().unwrap();
    broadcaster.broadcast(|_client_id| OutboundFrame::droppable(bytes.clone()));
}
