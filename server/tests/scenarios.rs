//! End-to-end scenarios driven directly against `AppState`/`routing`,
//! without a real socket — the combination already exercises the full
//! protocol state machine and game-core mutation path.

use board::{Board, CellKind, Coord};
use protocol::{ConnectPayload, Message, MessageType, MovePayload, Payload};
use server::config::ServerConfig;
use server::routing;
use server::state::AppState;
use std::sync::Arc;

fn small_board() -> Arc<Board> {
    let cells = vec![CellKind::Empty; 400]; // 20x20
    Arc::new(Board::from_cells(20, 20, cells, vec![Coord::new(1, 1), Coord::new(18, 18)]).unwrap())
}

fn test_app() -> Arc<AppState> {
    let mut config = ServerConfig::default();
    config.spawn_points.clear_radius = 0;
    AppState::new(small_board(), config)
}

fn connect_message() -> Message {
    Message::new(MessageType::Connect, Payload::Connect(ConnectPayload::default()))
}

/// S1: join, move, leave.
#[test]
fn join_then_move_then_disconnect() {
    let app = test_app();
    let client_id = {
        let mut state = app.state.lock().unwrap();
        state.session.accept_connection()
    };

    let effects = routing::handle_inbound(&app, client_id, connect_message());
    assert_eq!(effects.to_sender.len(), 1);
    let Payload::Connect(ref connect) = effects.to_sender[0].payload else {
        panic!("expected a CONNECT reply");
    };
    assert!(connect.player_id.is_some());
    assert_eq!(connect.is_reconnection, Some(false));

    let move_msg = Message::new(MessageType::Move, Payload::Move(MovePayload { dx: 1, dy: 0 }));
    let effects = routing::handle_inbound(&app, client_id, move_msg);
    assert!(effects.to_sender.is_empty(), "an accepted move produces no direct reply");

    let effects = routing::disconnect_client(&app, client_id);
    assert!(effects.close);
    assert_eq!(effects.to_others.len(), 1);
    assert_eq!(effects.to_others[0].msg_type, MessageType::PlayerLeft);
}

/// S2: a move that collides with another player is rejected, the mover's
/// position is untouched, and its own connection gets MOVE_FAILED (no
/// broadcast to anyone else).
#[test]
fn colliding_move_is_rejected_with_move_failed() {
    let app = test_app();

    let client_a = {
        let mut state = app.state.lock().unwrap();
        state.session.accept_connection()
    };
    let effects_a = routing::handle_inbound(&app, client_a, connect_message());
    let Payload::Connect(ref connect_a) = effects_a.to_sender[0].payload else {
        panic!()
    };
    let player_a = server::ids::parse_player_id(connect_a.player_id.as_deref().unwrap()).unwrap();

    // Place a second, unconnected player directly adjacent to player A so the
    // move's outcome is deterministic regardless of where the allocator put A.
    let position_before = {
        let mut state = app.state.lock().unwrap();
        let blocker = state.game.player(player_a).unwrap().position();
        let target = Coord::new(blocker.x + 1, blocker.y);
        state.game.place_player(session::PlayerId(9999), "Blocker".into(), target);
        blocker
    };

    let move_msg = Message::new(MessageType::Move, Payload::Move(MovePayload { dx: 1, dy: 0 }));
    let effects = routing::handle_inbound(&app, client_a, move_msg);
    assert_eq!(effects.to_sender.len(), 1);
    assert_eq!(effects.to_sender[0].msg_type, MessageType::MoveFailed);

    let state = app.state.lock().unwrap();
    assert_eq!(state.game.player(player_a).unwrap().position(), position_before);
}

/// S3: disconnect then reconnect within grace restores the same player id
/// and last position; a fresh `CONNECT` after the connection closes gets a
/// brand new socket-level `clientId` but carries the old `playerId`.
#[test]
fn reconnect_within_grace_restores_identity() {
    let app = test_app();

    let client_a = {
        let mut state = app.state.lock().unwrap();
        state.session.accept_connection()
    };
    let effects = routing::handle_inbound(&app, client_a, connect_message());
    let Payload::Connect(ref connect) = effects.to_sender[0].payload else {
        panic!()
    };
    let player_id = connect.player_id.clone().unwrap();

    routing::disconnect_client(&app, client_a);

    let client_b = {
        let mut state = app.state.lock().unwrap();
        state.session.accept_connection()
    };
    let reconnect_msg = Message::new(
        MessageType::Connect,
        Payload::Connect(ConnectPayload {
            player_id: Some(player_id.clone()),
            ..Default::default()
        }),
    );
    let effects = routing::handle_inbound(&app, client_b, reconnect_msg);
    let Payload::Connect(ref reconnect) = effects.to_sender[0].payload else {
        panic!()
    };
    assert_eq!(reconnect.player_id, Some(player_id));
    assert_eq!(reconnect.is_reconnection, Some(true));
}

/// S5: when no spawn is available, a join is queued and the client gets a
/// WAITING_FOR_SPAWN error instead of a CONNECT reply.
#[test]
fn join_is_queued_when_no_spawn_is_available() {
    let cells = vec![CellKind::Empty; 9];
    let board = Arc::new(Board::from_cells(3, 3, cells, vec![Coord::new(1, 1)]).unwrap());
    let mut config = ServerConfig::default();
    config.spawn_points.clear_radius = 20; // the one spawn's radius covers the whole board
    let app = AppState::new(board, config);

    let client_a = {
        let mut state = app.state.lock().unwrap();
        state.session.accept_connection()
    };
    let effects = routing::handle_inbound(&app, client_a, connect_message());
    assert_eq!(effects.to_sender[0].msg_type, MessageType::Connect);

    let client_b = {
        let mut state = app.state.lock().unwrap();
        state.session.accept_connection()
    };
    let effects = routing::handle_inbound(&app, client_b, connect_message());
    assert_eq!(effects.to_sender.len(), 1);
    let Payload::Error(ref error) = effects.to_sender[0].payload else {
        panic!("expected an ERROR reply");
    };
    assert_eq!(error.code, "WAITING_FOR_SPAWN");

    let state = app.state.lock().unwrap();
    assert_eq!(state.session.phase(client_b), Some(session::ConnectionPhase::Waiting));
}

/// A message sent before joining (other than CONNECT) is rejected with
/// NOT_JOINED and never mutates the world.
#[test]
fn move_before_join_is_rejected() {
    let app = test_app();
    let client_id = {
        let mut state = app.state.lock().unwrap();
        state.session.accept_connection()
    };

    let move_msg = Message::new(MessageType::Move, Payload::Move(MovePayload { dx: 1, dy: 0 }));
    let effects = routing::handle_inbound(&app, client_id, move_msg);
    assert_eq!(effects.to_sender.len(), 1);
    let Payload::Error(ref error) = effects.to_sender[0].payload else {
        panic!("expected an ERROR reply");
    };
    assert_eq!(error.code, "NOT_JOINED");
}
