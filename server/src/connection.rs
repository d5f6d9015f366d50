//! One axum WebSocket connection: handshake greeting, then a combined
//! read/write loop. Grounded in the teacher's `relay-server` pattern of
//! splitting the socket and running inbound/outbound concurrently, but
//! collapsed into a single `tokio::select!` loop per connection instead of
//! the teacher's two spawned tasks, since here both directions share one
//! small piece of per-connection state (no internal locking needed).

use crate::ids::client_id_to_wire;
use crate::routing::{self, RoutingEffects};
use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use broadcast::OutboundFrame;
use futures_util::{Sink, SinkExt, StreamExt};
use protocol::{ConnectPayload, Message, MessageType, Payload};
use session::ClientId;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub async fn websocket_handler(ws: WebSocketUpgrade, State(app): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

async fn handle_socket(socket: WebSocket, app: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let client_id = {
        let mut state = app.state.lock().unwrap();
        state.session.accept_connection()
    };
    tracing::info!(%client_id, "connection accepted");

    let mut outbound = {
        let mut broadcaster = app.broadcaster.lock().unwrap();
        broadcaster.register(client_id)
    };

    let greeting = Message::new(
        MessageType::Connect,
        Payload::Connect(ConnectPayload {
            client_id: Some(client_id_to_wire(client_id)),
            ..Default::default()
        }),
    );
    if !send_direct(&mut sender, greeting).await {
        cleanup(&app, client_id).await;
        return;
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if sender.send(WsMessage::Text(String::from_utf8_lossy(&frame.bytes).into_owned().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let effects = process_inbound(&app, client_id, text.as_bytes()).await;
                        if !apply_effects(&app, &mut sender, client_id, effects).await {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::warn!(%client_id, %error, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    let effects = routing::disconnect_client(&app, client_id);
    fan_out(&app, client_id, effects.to_others).await;
    cleanup(&app, client_id).await;
}

async fn process_inbound(app: &Arc<AppState>, client_id: ClientId, bytes: &[u8]) -> RoutingEffects {
    match protocol::parse(bytes) {
        Ok(message) => routing::handle_inbound(app, client_id, message),
        Err(error) => {
            tracing::warn!(%client_id, %error, "rejecting malformed frame");
            routing::protocol_error(error)
        }
    }
}

/// Sends direct replies to the sender, fans notifications out to every
/// other connection, and reports whether the loop should keep running.
async fn apply_effects(
    app: &Arc<AppState>,
    sender: &mut (impl Sink<WsMessage, Error = axum::Error> + Unpin),
    client_id: ClientId,
    effects: RoutingEffects,
) -> bool {
    for message in effects.to_sender {
        if !send_direct(sender, message).await {
            return false;
        }
    }
    fan_out(app, client_id, effects.to_others).await;
    !effects.close
}

async fn send_direct(
    sender: &mut (impl Sink<WsMessage, Error = axum::Error> + Unpin),
    message: Message,
) -> bool {
    let bytes = protocol::encode(message, now_millis());
    sender
        .send(WsMessage::Text(String::from_utf8_lossy(&bytes).into_owned().into()))
        .await
        .is_ok()
}

async fn fan_out(app: &Arc<AppState>, except: ClientId, messages: Vec<Message>) {
    if messages.is_empty() {
        return;
    }
    let mut broadcaster = app.broadcaster.lock().unwrap();
    let targets: Vec<ClientId> = broadcaster.connected_clients().filter(|c| *c != except).collect();
    for target in targets {
        for message in &messages {
            let bytes = protocol::encode(message.clone(), now_millis());
            broadcaster.send(target, OutboundFrame::mandatory(bytes));
        }
    }
}

async fn cleanup(app: &Arc<AppState>, client_id: ClientId) {
    let mut broadcaster = app.broadcaster.lock().unwrap();
    broadcaster.unregister(client_id);
}
