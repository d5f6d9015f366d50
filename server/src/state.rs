//! Process-wide server state with explicit construction/teardown — the
//! redesign flag "shared mutable singletons" (spec §9) re-architected as a
//! single `Arc<AppState>` threaded through every handler, built once by
//! [`AppState::new`] and released by [`teardown`].
//!
//! Both locks here are plain `std::sync::Mutex`, not `tokio::sync::Mutex`:
//! spec §5 says the only suspension points are network I/O and the tick
//! sleep, so nothing that holds either lock ever awaits while holding it.
//! A blocking mutex is the correct, idiomatic choice for that shape.

use crate::config::ServerConfig;
use board::Board;
use board::spawn::SpawnAllocator;
use broadcast::Broadcaster;
use game_core::{AnyJoinedClient, GameCore, RestartPolicy};
use session::SessionRegistry;
use std::sync::{Arc, Mutex};

/// Everything spec §5 requires to be guarded by one exclusive lock per
/// `Game` instance: the player/entity map, and the session id tables
/// (whose occupancy the spawn allocator reads through `GameCore`).
pub struct GameState {
    pub game: GameCore,
    pub session: SessionRegistry,
    pub restart_policy: Box<dyn RestartPolicy>,
}

pub struct AppState {
    pub state: Mutex<GameState>,
    pub broadcaster: Mutex<Broadcaster>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(board: Arc<Board>, config: ServerConfig) -> Arc<Self> {
        let allocator = SpawnAllocator::new(config.effective_clear_radius());
        let game = GameCore::new(board, allocator, Vec::new());
        let session = SessionRegistry::new(config.disconnect_grace_ticks);
        let broadcaster = Broadcaster::new(config.high_water_mark);

        Arc::new(AppState {
            state: Mutex::new(GameState {
                game,
                session,
                restart_policy: Box::new(AnyJoinedClient),
            }),
            broadcaster: Mutex::new(broadcaster),
            config,
        })
    }
}

/// Drops every registered outbound queue. Called once, on shutdown.
pub fn teardown(state: &Arc<AppState>) {
    let mut broadcaster = state.broadcaster.lock().unwrap();
    let clients: Vec<_> = broadcaster.connected_clients().collect();
    for client_id in clients {
        broadcaster.unregister(client_id);
    }
}
