//! Session registry: connection lifecycle, player identity, and the
//! disconnect-grace/reconnect bookkeeping of spec §4.4.
//!
//! This crate only tracks *identity and lifecycle* — it holds no player
//! position or board state. The position handed back on reconnection is
//! whatever the caller stored at disconnect time; this registry treats it as
//! an opaque value it passes through unchanged.

use board::Coord;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Per-connection lifecycle, spec §4.4 state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    AwaitingJoin,
    Joining,
    Waiting,
    Joined,
    Closed,
}

#[derive(Debug, Clone)]
struct ConnectionEntry {
    phase: ConnectionPhase,
    player_id: Option<PlayerId>,
    /// The chosen display name for a player still sitting in the wait
    /// queue — there is nowhere else to remember it until a spawn frees up
    /// and the player record can actually be created.
    pending_name: Option<String>,
}

#[derive(Debug, Clone)]
struct DisconnectedPlayer {
    last_position: Coord,
    player_name: String,
    expires_at_tick: u64,
}

/// Result of processing a `CONNECT` join/reconnect request.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub player_id: PlayerId,
    pub is_reconnection: bool,
    /// Populated only for a genuine reconnection within grace.
    pub restored_position: Option<Coord>,
    pub restored_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("client {0} is unknown to the registry")]
    UnknownClient(ClientId),
    #[error("client {0} is not in a state that allows this operation")]
    WrongPhase(ClientId),
}

pub struct SessionRegistry {
    next_client_id: u64,
    next_player_id: u64,
    connections: HashMap<ClientId, ConnectionEntry>,
    player_to_client: HashMap<PlayerId, ClientId>,
    disconnected: HashMap<PlayerId, DisconnectedPlayer>,
    wait_queue: VecDeque<PlayerId>,
    disconnect_grace_ticks: u64,
}

impl SessionRegistry {
    pub fn new(disconnect_grace_ticks: u64) -> Self {
        SessionRegistry {
            next_client_id: 1,
            next_player_id: 1,
            connections: HashMap::new(),
            player_to_client: HashMap::new(),
            disconnected: HashMap::new(),
            wait_queue: VecDeque::new(),
            disconnect_grace_ticks,
        }
    }

    /// Socket accepted: assigns a `clientId`, no player yet (spec §4.4 table
    /// row `accepted -> awaitingJoin`).
    pub fn accept_connection(&mut self) -> ClientId {
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        self.connections.insert(
            id,
            ConnectionEntry {
                phase: ConnectionPhase::AwaitingJoin,
                player_id: None,
                pending_name: None,
            },
        );
        id
    }

    pub fn phase(&self, client_id: ClientId) -> Option<ConnectionPhase> {
        self.connections.get(&client_id).map(|e| e.phase)
    }

    pub fn player_for_client(&self, client_id: ClientId) -> Option<PlayerId> {
        self.connections.get(&client_id).and_then(|e| e.player_id)
    }

    pub fn client_for_player(&self, player_id: PlayerId) -> Option<ClientId> {
        self.player_to_client.get(&player_id).copied()
    }

    /// Processes a join request. Allocates a fresh player id, or — if
    /// `requested_player_id` names a player still within its disconnect
    /// grace — rebinds that identity and reports `is_reconnection = true`
    /// with its last known position (spec §4.4, testable property 7 & 8).
    pub fn begin_join(
        &mut self,
        client_id: ClientId,
        requested_player_id: Option<PlayerId>,
        current_tick: u64,
    ) -> Result<JoinOutcome, SessionError> {
        let entry = self
            .connections
            .get_mut(&client_id)
            .ok_or(SessionError::UnknownClient(client_id))?;
        if !matches!(
            entry.phase,
            ConnectionPhase::AwaitingJoin | ConnectionPhase::Waiting
        ) {
            return Err(SessionError::WrongPhase(client_id));
        }

        if let Some(requested) = requested_player_id {
            if let Some(disconnected) = self.disconnected.remove(&requested) {
                if disconnected.expires_at_tick >= current_tick {
                    entry.phase = ConnectionPhase::Joined;
                    entry.player_id = Some(requested);
                    self.player_to_client.insert(requested, client_id);
                    tracing::info!(%client_id, player_id = %requested, "reconnected within grace");
                    return Ok(JoinOutcome {
                        player_id: requested,
                        is_reconnection: true,
                        restored_position: Some(disconnected.last_position),
                        restored_name: Some(disconnected.player_name),
                    });
                }
                tracing::info!(%client_id, player_id = %requested, "reconnect arrived after grace expired");
            }
        }

        let fresh = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        entry.phase = ConnectionPhase::Joining;
        entry.player_id = Some(fresh);
        Ok(JoinOutcome {
            player_id: fresh,
            is_reconnection: false,
            restored_position: None,
            restored_name: None,
        })
    }

    /// No spawn was available: move the connection to `waiting` and enqueue
    /// the player for FIFO re-allocation (spec §4.3, §4.4). `name` is
    /// remembered so it can be attached to the player record once a spawn
    /// frees up.
    pub fn enqueue_waiting(&mut self, client_id: ClientId, name: String) -> Result<PlayerId, SessionError> {
        let entry = self
            .connections
            .get_mut(&client_id)
            .ok_or(SessionError::UnknownClient(client_id))?;
        let player_id = entry.player_id.ok_or(SessionError::WrongPhase(client_id))?;
        entry.phase = ConnectionPhase::Waiting;
        entry.pending_name = Some(name);
        self.player_to_client.insert(player_id, client_id);
        self.wait_queue.push_back(player_id);
        Ok(player_id)
    }

    /// A spawn was found: finalize the connection as `joined`, returning
    /// the name stashed by [`Self::enqueue_waiting`] if this connection had
    /// been waiting.
    pub fn mark_joined(&mut self, client_id: ClientId) -> Result<(PlayerId, Option<String>), SessionError> {
        let entry = self
            .connections
            .get_mut(&client_id)
            .ok_or(SessionError::UnknownClient(client_id))?;
        let player_id = entry.player_id.ok_or(SessionError::WrongPhase(client_id))?;
        entry.phase = ConnectionPhase::Joined;
        let name = entry.pending_name.take();
        self.player_to_client.insert(player_id, client_id);
        Ok((player_id, name))
    }

    /// FIFO view of players waiting for a spawn. Callers re-query the spawn
    /// allocator for the front entry; on success call
    /// [`Self::pop_wait_queue_front`] and [`Self::mark_joined`].
    pub fn wait_queue(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.wait_queue.iter().copied()
    }

    pub fn pop_wait_queue_front(&mut self) -> Option<PlayerId> {
        self.wait_queue.pop_front()
    }

    /// Connection closed (any phase): if a player was bound, move it to the
    /// disconnect-grace table and free the `clientId`/`playerId` binding.
    /// Returns the player id that entered grace, if any.
    pub fn disconnect(
        &mut self,
        client_id: ClientId,
        last_position: Coord,
        player_name: String,
        current_tick: u64,
    ) -> Option<PlayerId> {
        let Some(entry) = self.connections.get_mut(&client_id) else {
            return None;
        };
        let player_id = entry.player_id;
        entry.phase = ConnectionPhase::Closed;

        if let Some(player_id) = player_id {
            self.wait_queue.retain(|p| *p != player_id);
            self.player_to_client.remove(&player_id);
            self.disconnected.insert(
                player_id,
                DisconnectedPlayer {
                    last_position,
                    player_name,
                    expires_at_tick: current_tick + self.disconnect_grace_ticks,
                },
            );
        }
        self.connections.remove(&client_id);
        player_id
    }

    /// Evicts disconnect-grace entries that have expired as of `current_tick`,
    /// permanently forgetting those player identities. Returns the freed ids
    /// so the caller (game core) can drop the corresponding player records.
    pub fn evict_expired(&mut self, current_tick: u64) -> Vec<PlayerId> {
        let expired: Vec<PlayerId> = self
            .disconnected
            .iter()
            .filter(|(_, d)| d.expires_at_tick < current_tick)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.disconnected.remove(id);
        }
        expired
    }

    pub fn is_waiting(&self, player_id: PlayerId) -> bool {
        self.wait_queue.contains(&player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_join_allocates_new_player_id() {
        let mut registry = SessionRegistry::new(40);
        let client = registry.accept_connection();
        let outcome = registry.begin_join(client, None, 0).unwrap();
        assert!(!outcome.is_reconnection);
        assert_eq!(registry.phase(client), Some(ConnectionPhase::Joining));
    }

    #[test]
    fn reconnect_within_grace_restores_identity() {
        let mut registry = SessionRegistry::new(40);
        let client_a = registry.accept_connection();
        let outcome = registry.begin_join(client_a, None, 0).unwrap();
        registry.mark_joined(client_a).unwrap();
        let player_id = outcome.player_id;

        registry.disconnect(client_a, Coord::new(10, 10), "Bob".into(), 5);

        let client_b = registry.accept_connection();
        let reconnect = registry
            .begin_join(client_b, Some(player_id), 7)
            .unwrap();
        assert!(reconnect.is_reconnection);
        assert_eq!(reconnect.player_id, player_id);
        assert_eq!(reconnect.restored_position, Some(Coord::new(10, 10)));
        assert_eq!(reconnect.restored_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn reconnect_after_grace_expired_is_a_fresh_join() {
        let mut registry = SessionRegistry::new(5);
        let client_a = registry.accept_connection();
        let outcome = registry.begin_join(client_a, None, 0).unwrap();
        registry.mark_joined(client_a).unwrap();
        let old_player_id = outcome.player_id;
        registry.disconnect(client_a, Coord::new(1, 1), "Amy".into(), 0);
        registry.evict_expired(10); // grace (0+5=5) has passed by tick 10

        let client_b = registry.accept_connection();
        let result = registry
            .begin_join(client_b, Some(old_player_id), 10)
            .unwrap();
        assert!(!result.is_reconnection);
        assert_ne!(result.player_id, old_player_id);
    }

    #[test]
    fn wait_queue_is_fifo() {
        let mut registry = SessionRegistry::new(40);
        let client_a = registry.accept_connection();
        let outcome_a = registry.begin_join(client_a, None, 0).unwrap();
        registry.enqueue_waiting(client_a, "A".into()).unwrap();

        let client_b = registry.accept_connection();
        let outcome_b = registry.begin_join(client_b, None, 0).unwrap();
        registry.enqueue_waiting(client_b, "B".into()).unwrap();

        let order: Vec<_> = registry.wait_queue().collect();
        assert_eq!(order, vec![outcome_a.player_id, outcome_b.player_id]);
    }

    #[test]
    fn disconnecting_a_waiting_player_removes_it_from_the_queue() {
        let mut registry = SessionRegistry::new(40);
        let client = registry.accept_connection();
        registry.begin_join(client, None, 0).unwrap();
        let player_id = registry.enqueue_waiting(client, "X".into()).unwrap();
        registry.disconnect(client, Coord::new(0, 0), "X".into(), 1);
        assert!(!registry.wait_queue().any(|p| p == player_id));
    }
}
