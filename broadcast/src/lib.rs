//! Broadcast scheduler (spec §4.6): the fixed-cadence tick that drives
//! eviction, wait-queue re-draining, snapshotting, and `STATE_UPDATE`
//! fan-out, plus the per-connection outbound queue with backpressure.
//!
//! This crate stays codec-agnostic — it moves already-encoded frames, never
//! `protocol::Message`s. The `server` crate owns encoding and decides which
//! frames are `droppable`.

use session::ClientId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// One already-encoded outbound frame.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub bytes: Vec<u8>,
    /// `STATE_UPDATE` frames are droppable under backpressure (spec §4.6);
    /// every other message type must never be silently dropped.
    pub droppable: bool,
}

impl OutboundFrame {
    pub fn droppable(bytes: Vec<u8>) -> Self {
        OutboundFrame {
            bytes,
            droppable: true,
        }
    }

    pub fn mandatory(bytes: Vec<u8>) -> Self {
        OutboundFrame {
            bytes,
            droppable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// A droppable frame was discarded because the connection's queue was
    /// full; the connection stays open.
    Dropped,
    /// A mandatory frame could not be queued: the connection is now closed
    /// with reason `SLOW_CONSUMER` (spec §4.6, §7).
    SlowConsumer,
    /// No live outbound queue is registered for this client.
    NotConnected,
}

/// Per-connection outbound queues plus the high-water mark that triggers
/// backpressure handling.
pub struct Broadcaster {
    high_water_mark: usize,
    connections: HashMap<ClientId, mpsc::Sender<OutboundFrame>>,
}

impl Broadcaster {
    pub fn new(high_water_mark: usize) -> Self {
        Broadcaster {
            high_water_mark,
            connections: HashMap::new(),
        }
    }

    /// Registers a new connection's outbound queue, sized to the
    /// broadcaster's high-water mark, and returns the receiving half for
    /// the connection's write loop to drain.
    pub fn register(&mut self, client_id: ClientId) -> mpsc::Receiver<OutboundFrame> {
        let (tx, rx) = mpsc::channel(self.high_water_mark);
        self.connections.insert(client_id, tx);
        rx
    }

    pub fn unregister(&mut self, client_id: ClientId) {
        self.connections.remove(&client_id);
    }

    pub fn is_registered(&self, client_id: ClientId) -> bool {
        self.connections.contains_key(&client_id)
    }

    pub fn connected_clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.connections.keys().copied()
    }

    /// Enqueues `frame` for `client_id`. Never blocks: a full queue either
    /// drops the frame (if droppable) or closes the connection (if not).
    pub fn send(&mut self, client_id: ClientId, frame: OutboundFrame) -> SendOutcome {
        let Some(sender) = self.connections.get(&client_id) else {
            return SendOutcome::NotConnected;
        };
        match sender.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(full)) => {
                if full.droppable {
                    tracing::debug!(%client_id, "dropping state update for a slow consumer");
                    SendOutcome::Dropped
                } else {
                    tracing::warn!(%client_id, "queue saturated on a mandatory frame, closing as slow consumer");
                    self.connections.remove(&client_id);
                    SendOutcome::SlowConsumer
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.connections.remove(&client_id);
                SendOutcome::NotConnected
            }
        }
    }

    /// Fans `frame_for(client_id)` out to every registered connection.
    /// Per spec §4.6: no ordering guarantee across connections, but each
    /// connection's own queue preserves issue order (FIFO, by construction
    /// of the underlying `mpsc` channel).
    pub fn broadcast(
        &mut self,
        mut frame_for: impl FnMut(ClientId) -> OutboundFrame,
    ) -> Vec<(ClientId, SendOutcome)> {
        let targets: Vec<ClientId> = self.connections.keys().copied().collect();
        targets
            .into_iter()
            .map(|client_id| {
                let frame = frame_for(client_id);
                (client_id, self.send(client_id, frame))
            })
            .collect()
    }
}

/// Drives the fixed-rate tick of spec §4.6. Each tick invokes a caller
/// supplied, synchronous callback that — under the single game lock —
/// evicts grace expirations, re-drains the wait queue, snapshots, and fans
/// out `STATE_UPDATE`. The only suspension points are the tick sleep itself
/// and the shutdown signal (spec §5).
pub struct TickScheduler {
    interval: Duration,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        TickScheduler { interval }
    }

    /// Runs until `shutdown` resolves. `on_tick` must not block — it is
    /// expected to take the game lock, do O(1)-ish bookkeeping, and return.
    pub async fn run(
        &self,
        mut on_tick: impl FnMut(u64) + Send,
        mut shutdown: tokio::sync::oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ticks += 1;
                    on_tick(ticks);
                }
                _ = &mut shutdown => {
                    tracing::info!("tick scheduler received shutdown signal");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn droppable_frame_is_dropped_when_queue_is_full() {
        let mut broadcaster = Broadcaster::new(1);
        let client = ClientId(1);
        let _rx = broadcaster.register(client);

        assert_eq!(
            broadcaster.send(client, OutboundFrame::droppable(vec![1])),
            SendOutcome::Sent
        );
        assert_eq!(
            broadcaster.send(client, OutboundFrame::droppable(vec![2])),
            SendOutcome::Dropped
        );
        assert!(broadcaster.is_registered(client));
    }

    #[test]
    fn mandatory_frame_closes_connection_when_queue_is_full() {
        let mut broadcaster = Broadcaster::new(1);
        let client = ClientId(1);
        let _rx = broadcaster.register(client);

        assert_eq!(
            broadcaster.send(client, OutboundFrame::droppable(vec![1])),
            SendOutcome::Sent
        );
        let outcome = broadcaster.send(client, OutboundFrame::mandatory(vec![2]));
        assert_eq!(outcome, SendOutcome::SlowConsumer);
        assert!(!broadcaster.is_registered(client));
    }

    #[test]
    fn unregistered_client_reports_not_connected() {
        let mut broadcaster = Broadcaster::new(4);
        let outcome = broadcaster.send(ClientId(99), OutboundFrame::mandatory(vec![1]));
        assert_eq!(outcome, SendOutcome::NotConnected);
    }

    #[tokio::test]
    async fn tick_scheduler_invokes_callback_on_each_tick_and_honors_shutdown() {
        let scheduler = TickScheduler::new(Duration::from_millis(5));
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let counter_clone = counter.clone();

        let handle = tokio::spawn(async move {
            scheduler
                .run(
                    move |_tick| {
                        counter_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    },
                    shutdown_rx,
                )
                .await;
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(counter.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }
}
