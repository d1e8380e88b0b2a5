//! Background reclamation of dead connections and undeliverable messages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::dispatch::Dispatcher;
use super::message::Message;
use super::realm::Realm;
use super::{ClientInfo, RelayEvent};

/// Control for one spawned sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Cancel the pending timer. An in-flight tick always completes; it
    /// runs synchronously under the registry lock.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn abort(self) {
        self.task.abort();
    }
}

/// Evicts clients that stopped heartbeating.
///
/// An evicted client gets identical cleanup to a gateway-observed socket
/// close, so consumers cannot tell a graceful close from a sweep.
pub struct LivenessSweeper {
    realm: Arc<Realm>,
    events: broadcast::Sender<RelayEvent>,
    alive_timeout: Duration,
    check_interval: Duration,
}

impl LivenessSweeper {
    pub fn new(
        realm: Arc<Realm>,
        events: broadcast::Sender<RelayEvent>,
        alive_timeout: Duration,
        check_interval: Duration,
    ) -> Self {
        Self { realm, events, alive_timeout, check_interval }
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.check_interval);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        });
        SweeperHandle { shutdown, task }
    }

    /// One tick: a single lock acquisition, serialized against dispatch.
    pub(crate) fn sweep(&self) {
        let mut state = self.realm.lock();
        let now = Instant::now();

        for id in state.client_ids() {
            let expired = match state.client(&id) {
                Some(client) => now.duration_since(client.last_ping()) >= self.alive_timeout,
                None => continue,
            };
            if !expired {
                continue;
            }

            debug!("evicting silent client {}", id);
            if let Some(handle) = state.client_mut(&id).and_then(|c| c.take_socket()) {
                handle.close();
            }
            let _ = state.drain_queue(&id);
            if let Some(removed) = state.remove_client(&id) {
                let _ = self.events.send(RelayEvent::Disconnect {
                    client: ClientInfo {
                        id: removed.id().to_string(),
                        room: removed.room().to_string(),
                    },
                });
            }
        }
    }
}

/// Expires queues nobody drained, notifying the original senders.
pub struct ExpirySweeper {
    realm: Arc<Realm>,
    dispatcher: Arc<Dispatcher>,
    expire_timeout: Duration,
    cleanup_interval: Duration,
}

impl ExpirySweeper {
    pub fn new(
        realm: Arc<Realm>,
        dispatcher: Arc<Dispatcher>,
        expire_timeout: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self { realm, dispatcher, expire_timeout, cleanup_interval }
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.cleanup_interval);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        });
        SweeperHandle { shutdown, task }
    }

    pub(crate) fn sweep(&self) {
        let mut state = self.realm.lock();
        let now = Instant::now();

        // One notice per distinct (src, dst) pair per tick, however many
        // message types were queued between that pair.
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for id in state.ids_with_queue() {
            let stale = state
                .queue(&id)
                .is_some_and(|q| now.duration_since(q.last_drained_at()) >= self.expire_timeout);
            if !stale {
                continue;
            }

            let messages = state.drain_queue(&id);
            debug!("expiring {} undelivered messages for {}", messages.len(), id);

            for message in &messages {
                let key = (
                    message.src.clone().unwrap_or_default(),
                    message.dst.clone().unwrap_or_default(),
                );
                if seen.insert(key) {
                    let expire = Message::expire(message.dst.clone(), message.src.clone());
                    self.dispatcher.dispatch(&mut state, None, &expire);
                }
            }
        }
    }
}
