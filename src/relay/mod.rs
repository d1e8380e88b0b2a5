//! The signaling relay core: registry, dispatch, and background sweepers.
//!
//! The relay tracks which peers are connected, forwards negotiation
//! messages between them, buffers traffic for peers that are briefly
//! offline, and reclaims dead state on timers. It never inspects
//! negotiation payloads and holds no state across restarts.

pub mod client;
pub mod dispatch;
pub mod handlers;
pub mod message;
pub mod queue;
pub mod realm;
pub mod sweeper;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::RelaySettings;
use client::{Client, SocketHandle};
use dispatch::Dispatcher;
use message::Message;
use realm::Realm;
use sweeper::{ExpirySweeper, LivenessSweeper, SweeperHandle};

/// Snapshot of a client handed to the embedding application in events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: String,
    pub room: String,
}

/// Events exposed to the embedding application. Presence bookkeeping
/// (per-room member counts and notifications) lives entirely on the
/// consumer side of this channel.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    Connection { client: ClientInfo },
    Disconnect { client: ClientInfo },
    Message { client: ClientInfo, message: Message },
    Error { message: String },
}

/// Outcome of a registration attempt on an upgraded socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Fresh registration; an `OPEN` ack was sent.
    Open,
    /// Same id, same token: the existing client got the new socket.
    Reconnected,
    /// The id belongs to a different principal.
    IdTaken,
    /// The registry is at its concurrency cap.
    LimitExceeded,
}

/// Handles for the two background sweepers.
pub struct SweeperHandles {
    liveness: SweeperHandle,
    expiry: SweeperHandle,
}

impl SweeperHandles {
    /// Cancel pending ticks; in-flight ticks always finish.
    pub fn stop(&self) {
        self.liveness.stop();
        self.expiry.stop();
    }
}

/// The assembled relay: one registry, one dispatch table, one event bus.
pub struct SignalingRelay {
    realm: Arc<Realm>,
    dispatcher: Arc<Dispatcher>,
    settings: RelaySettings,
    events: broadcast::Sender<RelayEvent>,
    next_conn_id: AtomicU64,
}

impl SignalingRelay {
    pub fn new(settings: RelaySettings) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            realm: Arc::new(Realm::new()),
            dispatcher: Arc::new(Dispatcher::new(events.clone())),
            settings,
            events,
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to connection/disconnect/message/error events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Start the liveness and expiry sweepers. Call once.
    pub fn start_sweepers(&self) -> SweeperHandles {
        info!(
            "starting sweepers (alive timeout {:?}, expire timeout {:?})",
            self.settings.alive_timeout(),
            self.settings.expire_timeout()
        );
        let liveness = LivenessSweeper::new(
            self.realm.clone(),
            self.events.clone(),
            self.settings.alive_timeout(),
            self.settings.check_interval(),
        )
        .spawn();
        let expiry = ExpirySweeper::new(
            self.realm.clone(),
            self.dispatcher.clone(),
            self.settings.expire_timeout(),
            self.settings.cleanup_interval(),
        )
        .spawn();
        SweeperHandles { liveness, expiry }
    }

    /// Allocate an id for the next transport connection.
    pub fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a fresh client or reattach a reconnecting one, then replay
    /// any messages queued while it was away. Runs under one registry lock
    /// so registration, replay, and concurrent sweeps serialize cleanly.
    pub fn attach_client(
        &self,
        id: &str,
        token: &str,
        room: &str,
        handle: SocketHandle,
    ) -> AttachOutcome {
        let mut state = self.realm.lock();

        let outcome = match state.client(id) {
            Some(existing) if existing.token() != token => return AttachOutcome::IdTaken,
            Some(_) => AttachOutcome::Reconnected,
            None => {
                if state.client_count() >= self.settings.concurrent_limit {
                    return AttachOutcome::LimitExceeded;
                }
                state.add_client(Client::new(id, token, room));
                // Ack before the socket can carry anything else; a failed
                // push here just means the connection died mid-handshake and
                // the close path will clean up.
                let _ = handle.send(&Message::open());
                AttachOutcome::Open
            }
        };

        let room = match state.client_mut(id) {
            Some(client) => {
                client.set_socket(Some(handle));
                client.room().to_string()
            }
            None => room.to_string(),
        };

        let queued = state.drain_queue(id);
        if !queued.is_empty() {
            debug!("replaying {} queued messages for {}", queued.len(), id);
        }
        for message in &queued {
            self.dispatcher.dispatch(&mut state, Some(id), message);
        }
        drop(state);

        match outcome {
            AttachOutcome::Open => info!("client {} registered", id),
            AttachOutcome::Reconnected => info!("client {} reconnected", id),
            _ => {}
        }
        let _ = self.events.send(RelayEvent::Connection {
            client: ClientInfo { id: id.to_string(), room },
        });
        outcome
    }

    /// Handle one inbound text frame from a connected peer. Malformed JSON
    /// surfaces as an `error` event; the connection stays up.
    pub fn handle_frame(&self, client: &ClientInfo, text: &str) {
        let mut message: Message = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                debug!("dropping malformed frame from {}: {}", client.id, err);
                let _ = self.events.send(RelayEvent::Error { message: err.to_string() });
                return;
            }
        };
        // Never trust a peer-supplied src.
        message.src = Some(client.id.clone());

        let _ = self.events.send(RelayEvent::Message {
            client: client.clone(),
            message: message.clone(),
        });

        let mut state = self.realm.lock();
        self.dispatcher.dispatch(&mut state, Some(&client.id), &message);
    }

    /// React to a transport close. Only the connection that is still the
    /// client's current one tears the registration down; closes of sockets
    /// replaced by a newer reconnect are ignored.
    pub fn handle_socket_closed(&self, client_id: &str, conn_id: u64) {
        let mut state = self.realm.lock();

        let current = state
            .client(client_id)
            .and_then(|c| c.socket())
            .map(|handle| handle.conn_id());
        if current != Some(conn_id) {
            return;
        }

        if let Some(mut removed) = state.remove_client(client_id) {
            removed.take_socket();
            drop(state);
            info!("client {} disconnected", client_id);
            let _ = self.events.send(RelayEvent::Disconnect {
                client: ClientInfo {
                    id: removed.id().to_string(),
                    room: removed.room().to_string(),
                },
            });
        }
    }

    /// Surface a transport-level error to the embedding application.
    pub fn report_error(&self, message: impl Into<String>) {
        let _ = self.events.send(RelayEvent::Error { message: message.into() });
    }

    pub fn client_count(&self) -> usize {
        self.realm.lock().client_count()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.realm.lock().client_ids()
    }

    /// Generate an id no current client holds.
    pub fn generate_client_id(&self) -> String {
        self.realm.lock().generate_client_id(None)
    }
}
