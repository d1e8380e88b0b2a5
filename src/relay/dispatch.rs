//! Routes inbound messages to the handler registered for their type.

use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::warn;

use super::handlers;
use super::message::{Message, MessageType};
use super::realm::RealmState;
use super::RelayEvent;

/// Handler contract: the originating client id is `None` when the dispatch
/// came from a sweeper rather than a live socket. Returns whether the
/// message was handled.
pub type Handler = fn(&Dispatcher, &mut RealmState, Option<&str>, &Message) -> bool;

/// Fixed table from message type to handler, populated once at startup.
///
/// Dispatch is a pure lookup-and-invoke; unknown types come back as
/// unhandled without raising, so malformed or forward-incompatible traffic
/// can never take the relay down.
pub struct Dispatcher {
    handlers: HashMap<MessageType, Handler>,
    events: broadcast::Sender<RelayEvent>,
}

impl Dispatcher {
    pub fn new(events: broadcast::Sender<RelayEvent>) -> Self {
        let mut dispatcher = Self { handlers: HashMap::new(), events };
        dispatcher.register(MessageType::Heartbeat, handlers::heartbeat);
        dispatcher.register(MessageType::Offer, handlers::transmission);
        dispatcher.register(MessageType::Answer, handlers::transmission);
        dispatcher.register(MessageType::Candidate, handlers::transmission);
        dispatcher.register(MessageType::Leave, handlers::transmission);
        dispatcher.register(MessageType::Expire, handlers::transmission);
        dispatcher
    }

    fn register(&mut self, msg_type: MessageType, handler: Handler) {
        if self.handlers.contains_key(&msg_type) {
            warn!("handler for type {:?} already registered", msg_type);
            return;
        }
        self.handlers.insert(msg_type, handler);
    }

    /// Single entry point for live frames, queue replays, and
    /// sweeper-synthesized messages alike. The failure cascade re-enters
    /// here, so a LEAVE born from a dead socket follows the same rules as
    /// one a peer sent.
    pub fn dispatch(
        &self,
        state: &mut RealmState,
        client_id: Option<&str>,
        message: &Message,
    ) -> bool {
        match self.handlers.get(&message.msg_type) {
            Some(handler) => handler(self, state, client_id, message),
            None => false,
        }
    }

    /// Fire-and-forget event emission; nobody listening is fine.
    pub(crate) fn emit(&self, event: RelayEvent) {
        let _ = self.events.send(event);
    }
}
