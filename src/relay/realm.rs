//! The registry of connected peers and their pending message queues.
//!
//! This is the only shared mutable state in the relay. Everything that
//! mutates it (a dispatch, a registration, a sweep tick) does so under one
//! lock acquisition, and nothing awaits while the lock is held: socket
//! sends are synchronous pushes into per-connection channels.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;

use super::client::Client;
use super::message::Message;
use super::queue::MessageQueue;

/// The maps behind the lock. All operations are synchronous and
/// non-blocking.
#[derive(Debug, Default)]
pub struct RealmState {
    clients: HashMap<String, Client>,
    queues: HashMap<String, MessageQueue>,
}

impl RealmState {
    pub fn add_client(&mut self, client: Client) {
        self.clients.insert(client.id().to_string(), client);
    }

    /// Removing an absent client is a no-op, which makes eviction races
    /// between the gateway and the sweepers harmless.
    pub fn remove_client(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn client(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn client_mut(&mut self, id: &str) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    /// Destination ids that currently have undelivered messages.
    pub fn ids_with_queue(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }

    pub fn queue(&self, id: &str) -> Option<&MessageQueue> {
        self.queues.get(id)
    }

    /// Buffer a message for `id`, creating the queue on first use.
    pub fn enqueue_for(&mut self, id: &str, message: Message) {
        self.queues.entry(id.to_string()).or_default().push(message);
    }

    /// Return every buffered message for `id` in enqueue order and delete
    /// the queue. An empty queue never survives in the registry.
    pub fn drain_queue(&mut self, id: &str) -> Vec<Message> {
        match self.queues.remove(id) {
            Some(mut queue) => queue.drain(),
            None => Vec::new(),
        }
    }

    /// Invoke `factory` (or the default random generator) until it yields
    /// an id no registered client holds.
    pub fn generate_client_id(&self, factory: Option<&dyn Fn() -> String>) -> String {
        let generate = factory.unwrap_or(&random_client_id);
        let mut id = generate();
        while self.clients.contains_key(&id) {
            id = generate();
        }
        id
    }
}

/// Default client-id factory: 30 base-36 characters.
pub fn random_client_id() -> String {
    let mut rng = rand::thread_rng();
    (0..30)
        .map(|_| char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
        .collect()
}

/// Lock wrapper handed to every component. Held for the duration of one
/// dispatch or one sweep tick, never across an await.
#[derive(Debug, Default)]
pub struct Realm {
    state: Mutex<RealmState>,
}

impl Realm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, RealmState> {
        self.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_get_remove_client() {
        let mut state = RealmState::default();
        state.add_client(Client::new("a", "t1", "lobby"));

        assert_eq!(state.client_count(), 1);
        assert_eq!(state.client("a").map(|c| c.token()), Some("t1"));

        assert!(state.remove_client("a").is_some());
        assert!(state.remove_client("a").is_none());
        assert_eq!(state.client_count(), 0);
    }

    #[test]
    fn enqueue_creates_queue_lazily() {
        let mut state = RealmState::default();
        assert!(state.ids_with_queue().is_empty());

        state.enqueue_for("b", Message::leave(Some("a".into()), Some("b".into())));
        state.enqueue_for("b", Message::leave(Some("c".into()), Some("b".into())));

        assert_eq!(state.ids_with_queue(), vec!["b".to_string()]);
        assert_eq!(state.queue("b").map(|q| q.len()), Some(2));
    }

    #[test]
    fn drain_deletes_the_queue() {
        let mut state = RealmState::default();
        state.enqueue_for("b", Message::leave(Some("a".into()), Some("b".into())));

        let drained = state.drain_queue("b");
        assert_eq!(drained.len(), 1);
        assert!(state.ids_with_queue().is_empty());
        assert!(state.drain_queue("b").is_empty());
    }

    #[test]
    fn generated_ids_avoid_collisions() {
        let mut state = RealmState::default();
        state.add_client(Client::new("fixed", "t", ""));

        let counter = std::cell::Cell::new(0u32);
        let factory = || {
            let n = counter.get();
            counter.set(n + 1);
            if n == 0 { "fixed".to_string() } else { "fresh".to_string() }
        };
        let id = state.generate_client_id(Some(&factory));
        assert_eq!(id, "fresh");
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn default_ids_look_sane() {
        let a = random_client_id();
        let b = random_client_id();
        assert_eq!(a.len(), 30);
        assert_ne!(a, b);
    }
}
