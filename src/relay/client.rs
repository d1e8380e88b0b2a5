//! A registered peer and its handle to the underlying transport.

use std::time::Instant;

use tokio::sync::mpsc;

use super::message::Message;

/// Commands accepted by a connection's writer task.
#[derive(Debug)]
pub enum SocketCommand {
    /// Serialized frame to deliver to the peer.
    Frame(String),
    /// Close the WebSocket and end the writer task.
    Close,
}

/// The destination socket is gone; the writer task has already exited.
#[derive(Debug, PartialEq, Eq)]
pub struct SocketClosed;

/// Cheap clonable handle to one transport connection.
///
/// The relay never owns the socket itself: it pushes commands into the
/// connection's channel and the writer task does the actual I/O. A push
/// fails synchronously once the writer task is gone, which is how a
/// dead-but-not-yet-closed connection is detected.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    conn_id: u64,
    tx: mpsc::UnboundedSender<SocketCommand>,
}

impl SocketHandle {
    pub fn new(conn_id: u64, tx: mpsc::UnboundedSender<SocketCommand>) -> Self {
        Self { conn_id, tx }
    }

    /// Identifies this connection among successive sockets of the same
    /// client, so a stale close event cannot tear down a newer reconnect.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn send_text(&self, text: String) -> Result<(), SocketClosed> {
        self.tx.send(SocketCommand::Frame(text)).map_err(|_| SocketClosed)
    }

    pub fn send(&self, message: &Message) -> Result<(), SocketClosed> {
        let text = serde_json::to_string(message).map_err(|_| SocketClosed)?;
        self.send_text(text)
    }

    pub fn close(&self) {
        let _ = self.tx.send(SocketCommand::Close);
    }
}

/// One active or recently-active peer.
#[derive(Debug)]
pub struct Client {
    id: String,
    token: String,
    room: String,
    socket: Option<SocketHandle>,
    last_ping: Instant,
}

impl Client {
    pub fn new(id: impl Into<String>, token: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
            room: room.into(),
            socket: None,
            last_ping: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn socket(&self) -> Option<&SocketHandle> {
        self.socket.as_ref()
    }

    pub fn set_socket(&mut self, socket: Option<SocketHandle>) {
        self.socket = socket;
    }

    pub fn take_socket(&mut self) -> Option<SocketHandle> {
        self.socket.take()
    }

    pub fn last_ping(&self) -> Instant {
        self.last_ping
    }

    pub fn set_last_ping(&mut self, at: Instant) {
        self.last_ping = at;
    }

    /// Serialize and push one frame to the peer. Fails when no socket is
    /// attached or the attached one is dead.
    pub fn send(&self, message: &Message) -> Result<(), SocketClosed> {
        match &self.socket {
            Some(handle) => handle.send(message),
            None => Err(SocketClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_without_socket_fails() {
        let client = Client::new("a", "t", "lobby");
        assert_eq!(client.send(&Message::open()), Err(SocketClosed));
    }

    #[test]
    fn send_reaches_writer_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = Client::new("a", "t", "lobby");
        client.set_socket(Some(SocketHandle::new(1, tx)));

        client.send(&Message::open()).unwrap();
        match rx.try_recv().unwrap() {
            SocketCommand::Frame(text) => assert!(text.contains("OPEN")),
            SocketCommand::Close => panic!("expected a frame"),
        }
    }

    #[test]
    fn send_after_writer_exit_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut client = Client::new("a", "t", "lobby");
        client.set_socket(Some(SocketHandle::new(1, tx)));
        drop(rx);

        assert_eq!(client.send(&Message::open()), Err(SocketClosed));
    }
}
