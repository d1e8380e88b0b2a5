//! WebSocket gateway: upgrades connections and feeds the relay.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::relay::client::{SocketCommand, SocketHandle};
use crate::relay::message::{Message, RejectReason};
use crate::relay::{AttachOutcome, ClientInfo, SignalingRelay};

/// Query parameters of an upgrade request. `key` is the room tag peers
/// send on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

/// Authorization hook run before the upgrade completes. Returning `false`
/// refuses the connection at the HTTP layer; no client is ever created.
pub type AuthHandler = Arc<dyn Fn(HeaderMap, WsQuery) -> BoxFuture<'static, bool> + Send + Sync>;

#[derive(Clone)]
pub struct GatewayState {
    relay: Arc<SignalingRelay>,
    auth_handler: Option<AuthHandler>,
}

/// The relay's HTTP surface: a single WebSocket endpoint.
pub struct SignalingServer {
    relay: Arc<SignalingRelay>,
    auth_handler: Option<AuthHandler>,
    addr: String,
}

impl SignalingServer {
    pub fn new(relay: Arc<SignalingRelay>, addr: String) -> Self {
        Self { relay, auth_handler: None, addr }
    }

    pub fn with_auth_handler(mut self, handler: AuthHandler) -> Self {
        self.auth_handler = Some(handler);
        self
    }

    /// Router for embedding into a larger application. The caller is then
    /// responsible for starting the relay's sweepers.
    pub fn router(&self) -> Router {
        let state = GatewayState {
            relay: self.relay.clone(),
            auth_handler: self.auth_handler.clone(),
        };
        Router::new().route("/", any(ws_handler)).with_state(state)
    }

    /// Bind, start the sweepers, and serve until the process exits.
    pub async fn run(self) -> Result<()> {
        let sweepers = self.relay.start_sweepers();
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        sweepers.stop();
        Ok(())
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<GatewayState>,
) -> Response {
    if let Some(auth) = &state.auth_handler {
        if !auth(headers, params.clone()).await {
            debug!("refusing upgrade: auth handler rejected");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, params, state.relay))
}

/// Drive one connection: writer task, registration, inbound loop, close.
async fn handle_socket(socket: WebSocket, params: WsQuery, relay: Arc<SignalingRelay>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SocketCommand>();

    // All outbound traffic funnels through this task; the relay itself only
    // ever pushes into the channel.
    let send_task = tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                SocketCommand::Frame(text) => {
                    if sender.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                SocketCommand::Close => {
                    let _ = sender.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    let handle = SocketHandle::new(relay.next_conn_id(), tx);
    let conn_id = handle.conn_id();

    let id = params.id.unwrap_or_default();
    let token = params.token.unwrap_or_default();
    let room = params.key.unwrap_or_default();

    if id.is_empty() || token.is_empty() {
        reject(&handle, &Message::error(RejectReason::InvalidWsParameters));
        return;
    }

    match relay.attach_client(&id, &token, &room, handle.clone()) {
        AttachOutcome::IdTaken => {
            reject(&handle, &Message::id_taken());
            return;
        }
        AttachOutcome::LimitExceeded => {
            reject(&handle, &Message::error(RejectReason::ConnectionLimitExceed));
            return;
        }
        AttachOutcome::Open | AttachOutcome::Reconnected => {}
    }

    let info = ClientInfo { id: id.clone(), room };

    while let Some(result) = receiver.next().await {
        match result {
            Ok(WsMessage::Text(text)) => relay.handle_frame(&info, &text),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!("websocket error from {}: {}", id, err);
                relay.report_error(err.to_string());
                break;
            }
        }
    }

    relay.handle_socket_closed(&id, conn_id);
    send_task.abort();
}

/// Answer a protocol-level rejection and close. Never an error path: the
/// writer task delivers the frame and then the close.
fn reject(handle: &SocketHandle, message: &Message) {
    let _ = handle.send(message);
    handle.close();
}
