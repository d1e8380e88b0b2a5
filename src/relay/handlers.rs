//! The two message handlers behind the dispatch table.

use std::time::Instant;

use tracing::debug;

use super::dispatch::Dispatcher;
use super::message::{Message, MessageType};
use super::realm::RealmState;
use super::{ClientInfo, RelayEvent};

/// Refresh the sender's liveness clock. Sweeper-originated dispatches never
/// use this type, so a missing client is simply a no-op.
pub fn heartbeat(
    _dispatcher: &Dispatcher,
    state: &mut RealmState,
    client_id: Option<&str>,
    _message: &Message,
) -> bool {
    if let Some(client) = client_id.and_then(|id| state.client_mut(id)) {
        client.set_last_ping(Instant::now());
    }
    true
}

/// Deliver, queue, or cascade one negotiation message. Never raises: every
/// branch resolves to a send, a registry mutation, or a deliberate drop.
pub fn transmission(
    dispatcher: &Dispatcher,
    state: &mut RealmState,
    client_id: Option<&str>,
    message: &Message,
) -> bool {
    let src_id = message.src.clone();
    let dst_id = message.dst.clone();

    let target = dst_id.as_deref().and_then(|id| state.client(id));
    if let Some(target) = target {
        let target_id = target.id().to_string();
        let target_room = target.room().to_string();

        if target.send(message).is_err() {
            // The destination vanished without closing its connection. Tear
            // it down and tell the sender to stop trying, through the same
            // dispatch path as any other LEAVE.
            debug!("send to {} failed, removing and cascading", target_id);
            if let Some(handle) = state.client_mut(&target_id).and_then(|c| c.take_socket()) {
                handle.close();
            }
            state.remove_client(&target_id);
            dispatcher.emit(RelayEvent::Disconnect {
                client: ClientInfo { id: target_id, room: target_room },
            });

            let leave = Message::leave(dst_id, src_id);
            dispatcher.dispatch(state, client_id, &leave);
        }
    } else {
        let ignored = matches!(message.msg_type, MessageType::Leave | MessageType::Expire);

        if !ignored && dst_id.is_some() {
            // Hold the message until the destination connects or reconnects.
            if let Some(dst) = dst_id.as_deref() {
                state.enqueue_for(dst, message.clone());
            }
        } else if message.msg_type == MessageType::Leave && dst_id.is_none() {
            // Self-announced departure: the source is removed outright, with
            // no socket-close handshake.
            if let Some(src) = src_id.as_deref() {
                if let Some(removed) = state.remove_client(src) {
                    dispatcher.emit(RelayEvent::Disconnect {
                        client: ClientInfo {
                            id: removed.id().to_string(),
                            room: removed.room().to_string(),
                        },
                    });
                }
            }
        }
        // LEAVE or EXPIRE aimed at an already-gone destination: terminal
        // notification with nobody left to deliver it to.
    }

    true
}
