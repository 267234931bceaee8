//! Per-connection WebSocket bridge.
//!
//! Each socket is split into a sink and a stream. Outbound [`ServerEvent`]s
//! arrive on an unbounded channel registered with the coordinator and are
//! forwarded by a sender task; inbound frames are parsed as
//! [`ClientMessage`] and dispatched on the receiving task.

use super::TransportState;
use crate::actors::{AttendanceCoordinatorHandle, ConnectionIdentity, EventSender};
use crate::protocol::{ClientMessage, ServerEvent};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Extension;
use common::types::ConnectionId;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

const MSG_MALFORMED: &str = "Malformed message";

/// Upgrade an authenticated request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<TransportState>>,
    Extension(identity): Extension<ConnectionIdentity>,
) -> impl IntoResponse {
    let coordinator = state.coordinator.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator, identity))
}

/// Drive one connection until either side closes it.
#[instrument(skip_all, name = "att.transport.ws", fields(user_id = %identity.user_id, role = identity.role.as_str()))]
pub async fn handle_socket(
    socket: WebSocket,
    coordinator: AttendanceCoordinatorHandle,
    identity: ConnectionIdentity,
) {
    let connection_id = ConnectionId::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ServerEvent>();

    if let Err(e) = coordinator
        .register_connection(connection_id.clone(), identity, events_tx.clone())
        .await
    {
        warn!(
            target: "att.transport.ws",
            connection_id = %connection_id,
            error = %e,
            "Failed to register connection"
        );
        return;
    }
    info!(target: "att.transport.ws", connection_id = %connection_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let sender_connection_id = connection_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        target: "att.transport.ws",
                        connection_id = %sender_connection_id,
                        error = %e,
                        "Failed to serialize event"
                    );
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                debug!(
                    target: "att.transport.ws",
                    connection_id = %sender_connection_id,
                    "WebSocket sink closed"
                );
                break;
            }
        }
    });

    let shutdown = coordinator.child_token();
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                dispatch(&coordinator, &connection_id, &events_tx, &text).await;
            }
            Some(Ok(Message::Binary(_))) => {
                reject_malformed(&events_tx, &connection_id);
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                trace!(target: "att.transport.ws", connection_id = %connection_id, "Ping/pong");
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(
                    target: "att.transport.ws",
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
        }
    }

    if let Err(e) = coordinator.connection_closed(connection_id.clone()).await {
        debug!(
            target: "att.transport.ws",
            connection_id = %connection_id,
            error = %e,
            "Coordinator unavailable during disconnect"
        );
    }
    send_task.abort();
    info!(target: "att.transport.ws", connection_id = %connection_id, "WebSocket disconnected");
}

/// Parse one text frame and forward it to the coordinator.
///
/// Rejections are reported to the client by the coordinator itself, so a
/// failed call is only logged here.
async fn dispatch(
    coordinator: &AttendanceCoordinatorHandle,
    connection_id: &ConnectionId,
    events: &EventSender,
    text: &str,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(
                target: "att.transport.ws",
                connection_id = %connection_id,
                error = %e,
                "Malformed client message"
            );
            reject_malformed(events, connection_id);
            return;
        }
    };

    let result = match message {
        ClientMessage::StartSession {
            course_id,
            duration_seconds,
        } => coordinator
            .start_session(connection_id.clone(), course_id, duration_seconds)
            .await
            .map(|_| ()),
        ClientMessage::EndSessionEarly { course_id } => {
            coordinator
                .end_session_early(connection_id.clone(), course_id)
                .await
        }
        ClientMessage::RetryCommit { session_id } => {
            coordinator
                .retry_commit(connection_id.clone(), session_id)
                .await
        }
        ClientMessage::SubmitToken { token } => coordinator
            .submit_token(connection_id.clone(), token)
            .await
            .map(|_| ()),
        ClientMessage::LeaveSession {} => coordinator
            .leave_session(connection_id.clone())
            .await
            .map(|_| ()),
    };

    if let Err(e) = result {
        debug!(
            target: "att.transport.ws",
            connection_id = %connection_id,
            error = %e,
            "Client request rejected"
        );
    }
}

fn reject_malformed(events: &EventSender, connection_id: &ConnectionId) {
    if events
        .send(ServerEvent::SessionError {
            message: MSG_MALFORMED.to_string(),
        })
        .is_err()
    {
        debug!(target: "att.transport.ws", connection_id = %connection_id, "Event channel closed");
    }
}
