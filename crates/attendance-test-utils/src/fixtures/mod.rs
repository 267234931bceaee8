//! Connection fixtures for coordinator tests.
//!
//! A [`TestConnection`] registers with the coordinator the way the
//! WebSocket transport does, but keeps the outbound event receiver so a test
//! can inspect what the connection was sent.

use attendance_service::actors::{AttendanceCoordinatorHandle, ConnectionIdentity};
use attendance_service::protocol::ServerEvent;
use common::jwt::Role;
use common::types::{ConnectionId, UserId};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long `recv` waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A registered connection with its event stream.
pub struct TestConnection {
    pub id: ConnectionId,
    pub user_id: UserId,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TestConnection {
    /// Register a new connection with a fresh id.
    pub async fn connect(
        handle: &AttendanceCoordinatorHandle,
        user_id: UserId,
        role: Role,
    ) -> Self {
        let id = ConnectionId::new();
        let (tx, events) = mpsc::unbounded_channel();
        handle
            .register_connection(id.clone(), ConnectionIdentity { user_id, role }, tx)
            .await
            .expect("connection registration failed");
        Self {
            id,
            user_id,
            events,
        }
    }

    pub async fn teacher(handle: &AttendanceCoordinatorHandle, user_id: UserId) -> Self {
        Self::connect(handle, user_id, Role::Teacher).await
    }

    pub async fn student(handle: &AttendanceCoordinatorHandle, user_id: UserId) -> Self {
        Self::connect(handle, user_id, Role::Student).await
    }

    /// Next event, failing the test if none arrives within [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> ServerEvent {
        tokio::time::timeout(RECV_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Skip events until one matches `predicate`.
    pub async fn wait_for(&mut self, predicate: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        loop {
            let event = self.recv().await;
            if predicate(&event) {
                return event;
            }
        }
    }

    /// Next QR token pushed to this connection.
    pub async fn next_token(&mut self) -> String {
        match self
            .wait_for(|e| matches!(e, ServerEvent::TokenRotated { .. }))
            .await
        {
            ServerEvent::TokenRotated { token, .. } => token,
            other => panic!("expected token_rotated, got {other:?}"),
        }
    }

    /// Everything already delivered, without waiting or advancing time.
    pub async fn drain(&mut self) -> Vec<ServerEvent> {
        settle().await;
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Let spawned tasks (timers, commits, the actor) run without advancing a
/// paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
