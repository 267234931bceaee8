//! Client-facing WebSocket transport.
//!
//! `GET /ws` upgrades to a WebSocket after the user token has been checked
//! by [`auth::require_user_token`]. Each upgraded socket is bridged to the
//! coordinator by [`ws::handle_socket`].

pub mod auth;
pub mod ws;

use crate::actors::AttendanceCoordinatorHandle;
use axum::{middleware, routing::get, Router};
use common::secret::SecretString;
use std::sync::Arc;

/// Shared state for the WebSocket router.
pub struct TransportState {
    pub coordinator: AttendanceCoordinatorHandle,
    /// HS256 secret for user access tokens.
    pub jwt_secret: SecretString,
}

/// Build the router serving `/ws`.
pub fn ws_router(state: Arc<TransportState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_user_token,
        ))
        .with_state(state)
}
