//! User-token authentication for the WebSocket endpoint.
//!
//! Browsers cannot set headers on a WebSocket handshake, so the token is
//! read from the `token` query parameter; an `Authorization: Bearer` header
//! is accepted as well for non-browser clients.

use super::TransportState;
use crate::actors::ConnectionIdentity;
use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::verify_user_token;
use common::secret::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Authentication failure, rendered as 401.
#[derive(Debug)]
pub struct Unauthorized(&'static str);

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: "INVALID_TOKEN",
                message: self.0,
            },
        };
        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();

        if let Ok(header_value) = "Bearer realm=\"attendance\", error=\"invalid_token\"".parse() {
            response
                .headers_mut()
                .insert("WWW-Authenticate", header_value);
        }

        response
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Verify the user token and attach a [`ConnectionIdentity`] to the request.
#[instrument(skip_all, name = "att.transport.auth")]
pub async fn require_user_token(
    State(state): State<Arc<TransportState>>,
    Query(params): Query<ConnectParams>,
    mut req: Request,
    next: Next,
) -> Result<Response, Unauthorized> {
    let token = match params.token.as_deref() {
        Some(token) => token.to_string(),
        None => bearer_token(&req)
            .map(str::to_string)
            .ok_or_else(|| {
                tracing::debug!(target: "att.transport.auth", "Missing user token");
                Unauthorized("Missing access token")
            })?,
    };

    let claims = verify_user_token(&token, state.jwt_secret.expose_secret().as_bytes())
        .map_err(|_| Unauthorized("The access token is invalid or expired"))?;
    let user_id = claims
        .user_id()
        .map_err(|_| Unauthorized("The access token is invalid or expired"))?;

    req.extensions_mut().insert(ConnectionIdentity {
        user_id,
        role: claims.role,
    });

    Ok(next.run(req).await)
}
