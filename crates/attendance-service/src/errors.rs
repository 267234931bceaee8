//! Attendance Service error types.
//!
//! Every error maps to a numeric code and a client-safe message. Internal
//! details (SQL errors, channel failures) are logged server-side and never
//! sent to a connection.

use common::types::CourseId;
use thiserror::Error;

/// Attendance Service error type.
///
/// Maps to protocol error codes:
/// - `InvalidRequest`: `BAD_REQUEST` (1)
/// - `InvalidToken`: `UNAUTHORIZED` (2)
/// - `PermissionDenied`: `FORBIDDEN` (3)
/// - `CourseNotFound`, `SessionNotActive`, `SessionNotFound`, `UnknownConnection`: `NOT_FOUND` (4)
/// - `Conflict`: `CONFLICT` (5)
/// - `Database`, `Internal`: `INTERNAL_ERROR` (6)
/// - `Draining`: `UNAVAILABLE` (7)
#[derive(Debug, Error)]
pub enum AttendanceError {
    /// Persistence gateway operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Course does not exist.
    #[error("Course not found: {0}")]
    CourseNotFound(CourseId),

    /// Requester may not perform this operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed or out-of-range request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Presented QR token is unknown or past its TTL.
    #[error("Invalid or expired QR token")]
    InvalidToken,

    /// Token resolved, but its session is no longer running.
    #[error("Attendance session is not active")]
    SessionNotActive,

    /// No session (running or awaiting retry) with this identifier.
    #[error("Attendance session not found: {0}")]
    SessionNotFound(String),

    /// Operation conflicts with current state (e.g. commit already in flight).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Connection was never registered with the coordinator, or already closed.
    #[error("Unknown connection")]
    UnknownConnection,

    /// Coordinator is shutting down and does not accept new sessions.
    #[error("Coordinator is draining")]
    Draining,

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AttendanceError {
    /// Returns the protocol error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            AttendanceError::InvalidRequest(_) => 1, // BAD_REQUEST
            AttendanceError::InvalidToken => 2,      // UNAUTHORIZED
            AttendanceError::PermissionDenied(_) => 3, // FORBIDDEN
            AttendanceError::CourseNotFound(_)
            | AttendanceError::SessionNotActive
            | AttendanceError::SessionNotFound(_)
            | AttendanceError::UnknownConnection => 4, // NOT_FOUND
            AttendanceError::Conflict(_) => 5,       // CONFLICT
            AttendanceError::Database(_) | AttendanceError::Internal(_) => 6, // INTERNAL_ERROR
            AttendanceError::Draining => 7,          // UNAVAILABLE
        }
    }

    /// Returns a bounded label string for the error variant (for metrics).
    ///
    /// Uses enum variant names, not error message content.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            AttendanceError::Database(_) => "database",
            AttendanceError::CourseNotFound(_) => "course_not_found",
            AttendanceError::PermissionDenied(_) => "permission_denied",
            AttendanceError::InvalidRequest(_) => "invalid_request",
            AttendanceError::InvalidToken => "invalid_token",
            AttendanceError::SessionNotActive => "session_not_active",
            AttendanceError::SessionNotFound(_) => "session_not_found",
            AttendanceError::Conflict(_) => "conflict",
            AttendanceError::UnknownConnection => "unknown_connection",
            AttendanceError::Draining => "draining",
            AttendanceError::Internal(_) => "internal",
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            AttendanceError::Database(_) | AttendanceError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            AttendanceError::CourseNotFound(_) => "Course not found".to_string(),
            AttendanceError::InvalidToken => "Invalid or expired QR code".to_string(),
            AttendanceError::SessionNotActive => {
                "There is no active attendance session for this course".to_string()
            }
            AttendanceError::SessionNotFound(_) => "Attendance session not found".to_string(),
            AttendanceError::UnknownConnection => "Connection is not registered".to_string(),
            AttendanceError::Draining => "Server is shutting down, please reconnect".to_string(),
            AttendanceError::PermissionDenied(msg)
            | AttendanceError::InvalidRequest(msg)
            | AttendanceError::Conflict(msg) => msg.clone(),
        }
    }
}

/// Convert sqlx errors to `AttendanceError`
impl From<sqlx::Error> for AttendanceError {
    fn from(err: sqlx::Error) -> Self {
        AttendanceError::Database(err.to_string())
    }
}
