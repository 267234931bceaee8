//! JSON wire messages exchanged over the WebSocket.
//!
//! Both directions are internally tagged with a snake_case `type` field:
//!
//! ```json
//! {"type": "submit_token", "token": "9f2c..."}
//! {"type": "join_accepted", "remaining_seconds": 9}
//! ```

use common::types::{CourseId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Teacher: start (or restart) a session for a course.
    StartSession {
        course_id: CourseId,
        duration_seconds: u64,
    },
    /// Teacher: end a running session before its duration elapses.
    EndSessionEarly { course_id: CourseId },
    /// Teacher: retry saving a session whose commit failed.
    RetryCommit { session_id: SessionId },
    /// Student: present a scanned QR token.
    SubmitToken { token: String },
    /// Student: left the attendance page without disconnecting.
    LeaveSession {},
}

/// Events pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    // Teacher-facing
    /// New QR token to display.
    TokenRotated { course_id: CourseId, token: String },
    /// A student joined the waitlist.
    AttendeePending {
        course_id: CourseId,
        student_id: UserId,
        pending_count: usize,
    },
    SessionStarted {
        course_id: CourseId,
        session_id: SessionId,
        duration_seconds: u64,
    },
    /// Final roster after the commit attempt.
    SessionEnded {
        course_id: CourseId,
        session_id: SessionId,
        success: bool,
        attendee_count: usize,
        attendees: Vec<UserId>,
    },
    SessionError { message: String },

    // Student-facing
    JoinAccepted { remaining_seconds: u64 },
    JoinRejected { message: String },
    AlreadyPending { message: String },
    SessionCompleted { message: String },
    SessionCancelledForYou { message: String },
}

impl ServerEvent {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            ServerEvent::TokenRotated { .. } => "token_rotated",
            ServerEvent::AttendeePending { .. } => "attendee_pending",
            ServerEvent::SessionStarted { .. } => "session_started",
            ServerEvent::SessionEnded { .. } => "session_ended",
            ServerEvent::SessionError { .. } => "session_error",
            ServerEvent::JoinAccepted { .. } => "join_accepted",
            ServerEvent::JoinRejected { .. } => "join_rejected",
            ServerEvent::AlreadyPending { .. } => "already_pending",
            ServerEvent::SessionCompleted { .. } => "session_completed",
            ServerEvent::SessionCancelledForYou { .. } => "session_cancelled_for_you",
        }
    }
}
