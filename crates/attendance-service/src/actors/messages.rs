//! Message types for the coordinator actor.
//!
//! Requests arrive over a bounded `tokio::sync::mpsc` mailbox and are
//! answered over `tokio::sync::oneshot`. Events for a connection go out over
//! that connection's unbounded [`EventSender`].

use crate::errors::AttendanceError;
use crate::protocol::ServerEvent;
use crate::registry::CourseState;
use chrono::{DateTime, Utc};
use common::jwt::Role;
use common::types::{ConnectionId, CourseId, SessionId, UserId};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Outbound event stream for one connection.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Already-authenticated identity behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub user_id: UserId,
    pub role: Role,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Configured duration elapsed.
    Timeout,
    /// Owning teacher asked to end it.
    EndedByTeacher,
    /// Owning teacher connection closed.
    OwnerDisconnected,
    /// A new session was started for the same course.
    Replaced,
    /// Service shutdown.
    Shutdown,
}

impl TerminationReason {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Timeout => "timeout",
            TerminationReason::EndedByTeacher => "ended_by_teacher",
            TerminationReason::OwnerDisconnected => "owner_disconnected",
            TerminationReason::Replaced => "replaced",
            TerminationReason::Shutdown => "shutdown",
        }
    }
}

/// Successful token submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Added to the waitlist.
    Accepted { remaining_seconds: u64 },
    /// Connection was already waiting; not an error.
    AlreadyPending,
}

/// Messages sent to `AttendanceCoordinatorActor`.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// A connection authenticated and is ready to receive events.
    RegisterConnection {
        connection_id: ConnectionId,
        identity: ConnectionIdentity,
        events: EventSender,
        respond_to: oneshot::Sender<Result<(), AttendanceError>>,
    },

    /// A connection closed. Ends sessions it owns and withdraws its
    /// waitlist entry.
    ConnectionClosed {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<()>,
    },

    /// Teacher starts (or restarts) a session.
    StartSession {
        connection_id: ConnectionId,
        course_id: CourseId,
        duration_seconds: u64,
        respond_to: oneshot::Sender<Result<SessionId, AttendanceError>>,
    },

    /// Teacher ends a session before its duration elapses.
    EndSessionEarly {
        connection_id: ConnectionId,
        course_id: CourseId,
        respond_to: oneshot::Sender<Result<(), AttendanceError>>,
    },

    /// Student presents a scanned token.
    SubmitToken {
        connection_id: ConnectionId,
        token: String,
        respond_to: oneshot::Sender<Result<JoinOutcome, AttendanceError>>,
    },

    /// Student left the attendance page. Answers whether an entry was removed.
    LeaveSession {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Result<bool, AttendanceError>>,
    },

    /// Retry a failed commit once with the retained attendee set. Only the
    /// session's teacher may ask. Answered when the retry finishes.
    RetryCommit {
        connection_id: ConnectionId,
        session_id: SessionId,
        respond_to: oneshot::Sender<Result<(), AttendanceError>>,
    },

    /// Describe the running or terminating session for a course.
    GetSession {
        course_id: CourseId,
        respond_to: oneshot::Sender<Result<SessionInfo, AttendanceError>>,
    },

    /// Get coordinator status.
    GetStatus {
        respond_to: oneshot::Sender<CoordinatorStatus>,
    },

    /// Stop accepting sessions, terminate live ones and wait for commits.
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), AttendanceError>>,
    },
}

/// Snapshot of one course's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub course_id: CourseId,
    pub session_id: SessionId,
    pub teacher_id: UserId,
    pub state: CourseState,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
    /// Zero once terminating.
    pub remaining_seconds: u64,
    /// Waitlist size while running; committed set size while terminating.
    pub attendee_count: usize,
    pub live_tokens: usize,
}

/// Coordinator status (for health checks and operators).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub session_count: usize,
    pub connection_count: usize,
    pub pending_attendees: usize,
    pub commits_in_flight: usize,
    /// Sessions whose commit failed and can still be retried.
    pub failed_commits: Vec<SessionId>,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}
