//! Session registry: at most one live session per course.
//!
//! Removal goes through [`SessionRegistry::take`]. Whoever takes the entry
//! owns the termination of that session; a second caller finds the slot
//! empty and does nothing.

use crate::registry::timer::CancellableTimer;
use chrono::{DateTime, Utc};
use common::types::{ConnectionId, CourseId, SessionId, UserId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of a course, as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseState {
    /// No session.
    Idle,
    /// A session is live and accepting joins.
    Running,
    /// The session was taken out of the registry and its commit has not
    /// completed yet.
    Terminating,
}

/// One live attendance window for a course.
#[derive(Debug)]
pub struct Session {
    pub course_id: CourseId,
    pub session_id: SessionId,
    pub teacher_id: UserId,
    /// Teacher connection that started the session.
    pub owner: ConnectionId,
    pub started_at: Instant,
    pub started_at_utc: DateTime<Utc>,
    pub duration: Duration,
    /// Most recently issued token, shown on the teacher's screen.
    pub current_token: Option<String>,
    rotation: Option<CancellableTimer>,
    expiry: Option<CancellableTimer>,
}

impl Session {
    #[must_use]
    pub fn new(
        course_id: CourseId,
        session_id: SessionId,
        teacher_id: UserId,
        owner: ConnectionId,
        duration: Duration,
    ) -> Self {
        Self {
            course_id,
            session_id,
            teacher_id,
            owner,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            duration,
            current_token: None,
            rotation: None,
            expiry: None,
        }
    }

    /// Attach the rotation and expiry timers.
    pub fn arm(&mut self, rotation: CancellableTimer, expiry: CancellableTimer) {
        self.rotation = Some(rotation);
        self.expiry = Some(expiry);
    }

    /// Cancel both timers. Idempotent.
    pub fn cancel_timers(&self) {
        if let Some(timer) = &self.rotation {
            timer.cancel();
        }
        if let Some(timer) = &self.expiry {
            timer.cancel();
        }
    }

    /// Whether timers are attached and none has been cancelled.
    #[must_use]
    pub fn timers_armed(&self) -> bool {
        matches!(
            (&self.rotation, &self.expiry),
            (Some(r), Some(e)) if !r.is_cancelled() && !e.is_cancelled()
        )
    }

    /// Scheduled termination instant.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.started_at + self.duration
    }

    /// Whole seconds until the scheduled termination, rounded to nearest,
    /// never negative.
    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        let remaining = self.deadline().saturating_duration_since(Instant::now());
        // Sub-second rounding of a duration bounded by the max session length
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = remaining.as_secs_f64().round() as u64;
        rounded
    }
}

/// Registry of live sessions keyed by course.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<CourseId, Session>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session. Returns the session it displaced, if any; callers
    /// take and terminate the previous session before installing.
    pub fn install(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.course_id, session)
    }

    #[must_use]
    pub fn get(&self, course_id: CourseId) -> Option<&Session> {
        self.sessions.get(&course_id)
    }

    /// Live session for a course only if it is the given session instance.
    pub fn get_current_mut(
        &mut self,
        course_id: CourseId,
        session_id: SessionId,
    ) -> Option<&mut Session> {
        self.sessions
            .get_mut(&course_id)
            .filter(|session| session.session_id == session_id)
    }

    /// Remove and return the session for a course.
    pub fn take(&mut self, course_id: CourseId) -> Option<Session> {
        self.sessions.remove(&course_id)
    }

    /// Courses whose session is owned by a connection.
    #[must_use]
    pub fn owned_by(&self, connection_id: &ConnectionId) -> Vec<CourseId> {
        let mut courses: Vec<CourseId> = self
            .sessions
            .values()
            .filter(|session| &session.owner == connection_id)
            .map(|session| session.course_id)
            .collect();
        courses.sort();
        courses
    }

    /// All courses with a live session.
    #[must_use]
    pub fn courses(&self) -> Vec<CourseId> {
        let mut courses: Vec<CourseId> = self.sessions.keys().copied().collect();
        courses.sort();
        courses
    }

    #[must_use]
    pub fn contains(&self, course_id: CourseId) -> bool {
        self.sessions.contains_key(&course_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
