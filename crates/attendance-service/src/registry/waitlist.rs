//! Pending-attendee waitlist.
//!
//! Holds students who presented a valid token but are not yet committed to
//! the attendance record. Keyed by connection: one connection holds at most
//! one entry. Presence requires staying connected until the session ends,
//! so a disconnect removes the entry.

use common::types::{ConnectionId, CourseId, SessionId, UserId};
use std::collections::HashMap;
use tokio::time::Instant;

/// A student waiting for their attendance to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttendee {
    pub connection_id: ConnectionId,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub session_id: SessionId,
    pub joined_at: Instant,
    seq: u64,
}

/// Result of [`Waitlist::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Connection already has an entry; nothing changed.
    AlreadyPending,
}

/// Volatile set of pending attendees.
#[derive(Debug, Default)]
pub struct Waitlist {
    entries: HashMap<ConnectionId, PendingAttendee>,
    next_seq: u64,
}

impl Waitlist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending attendee unless the connection already has an entry.
    pub fn add(
        &mut self,
        connection_id: ConnectionId,
        student_id: UserId,
        course_id: CourseId,
        session_id: SessionId,
    ) -> AddOutcome {
        if self.entries.contains_key(&connection_id) {
            return AddOutcome::AlreadyPending;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            connection_id.clone(),
            PendingAttendee {
                connection_id,
                student_id,
                course_id,
                session_id,
                joined_at: Instant::now(),
                seq,
            },
        );
        AddOutcome::Added
    }

    /// Remove and return every entry for a course, in join order.
    pub fn drain(&mut self, course_id: CourseId) -> Vec<PendingAttendee> {
        let connections: Vec<ConnectionId> = self
            .entries
            .values()
            .filter(|entry| entry.course_id == course_id)
            .map(|entry| entry.connection_id.clone())
            .collect();

        let mut drained: Vec<PendingAttendee> = connections
            .iter()
            .filter_map(|conn| self.entries.remove(conn))
            .collect();
        drained.sort_by_key(|entry| entry.seq);
        drained
    }

    /// Withdraw a connection's entry, if any.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<PendingAttendee> {
        self.entries.remove(connection_id)
    }

    /// Move every entry for a course onto a replacement session.
    ///
    /// Returns the connections that were carried over, in join order.
    pub fn reassign(&mut self, course_id: CourseId, session_id: SessionId) -> Vec<PendingAttendee> {
        let mut moved: Vec<PendingAttendee> = self
            .entries
            .values_mut()
            .filter(|entry| entry.course_id == course_id)
            .map(|entry| {
                entry.session_id = session_id;
                entry.clone()
            })
            .collect();
        moved.sort_by_key(|entry| entry.seq);
        moved
    }

    #[must_use]
    pub fn get(&self, connection_id: &ConnectionId) -> Option<&PendingAttendee> {
        self.entries.get(connection_id)
    }

    /// Number of pending attendees for a course.
    #[must_use]
    pub fn count_for(&self, course_id: CourseId) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.course_id == course_id)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
