//! Persistence gateway for attendance records.
//!
//! The coordinator depends only on [`AttendanceStore`]; production wires in
//! [`PgAttendanceStore`], tests use the in-memory mock from
//! `attendance-test-utils`.
//!
//! Contract with the coordinator:
//! - one `create_active_record` call at session start, before any token is
//!   issued
//! - one `complete_record` call at termination that adds every attendee and
//!   marks the record completed as a single transaction
//!
//! The gateway never retries on its own.

pub mod postgres;

pub use postgres::PgAttendanceStore;

use crate::errors::AttendanceError;
use common::types::{CourseId, SessionId, UserId};

/// Durable store for attendance records.
#[async_trait::async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Teacher who owns a course, or `None` if the course does not exist.
    async fn course_owner(&self, course_id: CourseId) -> Result<Option<UserId>, AttendanceError>;

    /// Create an attendance record with status `active` and return its id.
    async fn create_active_record(
        &self,
        course_id: CourseId,
        teacher_id: UserId,
    ) -> Result<SessionId, AttendanceError>;

    /// Add attendees and mark the record `completed`, atomically.
    ///
    /// Adding a student already on the record is not an error, so the call
    /// may be repeated after a failure.
    async fn complete_record(
        &self,
        session_id: SessionId,
        attendees: &[UserId],
    ) -> Result<(), AttendanceError>;

    /// Check that the backing database answers. Used by readiness.
    async fn ping(&self) -> Result<(), AttendanceError> {
        Ok(())
    }
}
