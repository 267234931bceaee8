//! In-memory persistence gateway for coordinator tests.
//!
//! Records every call, keeps attendance records in a map, and can be told
//! to fail record creation or the next N commits, or to delay commits so a
//! test can act while a commit is in flight.
//!
//! # Example
//!
//! ```rust,ignore
//! use attendance_test_utils::MockAttendanceStore;
//!
//! let store = MockAttendanceStore::new()
//!     .with_course(CourseId(1), UserId(100))
//!     .fail_next_completes(1);
//! ```

use attendance_service::errors::AttendanceError;
use attendance_service::store::AttendanceStore;
use common::types::{CourseId, SessionId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock persistence gateway.
#[derive(Debug, Clone, Default)]
pub struct MockAttendanceStore {
    inner: Arc<Mutex<MockStoreInner>>,
}

#[derive(Debug, Default)]
struct MockStoreInner {
    courses: HashMap<CourseId, UserId>,
    records: HashMap<SessionId, MockRecord>,
    create_calls: usize,
    complete_calls: usize,
    fail_create: bool,
    fail_completes: u32,
    complete_delay: Option<Duration>,
}

/// One attendance record as the mock stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRecord {
    pub course_id: CourseId,
    pub teacher_id: UserId,
    pub completed: bool,
    /// Students in insertion order; duplicates are ignored.
    pub students: Vec<UserId>,
}

impl MockAttendanceStore {
    /// Create an empty store with no courses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a course taught by `teacher_id`.
    #[must_use]
    pub fn with_course(self, course_id: CourseId, teacher_id: UserId) -> Self {
        self.inner
            .lock()
            .unwrap()
            .courses
            .insert(course_id, teacher_id);
        self
    }

    /// Make every `create_active_record` call fail.
    #[must_use]
    pub fn failing_create(self) -> Self {
        self.inner.lock().unwrap().fail_create = true;
        self
    }

    /// Make the next `count` `complete_record` calls fail.
    #[must_use]
    pub fn fail_next_completes(self, count: u32) -> Self {
        self.inner.lock().unwrap().fail_completes = count;
        self
    }

    /// Delay each `complete_record` call by `delay` before it takes effect.
    #[must_use]
    pub fn with_complete_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().complete_delay = Some(delay);
        self
    }

    /// The store as the trait object the coordinator takes.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn AttendanceStore> {
        Arc::new(self.clone())
    }

    #[must_use]
    pub fn record(&self, session_id: SessionId) -> Option<MockRecord> {
        self.inner.lock().unwrap().records.get(&session_id).cloned()
    }

    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.inner.lock().unwrap().create_calls
    }

    #[must_use]
    pub fn complete_calls(&self) -> usize {
        self.inner.lock().unwrap().complete_calls
    }
}

#[async_trait::async_trait]
impl AttendanceStore for MockAttendanceStore {
    async fn course_owner(&self, course_id: CourseId) -> Result<Option<UserId>, AttendanceError> {
        Ok(self.inner.lock().unwrap().courses.get(&course_id).copied())
    }

    async fn create_active_record(
        &self,
        course_id: CourseId,
        teacher_id: UserId,
    ) -> Result<SessionId, AttendanceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls += 1;
        if inner.fail_create {
            return Err(AttendanceError::Database("injected create failure".to_string()));
        }

        let session_id = SessionId::new();
        inner.records.insert(
            session_id,
            MockRecord {
                course_id,
                teacher_id,
                completed: false,
                students: Vec::new(),
            },
        );
        Ok(session_id)
    }

    async fn complete_record(
        &self,
        session_id: SessionId,
        attendees: &[UserId],
    ) -> Result<(), AttendanceError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.complete_calls += 1;
            inner.complete_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.fail_completes > 0 {
            inner.fail_completes -= 1;
            return Err(AttendanceError::Database("injected commit failure".to_string()));
        }

        let record = inner
            .records
            .get_mut(&session_id)
            .ok_or_else(|| AttendanceError::SessionNotFound(session_id.to_string()))?;
        for student in attendees {
            if !record.students.contains(student) {
                record.students.push(*student);
            }
        }
        record.completed = true;
        Ok(())
    }
}
