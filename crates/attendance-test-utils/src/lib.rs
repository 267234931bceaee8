//! # Attendance Test Utilities
//!
//! Shared test utilities for the Attendance Service.
//!
//! - `mock_store` - In-memory persistence gateway with failure injection
//! - `fixtures` - Connection fixtures and a paused-clock `settle` helper
//!
//! ## Usage
//!
//! ```rust,ignore
//! use attendance_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let store = MockAttendanceStore::new().with_course(CourseId(1), UserId(100));
//!     let handle = AttendanceCoordinatorHandle::new(
//!         CoordinatorConfig::default(),
//!         store.shared(),
//!         ActorMetrics::new(),
//!     );
//!
//!     let mut teacher = TestConnection::teacher(&handle, UserId(100)).await;
//!     handle.start_session(teacher.id.clone(), CourseId(1), 60).await.unwrap();
//!     let token = teacher.next_token().await;
//! }
//! ```

pub mod fixtures;
pub mod mock_store;

pub use fixtures::*;
pub use mock_store::*;
