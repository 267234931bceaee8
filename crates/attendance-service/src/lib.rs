//! Attendance Service Library
//!
//! Core of the classroom attendance tracker: a teacher starts a timed
//! session, a rotating QR token is shown on the teacher's screen, students
//! scan it to register presence, and the session closes into a persisted
//! attendance record.
//!
//! # Architecture
//!
//! ```text
//! WebSocket transport (one task pair per connection)
//! └── AttendanceCoordinatorActor (singleton)
//!     ├── TokenRegistry    - rotating, self-expiring QR tokens
//!     ├── Waitlist         - students pending commit
//!     ├── SessionRegistry  - at most one live session per course
//!     └── AttendanceStore  - durable attendance records (PostgreSQL)
//! ```
//!
//! All registry state is owned by the coordinator actor and mutated only from
//! its message loop. Timers post messages back into the loop; the store is
//! the only thing the loop waits on.
//!
//! # Modules
//!
//! - [`actors`] - Coordinator actor, its messages and mailbox metrics
//! - [`registry`] - Token, waitlist and session registries plus timers
//! - [`store`] - Persistence gateway trait and PostgreSQL implementation
//! - [`transport`] - WebSocket endpoint and user-token authentication
//! - [`protocol`] - JSON wire messages
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client-safe messages
//! - [`observability`] - Health endpoints and Prometheus metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod store;
pub mod transport;
