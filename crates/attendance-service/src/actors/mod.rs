//! Actor implementation for the Attendance Service.
//!
//! ```text
//! AttendanceCoordinatorActor (singleton)
//! ├── owns TokenRegistry, Waitlist, SessionRegistry, connection table
//! ├── timer tasks  ──TimerEvent──▶ back into the loop
//! └── commit tasks ──CommitFinished──▶ back into the loop
//! ```
//!
//! # Modules
//!
//! - [`coordinator`] - `AttendanceCoordinatorActor` and its handle
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod coordinator;
pub mod messages;
pub mod metrics;

// Re-export primary types
pub use coordinator::{AttendanceCoordinatorActor, AttendanceCoordinatorHandle, CoordinatorConfig};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
