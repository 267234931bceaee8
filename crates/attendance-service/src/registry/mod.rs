//! In-memory registries owned by the coordinator actor.
//!
//! None of these types are shared: the coordinator holds each one by value
//! and mutates it from its message loop only, so they carry no locks. Tests
//! construct fresh instances directly.
//!
//! - [`token`] - rotating, course-scoped, self-expiring QR tokens
//! - [`waitlist`] - students holding a valid token, not yet committed
//! - [`session`] - at most one live session per course
//! - [`timer`] - cancellable one-shot and repeating timers

pub mod session;
pub mod timer;
pub mod token;
pub mod waitlist;

pub use session::{CourseState, Session, SessionRegistry};
pub use timer::{CancellableTimer, TimerEvent};
pub use token::{IssuedToken, TokenRegistry};
pub use waitlist::{AddOutcome, PendingAttendee, Waitlist};
