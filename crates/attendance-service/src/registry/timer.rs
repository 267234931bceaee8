//! Cancellable timers.
//!
//! Timers never touch registry state themselves. When they fire they post a
//! [`TimerEvent`] carrying the session (or token) they were scheduled for,
//! and the coordinator decides whether the event is still current.

use common::types::{CourseId, SessionId};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Event posted by a timer back into the coordinator loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// Rotation tick for a running session.
    RotateToken {
        course_id: CourseId,
        session_id: SessionId,
    },
    /// Session reached its configured duration.
    SessionExpired {
        course_id: CourseId,
        session_id: SessionId,
    },
    /// A token reached its TTL.
    TokenExpired { token: String },
    /// A failed commit was not retried in time.
    FailedCommitExpired { session_id: SessionId },
}

/// Handle to a spawned timer task.
///
/// Cancelling is idempotent. Dropping the handle cancels the timer, so a
/// timer can never outlive the registry entry that owns it.
#[derive(Debug)]
pub struct CancellableTimer {
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl CancellableTimer {
    /// Run `fire` once after `delay`, unless cancelled first.
    pub fn once<F>(delay: Duration, fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => fire(),
            }
        });

        Self { cancel_token, task }
    }

    /// Run `tick` every `period`, first after one full period.
    pub fn repeating<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        // interval_at panics on a zero period
        let period = period.max(Duration::from_millis(1));
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => tick(),
                }
            }
        });

        Self { cancel_token, task }
    }

    /// Stop the timer. Safe to call more than once, and after it fired.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Whether `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Whether the underlying task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CancellableTimer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
