//! Rotating QR token registry.
//!
//! A token proves "this device saw the current QR code for this course". Each
//! token is bound to one course and one session, lives for a fixed TTL, and is
//! not consumed on validation: any number of students may present the same
//! token while it is live. Duplicate joins are stopped by the waitlist.
//!
//! The TTL must exceed the rotation interval so a token scanned just before a
//! rotation tick is still accepted when it reaches the server.

use crate::errors::AttendanceError;
use crate::registry::timer::{CancellableTimer, TimerEvent};
use common::types::{CourseId, SessionId};
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Random bytes per token (128 bits, hex encoded to 32 characters).
const TOKEN_BYTES: usize = 16;

/// Course and session a valid token resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedToken {
    pub course_id: CourseId,
    pub session_id: SessionId,
    pub issued_at: Instant,
}

struct TokenEntry {
    issued: IssuedToken,
    // Posts TokenExpired when the TTL elapses; dropped on removal.
    _expiry: CancellableTimer,
}

/// Registry of live QR tokens.
pub struct TokenRegistry {
    ttl: Duration,
    rng: SystemRandom,
    tokens: HashMap<String, TokenEntry>,
    events: mpsc::UnboundedSender<TimerEvent>,
}

impl TokenRegistry {
    /// Create an empty registry whose expiry timers post into `events`.
    #[must_use]
    pub fn new(ttl: Duration, events: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            ttl,
            rng: SystemRandom::new(),
            tokens: HashMap::new(),
            events,
        }
    }

    /// Issue a new token for a session and schedule its expiry.
    ///
    /// # Errors
    ///
    /// Returns `AttendanceError::Internal` if the system RNG fails.
    pub fn issue(
        &mut self,
        course_id: CourseId,
        session_id: SessionId,
    ) -> Result<String, AttendanceError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AttendanceError::Internal("token generation failed".to_string()))?;
        let token = hex::encode(bytes);

        let events = self.events.clone();
        let expired = token.clone();
        let expiry = CancellableTimer::once(self.ttl, move || {
            let _ = events.send(TimerEvent::TokenExpired { token: expired });
        });

        self.tokens.insert(
            token.clone(),
            TokenEntry {
                issued: IssuedToken {
                    course_id,
                    session_id,
                    issued_at: Instant::now(),
                },
                _expiry: expiry,
            },
        );

        Ok(token)
    }

    /// Resolve a presented token.
    ///
    /// A token is valid only while present and younger than the TTL. The age
    /// check covers the window between the TTL elapsing and the expiry event
    /// being processed.
    #[must_use]
    pub fn validate(&self, token: &str) -> Option<IssuedToken> {
        let entry = self.tokens.get(token)?;
        if entry.issued.issued_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.issued)
    }

    /// Remove a token whose expiry timer fired. Returns whether it was present.
    pub fn expire(&mut self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    /// Remove every token for a course. Returns how many were removed.
    pub fn revoke_all(&mut self, course_id: CourseId) -> usize {
        let before = self.tokens.len();
        self.tokens
            .retain(|_, entry| entry.issued.course_id != course_id);
        let revoked = before - self.tokens.len();
        if revoked > 0 {
            debug!(
                target: "att.registry.token",
                course_id = %course_id,
                revoked,
                "Revoked course tokens"
            );
        }
        revoked
    }

    /// Number of live tokens for a course.
    #[must_use]
    pub fn count_for(&self, course_id: CourseId) -> usize {
        self.tokens
            .values()
            .filter(|entry| entry.issued.course_id == course_id)
            .count()
    }

    /// Total number of live tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
