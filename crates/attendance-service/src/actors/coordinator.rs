//! `AttendanceCoordinatorActor` - the live attendance-session state machine.
//!
//! Singleton per service instance. Owns the token registry, the waitlist,
//! the session registry and the connection table; every mutation of them
//! happens inside [`AttendanceCoordinatorActor::run`], so none of them need
//! locks.
//!
//! Per course the state is `Idle -> Running -> Terminating -> Idle`:
//!
//! - `Running`: a [`Session`] is installed in the session registry.
//! - `Terminating`: the session was taken out of the registry and its
//!   attendees are in the commit table while the store call runs on a
//!   spawned task.
//!
//! Termination starts with `SessionRegistry::take`. Whichever trigger takes
//! the session (timer, teacher, disconnect, shutdown) performs the drain and
//! the single commit; later triggers find the slot empty and do nothing.
//! The take happens before the commit is issued, so a second trigger that
//! arrives while the store call is outstanding is still a no-op.
//!
//! # Graceful Shutdown
//!
//! On shutdown the coordinator:
//! 1. Sets `accepting_new = false`
//! 2. Terminates every running session (so attendance is committed)
//! 3. Waits, bounded by the deadline, for in-flight commits
//! 4. Cancels the root `CancellationToken`

use crate::config::Config;
use crate::errors::AttendanceError;
use crate::observability::metrics as prom;
use crate::protocol::ServerEvent;
use crate::registry::{
    AddOutcome, CancellableTimer, CourseState, PendingAttendee, Session, SessionRegistry,
    TimerEvent, TokenRegistry, Waitlist,
};
use crate::store::AttendanceStore;

use super::messages::{
    ConnectionIdentity, CoordinatorMessage, CoordinatorStatus, EventSender, JoinOutcome,
    SessionInfo, TerminationReason,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use chrono::{DateTime, Utc};
use common::jwt::Role;
use common::types::{ConnectionId, CourseId, SessionId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the coordinator mailbox.
const COORDINATOR_CHANNEL_BUFFER: usize = 1000;

/// How long an externally cancelled coordinator waits for in-flight commits.
const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// A failed commit may be retried once.
const MAX_COMMIT_ATTEMPTS: u32 = 2;

const MSG_ALREADY_PENDING: &str = "You are already on the attendance list for this session";
const MSG_LEFT_PAGE: &str = "You left the attendance page; your attendance was not recorded";
const MSG_COMPLETED: &str = "Your attendance has been recorded";
const MSG_COMMIT_FAILED: &str = "Attendance could not be saved";
const MSG_RESTARTED_ELSEWHERE: &str = "This attendance session was restarted from another window";

/// Coordinator tunables.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Instance identifier for logs and the mailbox monitor.
    pub instance_id: String,
    /// Interval between QR tokens.
    pub rotation_interval: Duration,
    /// Lifetime of a QR token. Must exceed `rotation_interval`.
    pub token_ttl: Duration,
    /// Longest session a teacher may start.
    pub max_session_seconds: u64,
    /// How long a failed commit waits for a retry before it is discarded.
    pub failed_commit_retention: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            instance_id: "att-local".to_string(),
            rotation_interval: Duration::from_millis(crate::config::DEFAULT_ROTATION_INTERVAL_MS),
            token_ttl: Duration::from_millis(crate::config::DEFAULT_TOKEN_TTL_MS),
            max_session_seconds: crate::config::DEFAULT_MAX_SESSION_SECONDS,
            failed_commit_retention: Duration::from_secs(
                crate::config::DEFAULT_FAILED_COMMIT_RETENTION_SECONDS,
            ),
        }
    }
}

impl From<&Config> for CoordinatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            instance_id: config.instance_id.clone(),
            rotation_interval: config.rotation_interval,
            token_ttl: config.token_ttl,
            max_session_seconds: config.max_session_seconds,
            failed_commit_retention: config.failed_commit_retention,
        }
    }
}

/// Handle to the `AttendanceCoordinatorActor`.
///
/// Cheap to clone; every WebSocket connection holds one.
#[derive(Clone)]
pub struct AttendanceCoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    cancel_token: CancellationToken,
}

impl AttendanceCoordinatorHandle {
    /// Create a new coordinator actor and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn AttendanceStore>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        Self::spawn(config, store, metrics).0
    }

    /// Like [`AttendanceCoordinatorHandle::new`], also returning the actor's
    /// task handle so callers can wait for it to stop.
    #[must_use]
    pub fn spawn(
        config: CoordinatorConfig,
        store: Arc<dyn AttendanceStore>,
        metrics: Arc<ActorMetrics>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COORDINATOR_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = AttendanceCoordinatorActor::new(
            config,
            receiver,
            cancel_token.clone(),
            store,
            metrics,
        );

        let task_handle = tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMessage,
    ) -> Result<T, AttendanceError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| AttendanceError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| AttendanceError::Internal(format!("response receive failed: {e}")))
    }

    /// Register an authenticated connection and its outbound event stream.
    pub async fn register_connection(
        &self,
        connection_id: ConnectionId,
        identity: ConnectionIdentity,
        events: EventSender,
    ) -> Result<(), AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::RegisterConnection {
            connection_id,
            identity,
            events,
            respond_to,
        })
        .await?
    }

    /// Report that a connection closed.
    pub async fn connection_closed(
        &self,
        connection_id: ConnectionId,
    ) -> Result<(), AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::ConnectionClosed {
            connection_id,
            respond_to,
        })
        .await
    }

    /// Start a session for a course, replacing any running one.
    pub async fn start_session(
        &self,
        connection_id: ConnectionId,
        course_id: CourseId,
        duration_seconds: u64,
    ) -> Result<SessionId, AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::StartSession {
            connection_id,
            course_id,
            duration_seconds,
            respond_to,
        })
        .await?
    }

    /// End a running session. Only its owning connection may do this.
    pub async fn end_session_early(
        &self,
        connection_id: ConnectionId,
        course_id: CourseId,
    ) -> Result<(), AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::EndSessionEarly {
            connection_id,
            course_id,
            respond_to,
        })
        .await?
    }

    /// Present a scanned QR token.
    pub async fn submit_token(
        &self,
        connection_id: ConnectionId,
        token: String,
    ) -> Result<JoinOutcome, AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::SubmitToken {
            connection_id,
            token,
            respond_to,
        })
        .await?
    }

    /// Withdraw a connection from the waitlist without disconnecting.
    pub async fn leave_session(&self, connection_id: ConnectionId) -> Result<bool, AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::LeaveSession {
            connection_id,
            respond_to,
        })
        .await?
    }

    /// Retry a failed commit once on behalf of the session's teacher.
    /// Resolves when the retry finishes; the final roster goes to the
    /// requesting connection.
    pub async fn retry_commit(
        &self,
        connection_id: ConnectionId,
        session_id: SessionId,
    ) -> Result<(), AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::RetryCommit {
            connection_id,
            session_id,
            respond_to,
        })
        .await?
    }

    /// Describe the running or terminating session for a course.
    pub async fn get_session(&self, course_id: CourseId) -> Result<SessionInfo, AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::GetSession {
            course_id,
            respond_to,
        })
        .await?
    }

    /// Get the current coordinator status.
    pub async fn get_status(&self) -> Result<CoordinatorStatus, AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::GetStatus { respond_to })
            .await
    }

    /// Terminate all sessions, wait for their commits (up to `deadline`),
    /// then stop the actor.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), AttendanceError> {
        self.request(|respond_to| CoordinatorMessage::Shutdown {
            deadline,
            respond_to,
        })
        .await?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Child token for tasks that must stop with the coordinator.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// A registered connection.
struct ConnectionEntry {
    identity: ConnectionIdentity,
    events: EventSender,
}

enum CommitState {
    InFlight {
        /// Set when an administrative retry is waiting for the outcome.
        respond_to: Option<oneshot::Sender<Result<(), AttendanceError>>>,
    },
    /// Last attempt failed; attendees retained for a retry.
    Failed,
}

/// A terminated session whose attendees are not yet durable.
struct PendingCommit {
    course_id: CourseId,
    teacher_id: UserId,
    owner: ConnectionId,
    started_at_utc: DateTime<Utc>,
    duration: Duration,
    reason: TerminationReason,
    attendees: Vec<PendingAttendee>,
    attempts: u32,
    state: CommitState,
    // Discards the set if no retry arrives; dropped when a retry starts.
    retention: Option<CancellableTimer>,
}

impl PendingCommit {
    fn is_in_flight(&self) -> bool {
        matches!(self.state, CommitState::InFlight { .. })
    }

    /// Distinct students in waitlist order. A student on two connections
    /// has two waitlist entries but is one attendee.
    fn student_ids(&self) -> Vec<UserId> {
        let mut seen = HashSet::new();
        self.attendees
            .iter()
            .map(|a| a.student_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Outcome of a store commit, posted back by the commit task.
struct CommitFinished {
    session_id: SessionId,
    result: Result<(), AttendanceError>,
}

/// The `AttendanceCoordinatorActor` implementation.
pub struct AttendanceCoordinatorActor {
    config: CoordinatorConfig,
    receiver: mpsc::Receiver<CoordinatorMessage>,
    cancel_token: CancellationToken,
    store: Arc<dyn AttendanceStore>,
    tokens: TokenRegistry,
    waitlist: Waitlist,
    sessions: SessionRegistry,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    commits: HashMap<SessionId, PendingCommit>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    commit_tx: mpsc::UnboundedSender<CommitFinished>,
    commit_rx: mpsc::UnboundedReceiver<CommitFinished>,
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl AttendanceCoordinatorActor {
    fn new(
        config: CoordinatorConfig,
        receiver: mpsc::Receiver<CoordinatorMessage>,
        cancel_token: CancellationToken,
        store: Arc<dyn AttendanceStore>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        let mailbox = MailboxMonitor::new(ActorType::Coordinator, &config.instance_id);

        Self {
            tokens: TokenRegistry::new(config.token_ttl, timer_tx.clone()),
            waitlist: Waitlist::new(),
            sessions: SessionRegistry::new(),
            connections: HashMap::new(),
            commits: HashMap::new(),
            config,
            receiver,
            cancel_token,
            store,
            timer_tx,
            timer_rx,
            commit_tx,
            commit_rx,
            accepting_new: true,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    ///
    /// Commit results are handled before timer events, and both before client
    /// messages, so a status query observes every event already delivered.
    #[instrument(skip_all, name = "att.actor.coordinator", fields(instance_id = %self.config.instance_id))]
    async fn run(mut self) {
        info!(
            target: "att.actor.coordinator",
            instance_id = %self.config.instance_id,
            rotation_interval_ms = self.config.rotation_interval.as_millis(),
            token_ttl_ms = self.config.token_ttl.as_millis(),
            "AttendanceCoordinatorActor started"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "att.actor.coordinator",
                        instance_id = %self.config.instance_id,
                        "AttendanceCoordinatorActor received cancellation signal"
                    );
                    self.shutdown_sessions(DEFAULT_SHUTDOWN_DEADLINE).await;
                    break;
                }

                Some(finished) = self.commit_rx.recv() => {
                    self.handle_commit_finished(finished);
                }

                Some(event) = self.timer_rx.recv() => {
                    self.handle_timer_event(event);
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_depth(self.receiver.len());
                            self.handle_message(message).await;
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "att.actor.coordinator",
                                instance_id = %self.config.instance_id,
                                "AttendanceCoordinatorActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "att.actor.coordinator",
            instance_id = %self.config.instance_id,
            sessions_remaining = self.sessions.len(),
            commits_remaining = self.commits.len(),
            messages_processed = self.mailbox.messages_processed(),
            "AttendanceCoordinatorActor stopped"
        );
    }

    async fn handle_message(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::RegisterConnection {
                connection_id,
                identity,
                events,
                respond_to,
            } => {
                let result = self.register_connection(connection_id, identity, events);
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::ConnectionClosed {
                connection_id,
                respond_to,
            } => {
                self.connection_closed(&connection_id);
                let _ = respond_to.send(());
            }

            CoordinatorMessage::StartSession {
                connection_id,
                course_id,
                duration_seconds,
                respond_to,
            } => {
                let result = self
                    .start_session(&connection_id, course_id, duration_seconds)
                    .await;
                if let Err(e) = &result {
                    prom::record_error("start_session", e.error_type_label());
                    self.send_to(
                        &connection_id,
                        ServerEvent::SessionError {
                            message: e.client_message(),
                        },
                    );
                }
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::EndSessionEarly {
                connection_id,
                course_id,
                respond_to,
            } => {
                let result = self.end_session_early(&connection_id, course_id);
                if let Err(e) = &result {
                    prom::record_error("end_session_early", e.error_type_label());
                    self.send_to(
                        &connection_id,
                        ServerEvent::SessionError {
                            message: e.client_message(),
                        },
                    );
                }
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::SubmitToken {
                connection_id,
                token,
                respond_to,
            } => {
                let result = self.submit_token(&connection_id, &token);
                if let Err(e) = &result {
                    self.send_to(
                        &connection_id,
                        ServerEvent::JoinRejected {
                            message: e.client_message(),
                        },
                    );
                }
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::LeaveSession {
                connection_id,
                respond_to,
            } => {
                let result = self.leave_session(&connection_id);
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::RetryCommit {
                connection_id,
                session_id,
                respond_to,
            } => {
                match self.authorize_retry(&connection_id, session_id) {
                    Ok(()) => self.retry_commit(&connection_id, session_id, respond_to),
                    Err(e) => {
                        prom::record_error("retry_commit", e.error_type_label());
                        self.send_to(
                            &connection_id,
                            ServerEvent::SessionError {
                                message: e.client_message(),
                            },
                        );
                        let _ = respond_to.send(Err(e));
                    }
                }
            }

            CoordinatorMessage::GetSession {
                course_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_session(course_id));
            }

            CoordinatorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            CoordinatorMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline).await;
                let _ = respond_to.send(result);
            }
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    fn register_connection(
        &mut self,
        connection_id: ConnectionId,
        identity: ConnectionIdentity,
        events: EventSender,
    ) -> Result<(), AttendanceError> {
        if self.connections.contains_key(&connection_id) {
            return Err(AttendanceError::Conflict(
                "Connection already registered".to_string(),
            ));
        }

        debug!(
            target: "att.actor.coordinator",
            connection_id = %connection_id,
            user_id = %identity.user_id,
            role = identity.role.as_str(),
            "Connection registered"
        );

        self.connections
            .insert(connection_id, ConnectionEntry { identity, events });
        self.metrics.set_connections(self.connections.len());
        Ok(())
    }

    /// Teacher disconnect ends owned sessions; student disconnect withdraws
    /// the waitlist entry. Closing an unknown connection is a no-op.
    fn connection_closed(&mut self, connection_id: &ConnectionId) {
        let Some(entry) = self.connections.remove(connection_id) else {
            return;
        };
        self.metrics.set_connections(self.connections.len());

        if let Some(pending) = self.waitlist.remove(connection_id) {
            debug!(
                target: "att.actor.coordinator",
                connection_id = %connection_id,
                course_id = %pending.course_id,
                "Pending attendee withdrawn on disconnect"
            );
            // Best effort; the socket is normally gone already
            let _ = entry.events.send(ServerEvent::SessionCancelledForYou {
                message: MSG_LEFT_PAGE.to_string(),
            });
        }

        for course_id in self.sessions.owned_by(connection_id) {
            info!(
                target: "att.actor.coordinator",
                connection_id = %connection_id,
                course_id = %course_id,
                "Session owner disconnected, terminating session"
            );
            self.terminate(course_id, TerminationReason::OwnerDisconnected);
        }
    }

    fn send_to(&self, connection_id: &ConnectionId, event: ServerEvent) {
        if let Some(entry) = self.connections.get(connection_id) {
            let kind = event.kind();
            if entry.events.send(event).is_err() {
                debug!(
                    target: "att.actor.coordinator",
                    connection_id = %connection_id,
                    event = kind,
                    "Dropping event for closed connection"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Session start
    // ------------------------------------------------------------------

    async fn start_session(
        &mut self,
        connection_id: &ConnectionId,
        course_id: CourseId,
        duration_seconds: u64,
    ) -> Result<SessionId, AttendanceError> {
        if !self.accepting_new {
            return Err(AttendanceError::Draining);
        }

        let identity = self
            .connections
            .get(connection_id)
            .map(|entry| entry.identity)
            .ok_or(AttendanceError::UnknownConnection)?;

        if identity.role != Role::Teacher {
            return Err(AttendanceError::PermissionDenied(
                "Only teachers can start an attendance session".to_string(),
            ));
        }

        if duration_seconds == 0 || duration_seconds > self.config.max_session_seconds {
            return Err(AttendanceError::InvalidRequest(format!(
                "Session duration must be between 1 and {} seconds",
                self.config.max_session_seconds
            )));
        }

        let owner = self.store.course_owner(course_id).await?;
        match owner {
            None => return Err(AttendanceError::CourseNotFound(course_id)),
            Some(teacher_id) if teacher_id != identity.user_id => {
                warn!(
                    target: "att.actor.coordinator",
                    course_id = %course_id,
                    user_id = %identity.user_id,
                    "Start rejected: requester does not teach this course"
                );
                return Err(AttendanceError::PermissionDenied(
                    "You are not the teacher of this course".to_string(),
                ));
            }
            Some(_) => {}
        }

        // The record must exist before any token is issued
        let session_id = self
            .store
            .create_active_record(course_id, identity.user_id)
            .await
            .map_err(|e| {
                error!(
                    target: "att.actor.coordinator",
                    course_id = %course_id,
                    error = %e,
                    "Failed to create attendance record, session not started"
                );
                e
            })?;

        // The previous session's tokens are revoked before the first new one
        // is issued
        if let Some(previous) = self.sessions.take(course_id) {
            self.supersede(previous, session_id, connection_id);
        }

        let mut session = Session::new(
            course_id,
            session_id,
            identity.user_id,
            connection_id.clone(),
            Duration::from_secs(duration_seconds),
        );
        let first_token = self.tokens.issue(course_id, session_id)?;
        session.current_token = Some(first_token.clone());
        session.arm(
            self.rotation_timer(course_id, session_id),
            self.expiry_timer(course_id, session_id, session.duration),
        );
        self.sessions.install(session);

        prom::record_session_started();
        prom::record_token_issued();
        self.metrics.set_sessions(self.sessions.len());

        info!(
            target: "att.actor.coordinator",
            course_id = %course_id,
            session_id = %session_id,
            duration_seconds,
            "Attendance session started"
        );

        self.send_to(
            connection_id,
            ServerEvent::SessionStarted {
                course_id,
                session_id,
                duration_seconds,
            },
        );
        self.send_to(
            connection_id,
            ServerEvent::TokenRotated {
                course_id,
                token: first_token,
            },
        );

        self.carry_over_waitlist(course_id, session_id, duration_seconds, connection_id);

        Ok(session_id)
    }

    fn rotation_timer(&self, course_id: CourseId, session_id: SessionId) -> CancellableTimer {
        let events = self.timer_tx.clone();
        CancellableTimer::repeating(self.config.rotation_interval, move || {
            let _ = events.send(TimerEvent::RotateToken {
                course_id,
                session_id,
            });
        })
    }

    fn expiry_timer(
        &self,
        course_id: CourseId,
        session_id: SessionId,
        duration: Duration,
    ) -> CancellableTimer {
        let events = self.timer_tx.clone();
        CancellableTimer::once(duration, move || {
            let _ = events.send(TimerEvent::SessionExpired {
                course_id,
                session_id,
            });
        })
    }

    /// Force-end a session being replaced by a restart for the same course.
    ///
    /// Timers and tokens go with it. Its record receives no commit; the
    /// waitlist stays and is carried into the replacement session.
    fn supersede(
        &mut self,
        previous: Session,
        new_session_id: SessionId,
        new_owner: &ConnectionId,
    ) {
        previous.cancel_timers();
        let revoked = self.tokens.revoke_all(previous.course_id);

        prom::record_session_terminated(TerminationReason::Replaced.as_str());

        info!(
            target: "att.actor.coordinator",
            course_id = %previous.course_id,
            old_session_id = %previous.session_id,
            new_session_id = %new_session_id,
            tokens_revoked = revoked,
            "Attendance session replaced by restart"
        );

        if previous.owner != *new_owner {
            self.send_to(
                &previous.owner,
                ServerEvent::SessionError {
                    message: MSG_RESTARTED_ELSEWHERE.to_string(),
                },
            );
        }
    }

    fn carry_over_waitlist(
        &mut self,
        course_id: CourseId,
        session_id: SessionId,
        duration_seconds: u64,
        owner: &ConnectionId,
    ) {
        let carried = self.waitlist.reassign(course_id, session_id);
        for (index, attendee) in carried.iter().enumerate() {
            self.send_to(
                &attendee.connection_id,
                ServerEvent::JoinAccepted {
                    remaining_seconds: duration_seconds,
                },
            );
            self.send_to(
                owner,
                ServerEvent::AttendeePending {
                    course_id,
                    student_id: attendee.student_id,
                    pending_count: index + 1,
                },
            );
        }
    }

    // ------------------------------------------------------------------
    // Joins
    // ------------------------------------------------------------------

    fn submit_token(
        &mut self,
        connection_id: &ConnectionId,
        token: &str,
    ) -> Result<JoinOutcome, AttendanceError> {
        let identity = self
            .connections
            .get(connection_id)
            .map(|entry| entry.identity)
            .ok_or(AttendanceError::UnknownConnection)?;

        if identity.role != Role::Student {
            prom::record_join_attempt("rejected");
            return Err(AttendanceError::PermissionDenied(
                "Only students can register attendance".to_string(),
            ));
        }

        // Routine near rotation boundaries, so debug only
        let Some(issued) = self.tokens.validate(token) else {
            debug!(
                target: "att.actor.coordinator",
                connection_id = %connection_id,
                "Join rejected: invalid or expired token"
            );
            prom::record_join_attempt("invalid_token");
            return Err(AttendanceError::InvalidToken);
        };

        let Some(session) = self
            .sessions
            .get(issued.course_id)
            .filter(|session| session.session_id == issued.session_id)
        else {
            debug!(
                target: "att.actor.coordinator",
                connection_id = %connection_id,
                course_id = %issued.course_id,
                "Join rejected: session no longer active"
            );
            prom::record_join_attempt("session_not_active");
            return Err(AttendanceError::SessionNotActive);
        };
        let remaining_seconds = session.remaining_seconds();
        let owner = session.owner.clone();

        match self.waitlist.add(
            connection_id.clone(),
            identity.user_id,
            issued.course_id,
            issued.session_id,
        ) {
            AddOutcome::AlreadyPending => {
                prom::record_join_attempt("already_pending");
                self.send_to(
                    connection_id,
                    ServerEvent::AlreadyPending {
                        message: MSG_ALREADY_PENDING.to_string(),
                    },
                );
                Ok(JoinOutcome::AlreadyPending)
            }
            AddOutcome::Added => {
                prom::record_join_attempt("accepted");
                debug!(
                    target: "att.actor.coordinator",
                    connection_id = %connection_id,
                    course_id = %issued.course_id,
                    remaining_seconds,
                    "Student added to waitlist"
                );
                self.send_to(connection_id, ServerEvent::JoinAccepted { remaining_seconds });
                self.send_to(
                    &owner,
                    ServerEvent::AttendeePending {
                        course_id: issued.course_id,
                        student_id: identity.user_id,
                        pending_count: self.waitlist.count_for(issued.course_id),
                    },
                );
                Ok(JoinOutcome::Accepted { remaining_seconds })
            }
        }
    }

    fn leave_session(&mut self, connection_id: &ConnectionId) -> Result<bool, AttendanceError> {
        if !self.connections.contains_key(connection_id) {
            return Err(AttendanceError::UnknownConnection);
        }

        let Some(pending) = self.waitlist.remove(connection_id) else {
            return Ok(false);
        };

        debug!(
            target: "att.actor.coordinator",
            connection_id = %connection_id,
            course_id = %pending.course_id,
            "Pending attendee left the page"
        );
        self.send_to(
            connection_id,
            ServerEvent::SessionCancelledForYou {
                message: MSG_LEFT_PAGE.to_string(),
            },
        );
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn handle_timer_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::RotateToken {
                course_id,
                session_id,
            } => self.rotate_token(course_id, session_id),

            TimerEvent::SessionExpired {
                course_id,
                session_id,
            } => {
                let current = self
                    .sessions
                    .get(course_id)
                    .is_some_and(|session| session.session_id == session_id);
                if current {
                    self.terminate(course_id, TerminationReason::Timeout);
                } else {
                    debug!(
                        target: "att.actor.coordinator",
                        course_id = %course_id,
                        session_id = %session_id,
                        "Ignoring expiry for a session that already ended"
                    );
                }
            }

            TimerEvent::TokenExpired { token } => {
                self.tokens.expire(&token);
            }

            TimerEvent::FailedCommitExpired { session_id } => {
                self.discard_failed_commit(session_id);
            }
        }
    }

    fn rotate_token(&mut self, course_id: CourseId, session_id: SessionId) {
        if self.sessions.get(course_id).map(|s| s.session_id) != Some(session_id) {
            debug!(
                target: "att.actor.coordinator",
                course_id = %course_id,
                session_id = %session_id,
                "Ignoring rotation tick for a session that already ended"
            );
            return;
        }

        let token = match self.tokens.issue(course_id, session_id) {
            Ok(token) => token,
            Err(e) => {
                error!(
                    target: "att.actor.coordinator",
                    course_id = %course_id,
                    error = %e,
                    "Token rotation failed"
                );
                prom::record_error("rotate_token", e.error_type_label());
                return;
            }
        };
        prom::record_token_issued();

        if let Some(session) = self.sessions.get_current_mut(course_id, session_id) {
            session.current_token = Some(token.clone());
            let owner = session.owner.clone();
            self.send_to(&owner, ServerEvent::TokenRotated { course_id, token });
        }
    }

    // ------------------------------------------------------------------
    // Termination and commit
    // ------------------------------------------------------------------

    fn end_session_early(
        &mut self,
        connection_id: &ConnectionId,
        course_id: CourseId,
    ) -> Result<(), AttendanceError> {
        if !self.connections.contains_key(connection_id) {
            return Err(AttendanceError::UnknownConnection);
        }

        match self.sessions.get(course_id) {
            Some(session) if &session.owner == connection_id => {}
            Some(_) => {
                warn!(
                    target: "att.actor.coordinator",
                    connection_id = %connection_id,
                    course_id = %course_id,
                    "Unauthorized attempt to end attendance session"
                );
                return Err(AttendanceError::PermissionDenied(
                    "Only the teacher who started this session can end it".to_string(),
                ));
            }
            // Already terminating: the earlier trigger owns the commit
            None if self.course_state(course_id) == CourseState::Terminating => return Ok(()),
            None => return Err(AttendanceError::SessionNotActive),
        }

        self.terminate(course_id, TerminationReason::EndedByTeacher);
        Ok(())
    }

    /// Terminate the running session for a course.
    ///
    /// Returns `false` if there was nothing to terminate, which is the
    /// expected outcome for the losing side of a termination race.
    fn terminate(&mut self, course_id: CourseId, reason: TerminationReason) -> bool {
        let Some(session) = self.sessions.take(course_id) else {
            debug!(
                target: "att.actor.coordinator",
                course_id = %course_id,
                reason = reason.as_str(),
                "Termination skipped, no running session"
            );
            return false;
        };

        session.cancel_timers();
        let revoked = self.tokens.revoke_all(course_id);
        let attendees = self.waitlist.drain(course_id);

        prom::record_session_terminated(reason.as_str());
        self.metrics.set_sessions(self.sessions.len());

        info!(
            target: "att.actor.coordinator",
            course_id = %course_id,
            session_id = %session.session_id,
            reason = reason.as_str(),
            attendee_count = attendees.len(),
            tokens_revoked = revoked,
            "Attendance session terminating"
        );

        let pending = PendingCommit {
            course_id,
            teacher_id: session.teacher_id,
            owner: session.owner.clone(),
            started_at_utc: session.started_at_utc,
            duration: session.duration,
            reason,
            attendees,
            attempts: 1,
            state: CommitState::InFlight { respond_to: None },
            retention: None,
        };
        let students = pending.student_ids();
        self.commits.insert(session.session_id, pending);
        self.spawn_commit(session.session_id, students);
        true
    }

    /// Run the store commit off the actor loop and post the result back.
    fn spawn_commit(&self, session_id: SessionId, students: Vec<UserId>) {
        let store = Arc::clone(&self.store);
        let results = self.commit_tx.clone();
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            let task =
                tokio::spawn(async move { store.complete_record(session_id, &students).await });
            let result = match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    if join_error.is_panic() {
                        metrics.record_panic(ActorType::Coordinator);
                    }
                    Err(AttendanceError::Internal(format!(
                        "commit task failed: {join_error}"
                    )))
                }
            };
            let _ = results.send(CommitFinished { session_id, result });
        });

        self.metrics.set_commits_in_flight(self.in_flight_commits());
    }

    fn handle_commit_finished(&mut self, finished: CommitFinished) {
        let CommitFinished { session_id, result } = finished;
        let Some(mut pending) = self.commits.remove(&session_id) else {
            warn!(
                target: "att.actor.coordinator",
                session_id = %session_id,
                "Commit finished for unknown session"
            );
            return;
        };

        let respond_to = match &mut pending.state {
            CommitState::InFlight { respond_to } => respond_to.take(),
            CommitState::Failed => None,
        };
        let attendee_ids = pending.student_ids();

        match result {
            Ok(()) => {
                prom::record_commit("success");
                info!(
                    target: "att.actor.coordinator",
                    course_id = %pending.course_id,
                    session_id = %session_id,
                    reason = pending.reason.as_str(),
                    attendee_count = attendee_ids.len(),
                    attempt = pending.attempts,
                    "Attendance committed"
                );

                for attendee in &pending.attendees {
                    self.send_to(
                        &attendee.connection_id,
                        ServerEvent::SessionCompleted {
                            message: MSG_COMPLETED.to_string(),
                        },
                    );
                }
                self.send_to(
                    &pending.owner,
                    ServerEvent::SessionEnded {
                        course_id: pending.course_id,
                        session_id,
                        success: true,
                        attendee_count: attendee_ids.len(),
                        attendees: attendee_ids,
                    },
                );

                if let Some(tx) = respond_to {
                    let _ = tx.send(Ok(()));
                }
            }
            Err(e) => {
                prom::record_commit("error");
                prom::record_error("commit", e.error_type_label());
                error!(
                    target: "att.actor.coordinator",
                    course_id = %pending.course_id,
                    session_id = %session_id,
                    attendee_count = attendee_ids.len(),
                    attempt = pending.attempts,
                    error = %e,
                    "Attendance commit failed"
                );

                self.send_to(
                    &pending.owner,
                    ServerEvent::SessionError {
                        message: format!("{MSG_COMMIT_FAILED}: {}", e.client_message()),
                    },
                );
                self.send_to(
                    &pending.owner,
                    ServerEvent::SessionEnded {
                        course_id: pending.course_id,
                        session_id,
                        success: false,
                        attendee_count: attendee_ids.len(),
                        attendees: attendee_ids,
                    },
                );

                if let Some(tx) = respond_to {
                    let _ = tx.send(Err(e));
                }

                if pending.attempts < MAX_COMMIT_ATTEMPTS {
                    pending.state = CommitState::Failed;
                    pending.retention = Some(self.retention_timer(session_id));
                    self.commits.insert(session_id, pending);
                } else {
                    error!(
                        target: "att.actor.coordinator",
                        session_id = %session_id,
                        attendee_count = pending.attendees.len(),
                        "Retry failed, pending attendees discarded"
                    );
                }
            }
        }

        self.metrics.set_commits_in_flight(self.in_flight_commits());
    }

    fn retention_timer(&self, session_id: SessionId) -> CancellableTimer {
        let events = self.timer_tx.clone();
        CancellableTimer::once(self.config.failed_commit_retention, move || {
            let _ = events.send(TimerEvent::FailedCommitExpired { session_id });
        })
    }

    /// Start the single retry of a failed commit, already authorized by
    /// [`Self::authorize_retry`]. `respond_to` is held until it finishes.
    fn retry_commit(
        &mut self,
        connection_id: &ConnectionId,
        session_id: SessionId,
        respond_to: oneshot::Sender<Result<(), AttendanceError>>,
    ) {
        let Some(pending) = self.commits.get_mut(&session_id) else {
            let _ = respond_to.send(Err(AttendanceError::SessionNotFound(
                session_id.to_string(),
            )));
            return;
        };

        pending.attempts += 1;
        pending.retention = None;
        pending.owner = connection_id.clone();
        pending.state = CommitState::InFlight {
            respond_to: Some(respond_to),
        };
        let students = pending.student_ids();

        info!(
            target: "att.actor.coordinator",
            session_id = %session_id,
            attendee_count = students.len(),
            "Retrying attendance commit"
        );
        self.spawn_commit(session_id, students);
        self.metrics.set_commits_in_flight(self.in_flight_commits());
    }

    fn authorize_retry(
        &self,
        connection_id: &ConnectionId,
        session_id: SessionId,
    ) -> Result<(), AttendanceError> {
        let identity = self
            .connections
            .get(connection_id)
            .map(|entry| entry.identity)
            .ok_or(AttendanceError::UnknownConnection)?;
        let pending = self
            .commits
            .get(&session_id)
            .ok_or_else(|| AttendanceError::SessionNotFound(session_id.to_string()))?;

        if identity.role != Role::Teacher || identity.user_id != pending.teacher_id {
            warn!(
                target: "att.actor.coordinator",
                connection_id = %connection_id,
                session_id = %session_id,
                "Unauthorized attempt to retry attendance commit"
            );
            return Err(AttendanceError::PermissionDenied(
                "Only the session's teacher can retry saving attendance".to_string(),
            ));
        }
        if pending.is_in_flight() {
            return Err(AttendanceError::Conflict(
                "Commit already in progress".to_string(),
            ));
        }
        Ok(())
    }

    fn discard_failed_commit(&mut self, session_id: SessionId) {
        let failed = self
            .commits
            .get(&session_id)
            .is_some_and(|c| matches!(c.state, CommitState::Failed));
        if !failed {
            return;
        }
        if let Some(pending) = self.commits.remove(&session_id) {
            prom::record_commit("discarded");
            error!(
                target: "att.actor.coordinator",
                course_id = %pending.course_id,
                session_id = %session_id,
                attendee_count = pending.attendees.len(),
                "No retry before retention elapsed, pending attendees discarded"
            );
        }
    }

    fn in_flight_commits(&self) -> usize {
        self.commits.values().filter(|c| c.is_in_flight()).count()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    fn course_state(&self, course_id: CourseId) -> CourseState {
        if self.sessions.contains(course_id) {
            CourseState::Running
        } else if self
            .commits
            .values()
            .any(|c| c.course_id == course_id && c.is_in_flight())
        {
            CourseState::Terminating
        } else {
            CourseState::Idle
        }
    }

    fn get_session(&self, course_id: CourseId) -> Result<SessionInfo, AttendanceError> {
        if let Some(session) = self.sessions.get(course_id) {
            return Ok(SessionInfo {
                course_id,
                session_id: session.session_id,
                teacher_id: session.teacher_id,
                state: CourseState::Running,
                started_at: session.started_at_utc,
                duration_seconds: session.duration.as_secs(),
                remaining_seconds: session.remaining_seconds(),
                attendee_count: self.waitlist.count_for(course_id),
                live_tokens: self.tokens.count_for(course_id),
            });
        }

        self.commits
            .iter()
            .find(|(_, c)| c.course_id == course_id && c.is_in_flight())
            .map(|(session_id, c)| SessionInfo {
                course_id,
                session_id: *session_id,
                teacher_id: c.teacher_id,
                state: CourseState::Terminating,
                started_at: c.started_at_utc,
                duration_seconds: c.duration.as_secs(),
                remaining_seconds: 0,
                attendee_count: c.attendees.len(),
                live_tokens: 0,
            })
            .ok_or_else(|| AttendanceError::SessionNotFound(course_id.to_string()))
    }

    fn get_status(&self) -> CoordinatorStatus {
        let mut failed_commits: Vec<SessionId> = self
            .commits
            .iter()
            .filter(|(_, c)| !c.is_in_flight())
            .map(|(session_id, _)| *session_id)
            .collect();
        failed_commits.sort_by_key(|session_id| session_id.0);

        CoordinatorStatus {
            session_count: self.sessions.len(),
            connection_count: self.connections.len(),
            pending_attendees: self.waitlist.len(),
            commits_in_flight: self.in_flight_commits(),
            failed_commits,
            is_draining: !self.accepting_new,
            mailbox_depth: self.receiver.len(),
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    async fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), AttendanceError> {
        info!(
            target: "att.actor.coordinator",
            instance_id = %self.config.instance_id,
            session_count = self.sessions.len(),
            "Initiating graceful shutdown"
        );

        self.shutdown_sessions(deadline).await;

        // Cancel the root token (propagates to child tokens)
        self.cancel_token.cancel();

        Ok(())
    }

    /// Terminate every running session and wait for in-flight commits.
    async fn shutdown_sessions(&mut self, deadline: Duration) {
        self.accepting_new = false;

        for course_id in self.sessions.courses() {
            self.terminate(course_id, TerminationReason::Shutdown);
        }

        let deadline_at = tokio::time::Instant::now() + deadline;
        while self.in_flight_commits() > 0 {
            tokio::select! {
                Some(finished) = self.commit_rx.recv() => {
                    self.handle_commit_finished(finished);
                }
                () = tokio::time::sleep_until(deadline_at) => {
                    warn!(
                        target: "att.actor.coordinator",
                        instance_id = %self.config.instance_id,
                        commits_in_flight = self.in_flight_commits(),
                        "Shutdown deadline reached with commits in flight"
                    );
                    break;
                }
            }
        }

        info!(
            target: "att.actor.coordinator",
            instance_id = %self.config.instance_id,
            failed_commits = self.commits.len(),
            "Graceful shutdown complete"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal store: course 1 taught by user 100.
    #[derive(Default)]
    struct StubStore {
        completes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AttendanceStore for StubStore {
        async fn course_owner(
            &self,
            course_id: CourseId,
        ) -> Result<Option<UserId>, AttendanceError> {
            Ok((course_id == CourseId(1)).then_some(UserId(100)))
        }

        async fn create_active_record(
            &self,
            _course_id: CourseId,
            _teacher_id: UserId,
        ) -> Result<SessionId, AttendanceError> {
            Ok(SessionId::new())
        }

        async fn complete_record(
            &self,
            _session_id: SessionId,
            _attendees: &[UserId],
        ) -> Result<(), AttendanceError> {
            self.completes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            instance_id: "att-test".to_string(),
            ..CoordinatorConfig::default()
        }
    }

    async fn connect(
        handle: &AttendanceCoordinatorHandle,
        id: &str,
        user: i64,
        role: Role,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        handle
            .register_connection(
                ConnectionId::from(id),
                ConnectionIdentity {
                    user_id: UserId(user),
                    role,
                },
                tx,
            )
            .await
            .unwrap();
        rx
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_issues_first_token_immediately() {
        let handle = AttendanceCoordinatorHandle::new(
            config(),
            Arc::new(StubStore::default()),
            ActorMetrics::new(),
        );
        let mut teacher = connect(&handle, "t", 100, Role::Teacher).await;

        let session_id = handle
            .start_session(ConnectionId::from("t"), CourseId(1), 60)
            .await
            .unwrap();

        let events = drain(&mut teacher);
        assert!(matches!(
            events.first(),
            Some(ServerEvent::SessionStarted { session_id: s, .. }) if *s == session_id
        ));
        assert!(matches!(events.get(1), Some(ServerEvent::TokenRotated { .. })));

        let info = handle.get_session(CourseId(1)).await.unwrap();
        assert_eq!(info.state, CourseState::Running);
        assert_eq!(info.live_tokens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_validation_creates_no_state() {
        let handle = AttendanceCoordinatorHandle::new(
            config(),
            Arc::new(StubStore::default()),
            ActorMetrics::new(),
        );
        let mut teacher = connect(&handle, "t", 100, Role::Teacher).await;
        let _student = connect(&handle, "s", 7, Role::Student).await;
        let _other = connect(&handle, "o", 999, Role::Teacher).await;

        let unknown_course = handle
            .start_session(ConnectionId::from("t"), CourseId(2), 60)
            .await;
        assert!(matches!(
            unknown_course,
            Err(AttendanceError::CourseNotFound(CourseId(2)))
        ));

        let not_teacher = handle
            .start_session(ConnectionId::from("s"), CourseId(1), 60)
            .await;
        assert!(matches!(
            not_teacher,
            Err(AttendanceError::PermissionDenied(_))
        ));

        let not_owner = handle
            .start_session(ConnectionId::from("o"), CourseId(1), 60)
            .await;
        assert!(matches!(not_owner, Err(AttendanceError::PermissionDenied(_))));

        let too_long = handle
            .start_session(ConnectionId::from("t"), CourseId(1), 3_601)
            .await;
        assert!(matches!(too_long, Err(AttendanceError::InvalidRequest(_))));

        let zero = handle
            .start_session(ConnectionId::from("t"), CourseId(1), 0)
            .await;
        assert!(matches!(zero, Err(AttendanceError::InvalidRequest(_))));

        let status = handle.get_status().await.unwrap();
        assert_eq!(status.session_count, 0);
        assert!(drain(&mut teacher)
            .iter()
            .all(|e| matches!(e, ServerEvent::SessionError { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_pushes_tokens_to_owner_only() {
        let handle = AttendanceCoordinatorHandle::new(
            config(),
            Arc::new(StubStore::default()),
            ActorMetrics::new(),
        );
        let mut teacher = connect(&handle, "t", 100, Role::Teacher).await;
        let mut student = connect(&handle, "s", 7, Role::Student).await;

        handle
            .start_session(ConnectionId::from("t"), CourseId(1), 60)
            .await
            .unwrap();
        drain(&mut teacher);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        handle.get_status().await.unwrap();

        let rotated = drain(&mut teacher)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::TokenRotated { .. }))
            .count();
        assert_eq!(rotated, 2);
        assert!(drain(&mut student).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_terminate_is_noop() {
        let store = Arc::new(StubStore::default());
        let handle = AttendanceCoordinatorHandle::new(
            config(),
            Arc::clone(&store) as Arc<dyn AttendanceStore>,
            ActorMetrics::new(),
        );
        let _teacher = connect(&handle, "t", 100, Role::Teacher).await;
        handle
            .start_session(ConnectionId::from("t"), CourseId(1), 60)
            .await
            .unwrap();

        handle
            .end_session_early(ConnectionId::from("t"), CourseId(1))
            .await
            .unwrap();
        let _ = handle
            .end_session_early(ConnectionId::from("t"), CourseId(1))
            .await;

        settle().await;
        handle.get_status().await.unwrap();
        assert_eq!(store.completes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_accepting_sessions() {
        let (handle, task) = AttendanceCoordinatorHandle::spawn(
            config(),
            Arc::new(StubStore::default()),
            ActorMetrics::new(),
        );
        let _teacher = connect(&handle, "t", 100, Role::Teacher).await;
        handle
            .start_session(ConnectionId::from("t"), CourseId(1), 60)
            .await
            .unwrap();

        handle.shutdown(Duration::from_secs(5)).await.unwrap();
        task.await.unwrap();

        assert!(handle.is_cancelled());
        assert!(handle.get_status().await.is_err());
    }
}
