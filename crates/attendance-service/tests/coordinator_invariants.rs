//! Coordinator invariants: single session per course, idempotent
//! termination, at-most-once waitlist membership, commit failure handling
//! and graceful shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use attendance_service::actors::{
    ActorMetrics, AttendanceCoordinatorHandle, CoordinatorConfig, JoinOutcome,
};
use attendance_service::errors::AttendanceError;
use attendance_service::protocol::ServerEvent;
use attendance_service::registry::CourseState;
use attendance_test_utils::{settle, MockAttendanceStore, TestConnection};
use common::types::{CourseId, UserId};

const COURSE: CourseId = CourseId(1);
const TEACHER: UserId = UserId(100);
const STUDENT: UserId = UserId(7);

fn spawn_with(store: &MockAttendanceStore) -> AttendanceCoordinatorHandle {
    AttendanceCoordinatorHandle::new(
        CoordinatorConfig::default(),
        store.shared(),
        ActorMetrics::new(),
    )
}

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

fn count_ended(events: &[ServerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ServerEvent::SessionEnded { .. }))
        .count()
}

// ============================================================================
// Start validation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_failure_at_store_creates_nothing() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .failing_create();
    let handle = spawn_with(&store);
    let mut teacher = TestConnection::teacher(&handle, TEACHER).await;

    let result = handle.start_session(teacher.id.clone(), COURSE, 60).await;
    assert!(matches!(result, Err(AttendanceError::Database(_))));

    let events = teacher.drain().await;
    assert_eq!(
        events,
        vec![ServerEvent::SessionError {
            message: "An internal error occurred".to_string()
        }]
    );

    advance(Duration::from_secs(10)).await;
    assert!(teacher.drain().await.is_empty(), "no timers may be running");
    assert!(matches!(
        handle.get_session(COURSE).await,
        Err(AttendanceError::SessionNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_student_cannot_start_and_teacher_cannot_join() {
    let store = MockAttendanceStore::new().with_course(COURSE, TEACHER);
    let handle = spawn_with(&store);
    let mut teacher = TestConnection::teacher(&handle, TEACHER).await;
    let student = TestConnection::student(&handle, STUDENT).await;

    let result = handle.start_session(student.id.clone(), COURSE, 60).await;
    assert!(matches!(result, Err(AttendanceError::PermissionDenied(_))));
    assert_eq!(store.create_calls(), 0);

    handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();
    let token = teacher.next_token().await;
    let result = handle.submit_token(teacher.id.clone(), token).await;
    assert!(matches!(result, Err(AttendanceError::PermissionDenied(_))));
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_connection_is_rejected() {
    let store = MockAttendanceStore::new().with_course(COURSE, TEACHER);
    let handle = spawn_with(&store);
    let teacher = TestConnection::teacher(&handle, TEACHER).await;
    handle.connection_closed(teacher.id.clone()).await.unwrap();

    let result = handle.start_session(teacher.id.clone(), COURSE, 60).await;
    assert!(matches!(result, Err(AttendanceError::UnknownConnection)));
    let result = handle.leave_session(teacher.id.clone()).await;
    assert!(matches!(result, Err(AttendanceError::UnknownConnection)));
}

// ============================================================================
// One session per course
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_leave_one_session() {
    let store = MockAttendanceStore::new().with_course(COURSE, TEACHER);
    let handle = spawn_with(&store);
    let mut window_a = TestConnection::teacher(&handle, TEACHER).await;
    let mut window_b = TestConnection::teacher(&handle, TEACHER).await;

    let (a, b) = tokio::join!(
        handle.start_session(window_a.id.clone(), COURSE, 60),
        handle.start_session(window_b.id.clone(), COURSE, 60),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let status = handle.get_status().await.unwrap();
    assert_eq!(status.session_count, 1);
    assert_eq!(store.create_calls(), 2);

    let current = handle.get_session(COURSE).await.unwrap().session_id;
    assert!(current == a || current == b);

    // The window that lost the slot is told
    let lost = if current == a {
        window_b.drain().await
    } else {
        window_a.drain().await
    };
    assert!(lost
        .iter()
        .any(|e| matches!(e, ServerEvent::SessionError { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_only_owner_connection_can_end_session() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .with_course(CourseId(2), UserId(200));
    let handle = spawn_with(&store);
    let teacher = TestConnection::teacher(&handle, TEACHER).await;
    let mut other = TestConnection::teacher(&handle, UserId(200)).await;

    handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();

    let result = handle.end_session_early(other.id.clone(), COURSE).await;
    assert!(matches!(result, Err(AttendanceError::PermissionDenied(_))));
    assert!(matches!(
        other.recv().await,
        ServerEvent::SessionError { .. }
    ));
    assert_eq!(
        handle.get_session(COURSE).await.unwrap().state,
        CourseState::Running
    );
}

// ============================================================================
// Idempotent termination
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_double_terminate_commits_once() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .with_complete_delay(Duration::from_secs(1));
    let handle = spawn_with(&store);
    let mut teacher = TestConnection::teacher(&handle, TEACHER).await;
    let student = TestConnection::student(&handle, STUDENT).await;

    let session_id = handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();
    let token = teacher.next_token().await;
    handle.submit_token(student.id.clone(), token).await.unwrap();

    handle
        .end_session_early(teacher.id.clone(), COURSE)
        .await
        .unwrap();

    // Second trigger while the first commit is still in flight
    let info = handle.get_session(COURSE).await.unwrap();
    assert_eq!(info.state, CourseState::Terminating);
    assert_eq!(info.session_id, session_id);
    assert_eq!(info.attendee_count, 1);
    assert_eq!(info.live_tokens, 0);
    handle
        .end_session_early(teacher.id.clone(), COURSE)
        .await
        .unwrap();

    advance(Duration::from_secs(1)).await;
    settle().await;

    assert_eq!(store.complete_calls(), 1);
    assert_eq!(count_ended(&teacher.drain().await), 1);
    assert!(matches!(
        handle.end_session_early(teacher.id.clone(), COURSE).await,
        Err(AttendanceError::SessionNotActive)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_racing_manual_stop_commits_once() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .with_complete_delay(Duration::from_millis(500));
    let handle = spawn_with(&store);
    let teacher = TestConnection::teacher(&handle, TEACHER).await;

    handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();

    let (stop, close) = tokio::join!(
        handle.end_session_early(teacher.id.clone(), COURSE),
        handle.connection_closed(teacher.id.clone()),
    );
    stop.unwrap();
    close.unwrap();

    advance(Duration::from_secs(1)).await;
    assert_eq!(store.complete_calls(), 1);
}

// ============================================================================
// Waitlist membership
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connection_is_pending_at_most_once() {
    let store = MockAttendanceStore::new().with_course(COURSE, TEACHER);
    let handle = spawn_with(&store);
    let mut teacher = TestConnection::teacher(&handle, TEACHER).await;
    let mut student = TestConnection::student(&handle, STUDENT).await;

    let session_id = handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();
    let first = teacher.next_token().await;

    let outcome = handle
        .submit_token(student.id.clone(), first.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, JoinOutcome::Accepted { .. }));

    let outcome = handle.submit_token(student.id.clone(), first).await.unwrap();
    assert_eq!(outcome, JoinOutcome::AlreadyPending);

    advance(Duration::from_secs(5)).await;
    let second = teacher.next_token().await;
    let outcome = handle.submit_token(student.id.clone(), second).await.unwrap();
    assert_eq!(outcome, JoinOutcome::AlreadyPending);

    let events = student.drain().await;
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ServerEvent::AlreadyPending { .. }))
            .count(),
        2
    );
    assert_eq!(handle.get_status().await.unwrap().pending_attendees, 1);

    handle
        .end_session_early(teacher.id.clone(), COURSE)
        .await
        .unwrap();
    settle().await;
    assert_eq!(store.record(session_id).unwrap().students, vec![STUDENT]);
}

// ============================================================================
// Commit failure and retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_commit_is_reported_and_retried() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .fail_next_completes(1);
    let handle = spawn_with(&store);
    let mut teacher = TestConnection::teacher(&handle, TEACHER).await;
    let mut student = TestConnection::student(&handle, STUDENT).await;

    let session_id = handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();
    let token = teacher.next_token().await;
    handle.submit_token(student.id.clone(), token).await.unwrap();

    handle
        .end_session_early(teacher.id.clone(), COURSE)
        .await
        .unwrap();
    settle().await;

    let events = teacher.drain().await;
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::SessionError { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::SessionEnded {
            success: false,
            attendee_count: 1,
            ..
        }
    )));
    assert!(!store.record(session_id).unwrap().completed);

    let status = handle.get_status().await.unwrap();
    assert_eq!(status.failed_commits, vec![session_id]);
    assert_eq!(status.session_count, 0);

    handle.retry_commit(teacher.id.clone(), session_id).await.unwrap();

    let record = store.record(session_id).unwrap();
    assert!(record.completed);
    assert_eq!(record.students, vec![STUDENT]);
    assert!(student
        .drain()
        .await
        .iter()
        .any(|e| matches!(e, ServerEvent::SessionCompleted { .. })));
    assert!(handle.get_status().await.unwrap().failed_commits.is_empty());

    let again = handle.retry_commit(teacher.id.clone(), session_id).await;
    assert!(matches!(again, Err(AttendanceError::SessionNotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_failed_retry_discards_working_set() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .fail_next_completes(2);
    let handle = spawn_with(&store);
    let teacher = TestConnection::teacher(&handle, TEACHER).await;

    let session_id = handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();
    handle
        .end_session_early(teacher.id.clone(), COURSE)
        .await
        .unwrap();
    settle().await;

    let retry = handle.retry_commit(teacher.id.clone(), session_id).await;
    assert!(matches!(retry, Err(AttendanceError::Database(_))));

    let status = handle.get_status().await.unwrap();
    assert!(status.failed_commits.is_empty());
    assert_eq!(store.complete_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_only_session_teacher_can_retry() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .fail_next_completes(1);
    let handle = spawn_with(&store);
    let teacher = TestConnection::teacher(&handle, TEACHER).await;
    let mut student = TestConnection::student(&handle, STUDENT).await;

    let session_id = handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();
    handle
        .end_session_early(teacher.id.clone(), COURSE)
        .await
        .unwrap();
    settle().await;

    let denied = handle.retry_commit(student.id.clone(), session_id).await;
    assert!(matches!(denied, Err(AttendanceError::PermissionDenied(_))));
    assert!(matches!(
        student.drain().await.as_slice(),
        [ServerEvent::SessionError { .. }]
    ));
    assert_eq!(store.complete_calls(), 1);
    assert_eq!(
        handle.get_status().await.unwrap().failed_commits,
        vec![session_id]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unretried_failed_commit_is_discarded_after_retention() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .fail_next_completes(1);
    let handle = AttendanceCoordinatorHandle::new(
        CoordinatorConfig {
            failed_commit_retention: Duration::from_secs(60),
            ..CoordinatorConfig::default()
        },
        store.shared(),
        ActorMetrics::new(),
    );
    let teacher = TestConnection::teacher(&handle, TEACHER).await;

    let session_id = handle
        .start_session(teacher.id.clone(), COURSE, 600)
        .await
        .unwrap();
    handle
        .end_session_early(teacher.id.clone(), COURSE)
        .await
        .unwrap();
    settle().await;

    advance(Duration::from_secs(59)).await;
    assert_eq!(
        handle.get_status().await.unwrap().failed_commits,
        vec![session_id]
    );

    advance(Duration::from_secs(1)).await;
    assert!(handle.get_status().await.unwrap().failed_commits.is_empty());

    let retry = handle.retry_commit(teacher.id.clone(), session_id).await;
    assert!(matches!(retry, Err(AttendanceError::SessionNotFound(_))));
    assert_eq!(store.complete_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_student_on_two_connections_is_reported_once() {
    let store = MockAttendanceStore::new().with_course(COURSE, TEACHER);
    let handle = spawn_with(&store);
    let mut teacher = TestConnection::teacher(&handle, TEACHER).await;
    let phone = TestConnection::student(&handle, STUDENT).await;
    let laptop = TestConnection::student(&handle, STUDENT).await;

    let session_id = handle
        .start_session(teacher.id.clone(), COURSE, 60)
        .await
        .unwrap();
    let token = teacher.next_token().await;
    handle
        .submit_token(phone.id.clone(), token.clone())
        .await
        .unwrap();
    handle.submit_token(laptop.id.clone(), token).await.unwrap();

    handle
        .end_session_early(teacher.id.clone(), COURSE)
        .await
        .unwrap();
    let ended = teacher
        .wait_for(|e| matches!(e, ServerEvent::SessionEnded { .. }))
        .await;

    assert_eq!(
        ended,
        ServerEvent::SessionEnded {
            course_id: COURSE,
            session_id,
            success: true,
            attendee_count: 1,
            attendees: vec![STUDENT],
        }
    );
    assert_eq!(store.record(session_id).unwrap().students, vec![STUDENT]);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_commits_running_sessions() {
    let store = MockAttendanceStore::new()
        .with_course(COURSE, TEACHER)
        .with_course(CourseId(2), TEACHER);
    let (handle, task) = AttendanceCoordinatorHandle::spawn(
        CoordinatorConfig::default(),
        store.shared(),
        ActorMetrics::new(),
    );
    let mut teacher = TestConnection::teacher(&handle, TEACHER).await;
    let student = TestConnection::student(&handle, STUDENT).await;

    let first = handle
        .start_session(teacher.id.clone(), COURSE, 600)
        .await
        .unwrap();
    let second = handle
        .start_session(teacher.id.clone(), CourseId(2), 600)
        .await
        .unwrap();
    let token = teacher.next_token().await;
    handle.submit_token(student.id.clone(), token).await.unwrap();

    handle.shutdown(Duration::from_secs(5)).await.unwrap();
    task.await.unwrap();

    assert_eq!(store.record(first).unwrap().students, vec![STUDENT]);
    assert!(store.record(first).unwrap().completed);
    assert!(store.record(second).unwrap().completed);
    assert!(handle.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_also_commits_running_sessions() {
    let store = MockAttendanceStore::new().with_course(COURSE, TEACHER);
    let (handle, task) = AttendanceCoordinatorHandle::spawn(
        CoordinatorConfig::default(),
        store.shared(),
        ActorMetrics::new(),
    );
    let teacher = TestConnection::teacher(&handle, TEACHER).await;
    let session_id = handle
        .start_session(teacher.id.clone(), COURSE, 600)
        .await
        .unwrap();

    handle.cancel();
    task.await.unwrap();

    assert!(store.record(session_id).unwrap().completed);
}
