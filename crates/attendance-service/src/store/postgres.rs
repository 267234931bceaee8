//! PostgreSQL implementation of the persistence gateway.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - Student ids are not logged, only counts

use crate::errors::AttendanceError;
use crate::observability::metrics::record_store_latency;
use crate::store::AttendanceStore;
use common::types::{CourseId, SessionId, UserId};
use sqlx::PgPool;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Attendance store backed by a `PgPool`.
#[derive(Clone)]
pub struct PgAttendanceStore {
    pool: PgPool,
}

impl PgAttendanceStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `AttendanceError::Database` if a migration fails.
    pub async fn migrate(&self) -> Result<(), AttendanceError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AttendanceError::Database(format!("Migration failed: {e}")))
    }
}

#[async_trait::async_trait]
impl AttendanceStore for PgAttendanceStore {
    #[instrument(skip_all, fields(course_id = %course_id))]
    async fn course_owner(&self, course_id: CourseId) -> Result<Option<UserId>, AttendanceError> {
        let start = Instant::now();
        let result: Result<Option<(i64,)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT teacher_id
            FROM courses
            WHERE id = $1
            "#,
        )
        .bind(course_id.0)
        .fetch_optional(&self.pool)
        .await;
        record_store_latency("course_owner", start.elapsed());

        Ok(result?.map(|(teacher_id,)| UserId(teacher_id)))
    }

    #[instrument(skip_all, fields(course_id = %course_id, teacher_id = %teacher_id))]
    async fn create_active_record(
        &self,
        course_id: CourseId,
        teacher_id: UserId,
    ) -> Result<SessionId, AttendanceError> {
        let start = Instant::now();
        let session_id = SessionId::new();
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records (id, course_id, teacher_id, taken_at, status)
            VALUES ($1, $2, $3, NOW(), 'active')
            "#,
        )
        .bind(session_id.0)
        .bind(course_id.0)
        .bind(teacher_id.0)
        .execute(&self.pool)
        .await;
        record_store_latency("create_active_record", start.elapsed());

        result.map_err(|e| AttendanceError::Database(format!("Failed to create record: {e}")))?;

        debug!(
            target: "att.store.pg",
            session_id = %session_id,
            "Attendance record created"
        );

        Ok(session_id)
    }

    #[instrument(skip_all, fields(session_id = %session_id, attendees = attendees.len()))]
    async fn complete_record(
        &self,
        session_id: SessionId,
        attendees: &[UserId],
    ) -> Result<(), AttendanceError> {
        let start = Instant::now();
        let result = self.complete_record_tx(session_id, attendees).await;
        record_store_latency("complete_record", start.elapsed());

        if let Err(e) = &result {
            warn!(
                target: "att.store.pg",
                session_id = %session_id,
                error = %e,
                "Failed to complete attendance record"
            );
        }
        result
    }

    async fn ping(&self) -> Result<(), AttendanceError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

impl PgAttendanceStore {
    async fn complete_record_tx(
        &self,
        session_id: SessionId,
        attendees: &[UserId],
    ) -> Result<(), AttendanceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AttendanceError::Database(format!("Failed to start transaction: {e}")))?;

        // Lock the record so a concurrent retry serializes behind us
        let record: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT status
            FROM attendance_records
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(session_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AttendanceError::Database(format!("Failed to load record: {e}")))?;

        if record.is_none() {
            return Err(AttendanceError::SessionNotFound(session_id.to_string()));
        }

        let student_ids: Vec<i64> = attendees.iter().map(|student| student.0).collect();
        sqlx::query(
            r#"
            INSERT INTO attendance_record_students (record_id, student_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT (record_id, student_id) DO NOTHING
            "#,
        )
        .bind(session_id.0)
        .bind(&student_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| AttendanceError::Database(format!("Failed to add attendees: {e}")))?;

        sqlx::query(
            r#"
            UPDATE attendance_records
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(session_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| AttendanceError::Database(format!("Failed to mark record completed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| AttendanceError::Database(format!("Failed to commit record: {e}")))?;

        debug!(
            target: "att.store.pg",
            session_id = %session_id,
            attendee_count = attendees.len(),
            "Attendance record completed"
        );

        Ok(())
    }
}
