//! Observability for the Attendance Service.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit fields. QR
//! token values and student ids never appear in metric labels. Labels are
//! bounded:
//! - `reason`: termination reasons (5 values)
//! - `outcome`: join outcomes (5 values)
//! - `result`: commit results (success, error, discarded)
//! - `operation`: persistence gateway operations (3 values)
//! - `error_type`: `AttendanceError::error_type_label` (11 values)
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `att_sessions_active` | Gauge | none | Live sessions |
//! | `att_connections_active` | Gauge | none | Registered connections |
//! | `att_sessions_started_total` | Counter | none | Sessions started |
//! | `att_sessions_terminated_total` | Counter | `reason` | Sessions terminated |
//! | `att_join_attempts_total` | Counter | `outcome` | Token submissions |
//! | `att_commits_total` | Counter | `result` | Attendance commits |
//! | `att_store_latency_seconds` | Histogram | `operation` | Gateway latency |
//! | `att_tokens_issued_total` | Counter | none | QR tokens issued |
//! | `att_errors_total` | Counter | `operation`, `error_type` | Errors |

pub mod health;
pub mod metrics;

// Re-exports for convenience
pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
