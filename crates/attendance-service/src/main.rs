//! Attendance Service
//!
//! Classroom attendance coordinator: rotating QR tokens pushed to the
//! teacher over WebSocket, student scans collected on a waitlist, and one
//! durable commit per session.
//!
//! # Servers
//!
//! - WebSocket server for teachers and students (default: 0.0.0.0:8080)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Connect to PostgreSQL and apply migrations
//! 4. Spawn the coordinator actor
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Start WebSocket server
//! 7. Mark ready and wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use attendance_service::actors::{ActorMetrics, AttendanceCoordinatorHandle, CoordinatorConfig};
use attendance_service::config::Config;
use attendance_service::observability::{health_router, init_metrics_recorder, HealthState};
use attendance_service::store::{AttendanceStore, PgAttendanceStore};
use attendance_service::transport::{ws_router, TransportState};
use axum::Router;
use common::secret::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on waiting for session commits at shutdown.
const SHUTDOWN_COMMIT_DEADLINE: Duration = Duration::from_secs(30);

/// Database connect timeout at startup.
const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attendance_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Attendance Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        rotation_interval_ms = config.rotation_interval.as_millis(),
        failed_commit_retention_secs = config.failed_commit_retention.as_secs(),
        token_ttl_ms = config.token_ttl.as_millis(),
        max_session_seconds = config.max_session_seconds,
        "Configuration loaded successfully"
    );

    // This must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(DB_ACQUIRE_TIMEOUT)
        .connect(config.database_url.expose_secret())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to database");
            e
        })?;

    let store = PgAttendanceStore::new(pool);
    store.migrate().await.map_err(|e| {
        error!(error = %e, "Failed to apply database migrations");
        e
    })?;
    info!("Database ready");
    let store: Arc<dyn AttendanceStore> = Arc::new(store);

    // Actor system
    info!("Initializing coordinator...");
    let actor_metrics = ActorMetrics::new();
    let (coordinator, coordinator_task) = AttendanceCoordinatorHandle::spawn(
        CoordinatorConfig::from(&config),
        Arc::clone(&store),
        Arc::clone(&actor_metrics),
    );
    info!("Coordinator initialized");

    // Servers stop when the coordinator's token is cancelled
    let shutdown_token = coordinator.child_token();

    // Health server (liveness, readiness, /metrics)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app = health_router(Arc::clone(&health_state), store).merge(metrics_router);

    // Bind listener BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // WebSocket server
    let ws_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let ws_app = ws_router(Arc::new(TransportState {
        coordinator: coordinator.clone(),
        jwt_secret: config.jwt_secret.clone(),
    }))
    .layer(TraceLayer::new_for_http());

    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await.map_err(|e| {
        error!(error = %e, addr = %ws_addr, "Failed to bind WebSocket server");
        format!("Failed to bind WebSocket server to {ws_addr}: {e}")
    })?;

    let ws_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %ws_addr, "WebSocket server starting");
        let server = axum::serve(ws_listener, ws_app).with_graceful_shutdown(async move {
            ws_shutdown_token.cancelled().await;
            info!("WebSocket server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "WebSocket server failed");
        }
    });

    health_state.set_ready();
    info!("Attendance Service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    // Terminates live sessions (committing their attendance), then cancels
    // the root token, which stops both servers
    if let Err(e) = coordinator.shutdown(SHUTDOWN_COMMIT_DEADLINE).await {
        warn!(error = %e, "Coordinator shutdown error");
        coordinator.cancel();
    }

    if let Err(e) = coordinator_task.await {
        warn!(error = %e, "Coordinator task ended abnormally");
    }

    info!(
        sessions_remaining = actor_metrics.session_count(),
        "Attendance Service shutdown complete"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
