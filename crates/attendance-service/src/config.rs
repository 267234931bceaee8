//! Attendance Service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default QR token rotation interval in milliseconds.
pub const DEFAULT_ROTATION_INTERVAL_MS: u64 = 5_000;

/// Default QR token TTL in milliseconds. Survives one extra rotation tick.
pub const DEFAULT_TOKEN_TTL_MS: u64 = 7_000;

/// Default upper bound on a session's duration in seconds.
pub const DEFAULT_MAX_SESSION_SECONDS: u64 = 3_600;

/// Default time a failed commit stays available for a retry, in seconds.
pub const DEFAULT_FAILED_COMMIT_RETENTION_SECONDS: u64 = 900;

/// Default database pool size.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "att";

/// Attendance Service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: SecretString,

    /// HS256 secret used to verify user access tokens.
    pub jwt_secret: SecretString,

    /// WebSocket server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Health and metrics bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// QR token rotation interval (default: 5s).
    pub rotation_interval: Duration,

    /// QR token time-to-live (default: 7s). Always greater than
    /// `rotation_interval`.
    pub token_ttl: Duration,

    /// Longest session a teacher may start, in seconds (default: 3600).
    pub max_session_seconds: u64,

    /// How long a failed commit's attendees are kept for a retry
    /// (default: 15 minutes).
    pub failed_commit_retention: Duration,

    /// Database pool size (default: 10).
    pub db_max_connections: u32,

    /// Unique identifier for this instance, used in logs.
    pub instance_id: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("rotation_interval", &self.rotation_interval)
            .field("token_ttl", &self.token_ttl)
            .field("max_session_seconds", &self.max_session_seconds)
            .field("failed_commit_retention", &self.failed_commit_retention)
            .field("db_max_connections", &self.db_max_connections)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if a secret is absent and
    /// `ConfigError::InvalidValue` if a numeric value does not parse or the
    /// token TTL does not exceed the rotation interval.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = SecretString::from(
            vars.get("DATABASE_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
                .clone(),
        );

        let jwt_secret = SecretString::from(
            vars.get("ATTENDANCE_JWT_SECRET")
                .ok_or_else(|| ConfigError::MissingEnvVar("ATTENDANCE_JWT_SECRET".to_string()))?
                .clone(),
        );

        let bind_address = vars
            .get("ATTENDANCE_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("ATTENDANCE_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let rotation_interval_ms: u64 = parse_var(
            vars,
            "ATTENDANCE_ROTATION_INTERVAL_MS",
            DEFAULT_ROTATION_INTERVAL_MS,
        )?;
        if rotation_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "ATTENDANCE_ROTATION_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        let token_ttl_ms: u64 = parse_var(vars, "ATTENDANCE_TOKEN_TTL_MS", DEFAULT_TOKEN_TTL_MS)?;
        if token_ttl_ms <= rotation_interval_ms {
            return Err(ConfigError::InvalidValue(format!(
                "ATTENDANCE_TOKEN_TTL_MS ({token_ttl_ms}) must exceed \
                 ATTENDANCE_ROTATION_INTERVAL_MS ({rotation_interval_ms})"
            )));
        }

        let max_session_seconds: u64 = parse_var(
            vars,
            "ATTENDANCE_MAX_SESSION_SECONDS",
            DEFAULT_MAX_SESSION_SECONDS,
        )?;
        if max_session_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "ATTENDANCE_MAX_SESSION_SECONDS must be greater than 0".to_string(),
            ));
        }

        let failed_commit_retention_seconds: u64 = parse_var(
            vars,
            "ATTENDANCE_FAILED_COMMIT_RETENTION_SECONDS",
            DEFAULT_FAILED_COMMIT_RETENTION_SECONDS,
        )?;

        let db_max_connections: u32 = parse_var(
            vars,
            "ATTENDANCE_DB_MAX_CONNECTIONS",
            DEFAULT_DB_MAX_CONNECTIONS,
        )?;

        let instance_id = vars
            .get("ATTENDANCE_INSTANCE_ID")
            .cloned()
            .unwrap_or_else(|| {
                let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
                let uuid_suffix = uuid::Uuid::new_v4().to_string();
                let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
                format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
            });

        Ok(Config {
            database_url,
            jwt_secret,
            bind_address,
            health_bind_address,
            rotation_interval: Duration::from_millis(rotation_interval_ms),
            token_ttl: Duration::from_millis(token_ttl_ms),
            max_session_seconds,
            failed_commit_retention: Duration::from_secs(failed_commit_retention_seconds),
            db_max_connections,
            instance_id,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name} is not a valid number: {raw}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgres://att:pw@localhost/attendance".to_string(),
            ),
            (
                "ATTENDANCE_JWT_SECRET".to_string(),
                "user-token-signing-secret".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(
            config.database_url.expose_secret(),
            "postgres://att:pw@localhost/attendance"
        );
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.rotation_interval, Duration::from_secs(5));
        assert_eq!(config.token_ttl, Duration::from_secs(7));
        assert_eq!(config.max_session_seconds, DEFAULT_MAX_SESSION_SECONDS);
        assert_eq!(config.failed_commit_retention, Duration::from_secs(900));
        assert_eq!(config.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert!(config.instance_id.starts_with("att-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert(
            "ATTENDANCE_BIND_ADDRESS".to_string(),
            "127.0.0.1:9000".to_string(),
        );
        vars.insert(
            "ATTENDANCE_HEALTH_BIND_ADDRESS".to_string(),
            "127.0.0.1:9001".to_string(),
        );
        vars.insert(
            "ATTENDANCE_ROTATION_INTERVAL_MS".to_string(),
            "2000".to_string(),
        );
        vars.insert("ATTENDANCE_TOKEN_TTL_MS".to_string(), "2800".to_string());
        vars.insert(
            "ATTENDANCE_MAX_SESSION_SECONDS".to_string(),
            "900".to_string(),
        );
        vars.insert(
            "ATTENDANCE_FAILED_COMMIT_RETENTION_SECONDS".to_string(),
            "60".to_string(),
        );
        vars.insert("ATTENDANCE_DB_MAX_CONNECTIONS".to_string(), "4".to_string());
        vars.insert("ATTENDANCE_INSTANCE_ID".to_string(), "att-a".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.health_bind_address, "127.0.0.1:9001");
        assert_eq!(config.rotation_interval, Duration::from_secs(2));
        assert_eq!(config.token_ttl, Duration::from_millis(2800));
        assert_eq!(config.max_session_seconds, 900);
        assert_eq!(config.failed_commit_retention, Duration::from_secs(60));
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.instance_id, "att-a");
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let mut vars = base_vars();
        vars.remove("DATABASE_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_from_vars_missing_jwt_secret() {
        let mut vars = base_vars();
        vars.remove("ATTENDANCE_JWT_SECRET");

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "ATTENDANCE_JWT_SECRET")
        );
    }

    #[test]
    fn test_token_ttl_must_exceed_rotation_interval() {
        let mut vars = base_vars();
        vars.insert("ATTENDANCE_TOKEN_TTL_MS".to_string(), "5000".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_unparseable_number_is_rejected() {
        let mut vars = base_vars();
        vars.insert(
            "ATTENDANCE_MAX_SESSION_SECONDS".to_string(),
            "an hour".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("ATTENDANCE_MAX_SESSION_SECONDS"))
        );
    }

    #[test]
    fn test_zero_rotation_interval_is_rejected() {
        let mut vars = base_vars();
        vars.insert(
            "ATTENDANCE_ROTATION_INTERVAL_MS".to_string(),
            "0".to_string(),
        );

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgres://"));
        assert!(!debug_output.contains("user-token-signing-secret"));
    }
}
