//! User token utilities shared across attendance services.
//!
//! Access tokens are issued by the account service (out of scope here) and
//! carry the user id and role. Services that accept client connections use
//! this module to check them:
//! - Size limits for DoS prevention
//! - HS256 signature and `exp` verification
//! - `iat` validation with clock skew tolerance
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted
//! - Error messages are generic; details are logged at debug level
//! - The `sub` field in claims is redacted in Debug output

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::UserId;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical user tokens are a few hundred bytes. Larger tokens are rejected
/// before any base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during user token validation.
///
/// All variants render the same client-facing message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is malformed, badly signed, or expired.
    #[error("The access token is invalid or expired")]
    InvalidToken,

    /// Token `sub` claim is not a user id.
    #[error("The access token is invalid or expired")]
    InvalidSubject,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Role granted to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May run attendance sessions for courses they teach.
    Teacher,
    /// May join attendance sessions.
    Student,
    /// Administrative account.
    Admin,
}

impl Role {
    /// Returns the role as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

/// User access token claims.
///
/// - `sub`: Subject (numeric user id, as a string)
/// - `role`: Account role
/// - `exp`: Expiration timestamp (Unix epoch seconds)
/// - `iat`: Issued-at timestamp (Unix epoch seconds)
#[derive(Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Account role.
    pub role: Role,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("sub", &"[REDACTED]")
            .field("role", &self.role)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

impl UserClaims {
    /// Creates a new `UserClaims` instance.
    #[must_use]
    pub fn new(user_id: UserId, role: Role, exp: i64, iat: i64) -> Self {
        Self {
            sub: user_id.to_string(),
            role,
            exp,
            iat,
        }
    }

    /// Parse the subject as a user id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubject` if `sub` is not an integer.
    pub fn user_id(&self) -> Result<UserId, JwtValidationError> {
        self.sub
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| JwtValidationError::InvalidSubject)
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Verify a user access token and return its claims.
///
/// Checks size, HS256 signature, `exp`, `iat` (with [`DEFAULT_CLOCK_SKEW`])
/// and that `sub` is a user id.
///
/// # Errors
///
/// Returns a `JwtValidationError` variant; all variants share one client
/// message so callers can surface `to_string()` directly.
pub fn verify_user_token(token: &str, secret: &[u8]) -> Result<UserClaims, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<UserClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Token rejected: verification failed");
            JwtValidationError::InvalidToken
        })?;

    validate_iat(data.claims.iat, DEFAULT_CLOCK_SKEW)?;
    data.claims.user_id()?;

    Ok(data.claims)
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.min(MAX_CLOCK_SKEW).as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-signing-secret-for-user-tokens";

    fn sign(claims: &UserClaims, secret: &[u8]) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn fresh_claims(role: Role) -> UserClaims {
        let now = chrono::Utc::now().timestamp();
        UserClaims::new(UserId(17), role, now + 3600, now)
    }

    #[test]
    fn test_verify_valid_token() {
        let token = sign(&fresh_claims(Role::Teacher), SECRET);

        let claims = verify_user_token(&token, SECRET).unwrap();
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.user_id().unwrap(), UserId(17));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = sign(&fresh_claims(Role::Student), SECRET);

        let result = verify_user_token(&token, b"some-other-secret");
        assert_eq!(result.unwrap_err(), JwtValidationError::InvalidToken);
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let now = chrono::Utc::now().timestamp();
        let claims = UserClaims::new(UserId(1), Role::Student, now - 3600, now - 7200);
        let token = sign(&claims, SECRET);

        let result = verify_user_token(&token, SECRET);
        assert_eq!(result.unwrap_err(), JwtValidationError::InvalidToken);
    }

    #[test]
    fn test_verify_rejects_oversized_token() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result = verify_user_token(&token, SECRET);
        assert_eq!(result.unwrap_err(), JwtValidationError::TokenTooLarge);
    }

    #[test]
    fn test_verify_rejects_non_numeric_subject() {
        let now = chrono::Utc::now().timestamp();
        let claims = UserClaims {
            sub: "alice".to_string(),
            role: Role::Student,
            exp: now + 60,
            iat: now,
        };
        let token = sign(&claims, SECRET);

        let result = verify_user_token(&token, SECRET);
        assert_eq!(result.unwrap_err(), JwtValidationError::InvalidSubject);
    }

    #[test]
    fn test_validate_iat_at_boundaries() {
        let now = 1_000_000;
        let skew = Duration::from_secs(300);

        assert!(validate_iat_at(now, skew, now).is_ok());
        assert!(validate_iat_at(now + 300, skew, now).is_ok());
        assert_eq!(
            validate_iat_at(now + 301, skew, now),
            Err(JwtValidationError::IatTooFarInFuture)
        );
    }

    #[test]
    fn test_user_claims_debug_redacts_sub() {
        let claims = UserClaims::new(UserId(17), Role::Student, 2, 1);
        let debug = format!("{claims:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("17"));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Teacher).unwrap(), "\"teacher\"");
        let role: Role = serde_json::from_str("\"student\"").unwrap();
        assert_eq!(role, Role::Student);
    }
}
