//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use them for the
//! database URL, the user-token signing secret, and anything else that must
//! never show up in logs.
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so a
//! struct deriving `Debug` that holds one is safe to log. Values are zeroized
//! on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct DatabaseSettings {
//!     url: SecretString,
//! }
//!
//! let settings = DatabaseSettings {
//!     url: SecretString::from("postgres://user:pw@db/attendance"),
//! };
//!
//! assert!(!format!("{settings:?}").contains("pw@db"));
//! assert!(settings.url.expose_secret().starts_with("postgres://"));
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
