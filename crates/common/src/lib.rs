//! Common utilities and types shared across attendance components.

#![warn(clippy::pedantic)]

/// Module for identifier types (courses, users, sessions, connections)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for user token claims and validation
pub mod jwt;
