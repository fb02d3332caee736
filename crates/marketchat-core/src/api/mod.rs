//! REST API client module for the identity service.
//!
//! This module provides the `ApiClient` for communicating with the
//! marketplace identity service: login, registration, credential refresh,
//! and profile management.
//!
//! Access credentials are short-lived bearer tokens. The long-lived session
//! is an httpOnly cookie kept in the client's cookie jar.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthGrant};
pub use error::{ApiError, RefreshError};
