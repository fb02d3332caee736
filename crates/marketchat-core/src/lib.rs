//! Core library for marketchat.
//!
//! Holds the access-credential lifecycle for a marketplace client, funnels
//! concurrent credential refreshes into one network call, and gates
//! navigation on authentication, email verification and profile
//! completeness.

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

#[cfg(test)]
mod testutil;

pub use api::{ApiClient, ApiError, RefreshError};
pub use auth::{AuthManager, Session, SessionEvent, TerminationReason};
pub use config::Config;
pub use guard::{GuardDecision, NavigationGuard, RouteTable};
pub use models::{ActionOutcome, Role, UserProfile};
