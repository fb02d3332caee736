//! Data models for the identity service.
//!
//! This module contains the user snapshot the identity service hands out
//! and the payloads the client sends back:
//!
//! - `UserProfile`, `Profile`, `Role`: the authenticated user
//! - `ProfileUpdate`: partial profile edits for `PATCH profile`
//! - `ActionOutcome`: the `{success, error}` shape handed to UI code

pub mod outcome;
pub mod user;

pub use outcome::ActionOutcome;
pub use user::{Profile, ProfileUpdate, Role, UserProfile};
