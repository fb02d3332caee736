//! Session coordination.
//!
//! The credential store is the single shared piece of mutable state. The
//! refresh coordinator, the interceptor and the auth manager are the only
//! code that writes to it.

pub mod events;
pub mod interceptor;
pub mod manager;
pub mod refresh;
pub mod session;

pub use events::{SessionEvent, SessionEvents, TerminationReason};
pub use interceptor::Interceptor;
pub use manager::AuthManager;
pub use refresh::{FlightReport, IdentityBackend, Participation, RefreshCoordinator, RefreshOutcome};
pub use session::{AccessToken, CredentialStore, Session};
