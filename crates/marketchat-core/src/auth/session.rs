use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use crate::models::UserProfile;

/// Short-lived bearer credential. Cheap to clone; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(Arc<str>);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// One consistent view of the authentication state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub credential: Option<AccessToken>,
    pub user: Option<UserProfile>,
    pub initialized: bool,
    pub issued_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// How long the current credential has been installed
    pub fn credential_age(&self) -> Option<Duration> {
        self.issued_at.map(|at| Utc::now() - at)
    }
}

/// Holder of the current session.
///
/// Every transition is applied under the channel's lock, so readers always
/// observe a whole snapshot. Clones share the same state.
#[derive(Clone)]
pub struct CredentialStore {
    state: Arc<watch::Sender<Session>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    /// Create an uninitialized store
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self { state: Arc::new(tx) }
    }

    /// Install a credential and its user together (login/registration).
    pub fn set_session(&self, credential: AccessToken, user: Option<UserProfile>) {
        self.state.send_modify(|s| {
            s.credential = Some(credential);
            s.user = user;
            s.initialized = true;
            s.issued_at = Some(Utc::now());
        });
    }

    /// Install a refreshed credential, keeping the current user snapshot.
    pub fn set_credential(&self, credential: AccessToken) {
        self.state.send_modify(|s| {
            s.credential = Some(credential);
            s.issued_at = Some(Utc::now());
        });
    }

    pub fn set_user(&self, user: UserProfile) {
        self.state.send_modify(|s| s.user = Some(user));
    }

    pub fn mark_initialized(&self) {
        self.state.send_if_modified(|s| !std::mem::replace(&mut s.initialized, true));
    }

    /// Drop credential and user. `initialized` stays set: the store now
    /// knows the visitor is a guest.
    pub fn clear(&self) {
        self.state.send_modify(|s| {
            s.credential = None;
            s.user = None;
            s.issued_at = None;
        });
    }

    pub fn credential(&self) -> Option<AccessToken> {
        self.state.borrow().credential.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Observe every session transition
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }
}
