//! UI-facing session actions.
//!
//! `AuthManager` owns one credential store and everything that shares it:
//! the API client, the refresh coordinator, the interceptor and the event
//! channel. UI code calls its actions and reads its accessors; it never
//! touches the store directly.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::events::{SessionEvent, SessionEvents, TerminationReason};
use super::interceptor::Interceptor;
use super::refresh::RefreshCoordinator;
use super::session::{CredentialStore, Session};
use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::guard::{NavigationGuard, RouteTable};
use crate::models::{ProfileUpdate, Role, UserProfile};

#[derive(Clone)]
pub struct AuthManager {
    api: ApiClient,
    store: CredentialStore,
    coordinator: Arc<RefreshCoordinator>,
    interceptor: Interceptor,
    events: SessionEvents,
}

impl AuthManager {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_client(ApiClient::new(config)?))
    }

    /// Build a manager around an existing client, starting uninitialized.
    pub fn with_client(api: ApiClient) -> Self {
        let store = CredentialStore::new();
        let coordinator = Arc::new(RefreshCoordinator::new(Arc::new(api.clone()), store.clone()));
        let events = SessionEvents::new();
        let interceptor = Interceptor::new(Arc::clone(&coordinator), events.clone());
        Self {
            api,
            store,
            coordinator,
            interceptor,
            events,
        }
    }

    // ===== Session =====

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let grant = self.api.login(email, password).await?;
        info!(email = %grant.user.email, role = grant.user.role.as_str(), "Logged in");
        self.store.set_session(grant.credential, Some(grant.user.clone()));
        Ok(grant.user)
    }

    pub async fn register(&self, email: &str, password: &str, role: Role) -> Result<UserProfile, ApiError> {
        let grant = self.api.register(email, password, role).await?;
        info!(email = %grant.user.email, role = role.as_str(), "Registered");
        self.store.set_session(grant.credential, Some(grant.user.clone()));
        Ok(grant.user)
    }

    /// Restore the session from the long-lived cookie, once per store.
    /// Returns whether a session is now active.
    pub async fn initialize(&self) -> bool {
        if !self.store.is_initialized() {
            if let Err(e) = self.coordinator.ensure_valid_credential().await {
                debug!(error = %e, "No session to restore");
            }
        }
        self.store.is_authenticated()
    }

    /// End the session locally regardless of what the service says.
    pub async fn logout(&self) {
        if let Err(e) = self.api.logout(self.store.credential()).await {
            warn!(error = %e, "Logout request failed, clearing session anyway");
        }
        self.end_session(TerminationReason::LoggedOut);
        info!("Logged out");
    }

    pub async fn delete_account(&self) -> Result<(), ApiError> {
        let api = &self.api;
        self.interceptor
            .execute(move |credential| api.delete_account(credential))
            .await?;
        self.end_session(TerminationReason::AccountDeleted);
        info!("Account deleted");
        Ok(())
    }

    fn end_session(&self, reason: TerminationReason) {
        self.store.clear();
        self.api.expire_session_cookie();
        self.events.terminated(reason);
    }

    // ===== Profile =====

    /// Re-fetch the signed-in user. `None` when there is no session.
    pub async fn fetch_profile(&self) -> Result<Option<UserProfile>, ApiError> {
        if !self.store.is_authenticated() {
            return Ok(None);
        }
        let api = &self.api;
        let user = self
            .interceptor
            .execute(move |credential| api.get_profile(credential))
            .await?;
        self.store.set_user(user.clone());
        Ok(Some(user))
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        let api = &self.api;
        let user = self
            .interceptor
            .execute(move |credential| api.update_profile(credential, update))
            .await?;
        self.store.set_user(user.clone());
        Ok(user)
    }

    /// Submit the emailed code, then reload the user so `email_verified`
    /// reflects the change.
    pub async fn verify_email(&self, code: &str) -> Result<Option<UserProfile>, ApiError> {
        let api = &self.api;
        self.interceptor
            .execute(move |credential| api.verify_email(credential, code))
            .await?;
        info!("Email verified");
        self.fetch_profile().await
    }

    pub async fn resend_verification_code(&self) -> Result<(), ApiError> {
        let api = &self.api;
        self.interceptor
            .execute(move |credential| api.resend_verification(credential))
            .await
    }

    // ===== Accessors =====

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.store.user()
    }

    pub fn is_worker(&self) -> bool {
        self.store.user().is_some_and(|u| u.is_worker())
    }

    pub fn session(&self) -> Session {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.store.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// For routing chat and market calls through the same refresh.
    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn guard(&self, routes: RouteTable) -> NavigationGuard {
        NavigationGuard::new(Arc::clone(&self.coordinator), routes)
    }
}
