//! Shared test helpers for the crate's `#[cfg(test)]` modules.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::api::{ApiClient, ApiError, RefreshError};
use crate::auth::{AccessToken, CredentialStore, IdentityBackend, RefreshCoordinator};
use crate::config::Config;
use crate::models::{Profile, Role, UserProfile};

/// Client with a verified email.
pub fn verified_client() -> UserProfile {
    UserProfile {
        id: "c-1".to_string(),
        email: "client@example.com".to_string(),
        role: Role::Client,
        email_verified: true,
        profile: None,
        created_at: None,
    }
}

pub fn unverified_client() -> UserProfile {
    UserProfile {
        email_verified: false,
        ..verified_client()
    }
}

/// Worker with the given verification state and skill list.
pub fn worker(email_verified: bool, skills: &[&str]) -> UserProfile {
    UserProfile {
        id: "w-1".to_string(),
        email: "worker@example.com".to_string(),
        role: Role::Worker,
        email_verified,
        profile: Some(Profile {
            skills: Some(skills.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }),
        created_at: None,
    }
}

/// In-memory identity service with call counters and an optional gate that
/// holds refreshes open until the test releases them.
pub struct FakeBackend {
    refresh_result: Result<String, RefreshError>,
    profile: Mutex<Option<UserProfile>>,
    gate: Option<Semaphore>,
    profile_gate: Option<Semaphore>,
    refresh_calls: AtomicUsize,
    profile_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn issuing(token: &str) -> Self {
        Self::with_result(Ok(token.to_string()))
    }

    pub fn rejecting(error: RefreshError) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(refresh_result: Result<String, RefreshError>) -> Self {
        Self {
            refresh_result,
            profile: Mutex::new(Some(verified_client())),
            gate: None,
            profile_gate: None,
            refresh_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
        }
    }

    /// Refreshes block until [`open_gate`](Self::open_gate) is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Profile fetches block forever; the refresh itself completes.
    pub fn holding_profile(mut self) -> Self {
        self.profile_gate = Some(Semaphore::new(0));
        self
    }

    pub fn with_profile(self, user: UserProfile) -> Self {
        *self.profile.lock().unwrap() = Some(user);
        self
    }

    /// Profile fetches fail with a server error.
    pub fn without_profile(self) -> Self {
        *self.profile.lock().unwrap() = None;
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityBackend for FakeBackend {
    async fn refresh(&self) -> Result<AccessToken, RefreshError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match &self.gate {
            Some(gate) => {
                let _permit = gate.acquire().await.expect("gate closed");
            }
            // Suspend once, like a real network round trip
            None => tokio::task::yield_now().await,
        }
        self.refresh_result.clone().map(AccessToken::new)
    }

    async fn fetch_profile(&self, _credential: &AccessToken) -> Result<UserProfile, ApiError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.profile_gate {
            let _permit = gate.acquire().await.expect("profile gate closed");
        }
        self.profile
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::ServerError("profile unavailable".to_string()))
    }
}

/// Coordinator over a fresh store.
pub fn coordinator_with(backend: Arc<FakeBackend>) -> (Arc<RefreshCoordinator>, CredentialStore) {
    let store = CredentialStore::new();
    let coordinator = Arc::new(RefreshCoordinator::new(backend, store.clone()));
    (coordinator, store)
}

/// Yield until `count` callers are queued behind the in-flight refresh.
pub async fn wait_for_waiters(coordinator: &RefreshCoordinator, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.waiting() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("callers never queued behind the refresh");
}

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Config pointing at a mock server.
pub fn test_config(base_url: &str) -> Config {
    Config {
        api_base_url: base_url.to_string(),
        request_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn test_api_client(base_url: &str) -> ApiClient {
    ApiClient::new(&test_config(base_url)).unwrap()
}
