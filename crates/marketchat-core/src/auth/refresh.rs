//! Single-flight credential refresh.
//!
//! The first caller to need a new access credential becomes the leader and
//! performs the one network refresh. Everyone arriving while it is in flight
//! queues a oneshot handle and is released with the leader's outcome.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::session::{AccessToken, CredentialStore};
use crate::api::{ApiError, RefreshError};
use crate::models::UserProfile;

/// Network side of the refresh: the identity service, or a stand-in.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Exchange the long-lived session for a new access credential
    async fn refresh(&self) -> Result<AccessToken, RefreshError>;

    async fn fetch_profile(&self, credential: &AccessToken) -> Result<UserProfile, ApiError>;
}

pub type RefreshOutcome = Result<AccessToken, RefreshError>;

/// Whether a caller performed the refresh or waited on another caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participation {
    Led,
    Waited,
}

/// Everything a caller learns from joining a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightReport {
    pub outcome: RefreshOutcome,
    pub participation: Participation,
    /// Identifies the refresh; every caller of one flight sees the same id
    pub flight: u64,
}

enum Joined {
    Lead(u64),
    Wait(u64, oneshot::Receiver<RefreshOutcome>),
}

struct InFlight {
    id: u64,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

pub struct RefreshCoordinator {
    backend: Arc<dyn IdentityBackend>,
    store: CredentialStore,
    /// `Some` while a refresh is in flight, holding the queued waiters.
    in_flight: Mutex<Option<InFlight>>,
    next_flight: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(backend: Arc<dyn IdentityBackend>, store: CredentialStore) -> Self {
        Self {
            backend,
            store,
            in_flight: Mutex::new(None),
            next_flight: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Make sure the store holds a fresh credential, refreshing at most once
    /// no matter how many callers ask concurrently.
    pub async fn ensure_valid_credential(&self) -> RefreshOutcome {
        self.join_flight().await.outcome
    }

    /// Like [`ensure_valid_credential`](Self::ensure_valid_credential), also
    /// reporting whether this caller led the refresh.
    pub async fn join_refresh(&self) -> (RefreshOutcome, Participation) {
        let report = self.join_flight().await;
        (report.outcome, report.participation)
    }

    /// Join the in-flight refresh, or lead a new one.
    pub async fn join_flight(&self) -> FlightReport {
        let joined = {
            let mut in_flight = self.lock_in_flight();
            match in_flight.as_mut() {
                Some(flight) => {
                    let (tx, rx) = oneshot::channel();
                    flight.waiters.push_back(tx);
                    debug!(flight = flight.id, position = flight.waiters.len(), "Refresh already in flight, queueing");
                    Joined::Wait(flight.id, rx)
                }
                None => {
                    let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                    *in_flight = Some(InFlight {
                        id,
                        waiters: VecDeque::new(),
                    });
                    Joined::Lead(id)
                }
            }
        };

        let id = match joined {
            Joined::Lead(id) => id,
            Joined::Wait(flight, rx) => {
                return FlightReport {
                    outcome: rx.await.unwrap_or(Err(RefreshError::Abandoned)),
                    participation: Participation::Waited,
                    flight,
                };
            }
        };

        let mut flight = Flight {
            coordinator: self,
            installed: None,
            settled: false,
        };
        let outcome = self.perform_refresh(&mut flight).await;
        flight.settle(&outcome);
        FlightReport {
            outcome,
            participation: Participation::Led,
            flight: id,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock_in_flight().is_some()
    }

    /// Number of callers queued behind the in-flight refresh
    pub fn waiting(&self) -> usize {
        self.lock_in_flight().as_ref().map(|f| f.waiters.len()).unwrap_or(0)
    }

    async fn perform_refresh(&self, flight: &mut Flight<'_>) -> RefreshOutcome {
        debug!("Refreshing access credential");
        let outcome = match self.backend.refresh().await {
            Ok(credential) => {
                self.store.set_credential(credential.clone());
                flight.installed = Some(credential.clone());

                match self.backend.fetch_profile(&credential).await {
                    Ok(user) => self.store.set_user(user),
                    Err(e) => warn!(error = %e, "Failed to fetch profile after refresh"),
                }
                info!("Access credential refreshed");
                Ok(credential)
            }
            Err(e) => {
                warn!(error = %e, "Credential refresh failed, clearing session");
                self.store.clear();
                Err(e)
            }
        };
        self.store.mark_initialized();
        outcome
    }

    /// Clear the in-flight flag and hand every waiter the outcome, in
    /// enqueue order. Both happen under one lock acquisition.
    fn release(&self, outcome: &RefreshOutcome) {
        let waiters = self.lock_in_flight().take().map(|f| f.waiters).unwrap_or_default();
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Releasing refresh waiters");
        }
        for waiter in waiters {
            // A waiter that gave up has dropped its receiver
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Leader's obligation to release the in-flight flag, even if its future is
/// dropped or panics before the refresh finishes.
struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    installed: Option<AccessToken>,
    settled: bool,
}

impl Flight<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        self.coordinator.release(outcome);
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let store = self.coordinator.store();
        let outcome = match self.installed.take() {
            // Credential landed; only the profile fetch was cut short.
            Some(credential) => Ok(credential),
            None => {
                warn!("Credential refresh abandoned mid-flight, clearing session");
                store.clear();
                Err(RefreshError::Abandoned)
            }
        };
        store.mark_initialized();
        self.coordinator.release(&outcome);
    }
}
