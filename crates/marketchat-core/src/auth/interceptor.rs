//! Transparent re-authorization for outbound calls.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::events::{SessionEvents, TerminationReason};
use super::refresh::RefreshCoordinator;
use super::session::AccessToken;
use crate::api::{ApiError, RefreshError};

/// Wraps an authorized call so that one credential expiry is absorbed: the
/// call is replayed once with a refreshed credential, never twice.
#[derive(Clone)]
pub struct Interceptor {
    coordinator: Arc<RefreshCoordinator>,
    events: SessionEvents,
    /// Highest failed refresh flight already announced; shared by clones
    announced: Arc<AtomicU64>,
}

impl Interceptor {
    pub fn new(coordinator: Arc<RefreshCoordinator>, events: SessionEvents) -> Self {
        Self {
            coordinator,
            events,
            announced: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `call` with the current credential.
    ///
    /// `call` is invoked again to replay the request, so it must rebuild the
    /// request from scratch on every invocation.
    pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T, ApiError>
    where
        F: Fn(Option<AccessToken>) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let store = self.coordinator.store();
        let sent_with = store.credential();

        match call(sent_with.clone()).await {
            Err(e) if e.is_unauthorized() => {}
            result => return result,
        }

        // The credential moved on while this call was out: someone already
        // refreshed, so replay without another round trip.
        if let Some(current) = store.credential().filter(|c| Some(c) != sent_with.as_ref()) {
            debug!("Call rejected with 401, replaying with newer credential");
            return call(Some(current)).await;
        }

        debug!("Call rejected with 401, refreshing credential");
        let report = self.coordinator.join_flight().await;
        match report.outcome {
            Ok(fresh) => call(Some(fresh)).await,
            Err(refresh_error) => {
                self.announce_failure(report.flight, &refresh_error);
                Err(ApiError::SessionExpired(refresh_error))
            }
        }
    }

    /// Emit `Terminated(RefreshFailed)` once per failed flight, whichever
    /// caller led it.
    fn announce_failure(&self, flight: u64, error: &RefreshError) {
        if self.announced.fetch_max(flight, Ordering::SeqCst) < flight {
            warn!(flight, error = %error, "Session terminated after failed refresh");
            self.events.terminated(TerminationReason::RefreshFailed);
        }
    }
}
