use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::policy::{decide, evaluate, GuardDecision, GuardStep};
use super::routes::{Route, RouteTable};
use crate::auth::RefreshCoordinator;

/// Upper bound on redirects followed by [`NavigationGuard::settle`]
pub const MAX_REDIRECTS: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Redirect loop: {}", .0.join(" -> "))]
    RedirectLoop(Vec<String>),
}

/// Gatekeeper consulted before every navigation.
#[derive(Clone)]
pub struct NavigationGuard {
    coordinator: Arc<RefreshCoordinator>,
    routes: Arc<RouteTable>,
}

impl NavigationGuard {
    pub fn new(coordinator: Arc<RefreshCoordinator>, routes: RouteTable) -> Self {
        Self {
            coordinator,
            routes: Arc::new(routes),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decide whether `destination` may be entered.
    ///
    /// Only an auth destination reached before the session is known touches
    /// the network, and then only through the shared refresh.
    pub async fn check(&self, destination: &Route) -> GuardDecision {
        let store = self.coordinator.store();
        let paths = self.routes.paths();

        let decision = match evaluate(destination, &store.snapshot(), paths) {
            GuardStep::Decided(decision) => decision,
            GuardStep::AdoptGuest => {
                store.mark_initialized();
                GuardDecision::Allow
            }
            GuardStep::Initialize => {
                if let Err(e) = self.coordinator.ensure_valid_credential().await {
                    debug!(error = %e, "No session to restore, continuing as guest");
                }
                decide(destination, &store.snapshot(), paths)
            }
        };

        debug!(path = %destination.path, ?decision, "Navigation checked");
        decision
    }

    /// Check a location string. Aliases forward to their target and
    /// locations outside the table are not gated.
    pub async fn navigate(&self, location: &str) -> GuardDecision {
        match self.routes.resolve(location) {
            Some(route) => match &route.redirect {
                Some(target) => GuardDecision::Redirect(target.clone()),
                None => self.check(route).await,
            },
            None => GuardDecision::Allow,
        }
    }

    /// Follow redirects from `location` to the page that finally renders.
    pub async fn settle(&self, location: &str) -> Result<String, NavigationError> {
        let mut visited = vec![location.to_string()];
        let mut current = location.to_string();

        for _ in 0..MAX_REDIRECTS {
            match self.navigate(&current).await {
                GuardDecision::Allow => return Ok(current),
                GuardDecision::Redirect(next) => {
                    visited.push(next.clone());
                    current = next;
                }
            }
        }

        Err(NavigationError::RedirectLoop(visited))
    }
}
