//! Navigation gating policy.
//!
//! Rules are checked in a fixed precedence order and the first match wins:
//!
//! 1. public destination: allow, without looking at the session
//! 2. uninitialized session, guest-only destination: adopt guest status
//! 3. uninitialized session, auth destination: restore the session first
//! 4. signed out, auth destination: login
//! 5. signed in, guest-only destination: landing
//! 6. unverified email, destination needs verification: verification page
//! 7. verified email, verification page: landing
//! 8. verified worker without skills: onboarding
//! 9. onboarded worker, onboarding page: landing
//! 10. allow
//!
//! Verification is checked before onboarding so an unverified worker is
//! never bounced between the two pages.

use serde::{Deserialize, Serialize};

use super::routes::{Route, RoutePaths};
use crate::auth::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

impl GuardDecision {
    fn redirect(path: &str) -> Self {
        GuardDecision::Redirect(path.to_string())
    }
}

/// Outcome of evaluating the policy against a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardStep {
    Decided(GuardDecision),
    /// Rule 2: mark the session initialized as a guest, then allow
    AdoptGuest,
    /// Rule 3: restore the session, then [`decide`] on the new snapshot
    Initialize,
}

/// Evaluate all rules against a session snapshot.
pub fn evaluate(destination: &Route, session: &Session, paths: &RoutePaths) -> GuardStep {
    let requirement = destination.requirement;

    if requirement.is_public() {
        return GuardStep::Decided(GuardDecision::Allow);
    }

    if !session.initialized {
        if requirement.requires_guest {
            return GuardStep::AdoptGuest;
        }
        if requirement.requires_auth {
            return GuardStep::Initialize;
        }
    }

    GuardStep::Decided(decide(destination, session, paths))
}

/// Rules 4 through 10, for a session whose state is known.
pub fn decide(destination: &Route, session: &Session, paths: &RoutePaths) -> GuardDecision {
    let requirement = destination.requirement;
    let path = destination.path.as_str();

    if !session.is_authenticated() {
        return if requirement.requires_auth {
            GuardDecision::redirect(&paths.login)
        } else {
            GuardDecision::Allow
        };
    }

    if requirement.requires_guest {
        return GuardDecision::redirect(&paths.landing);
    }

    // Credential without a loaded user: nothing to judge profile rules on
    let Some(user) = session.user.as_ref() else {
        return GuardDecision::Allow;
    };

    if !user.email_verified && requirement.requires_email_verification && path != paths.verification {
        return GuardDecision::redirect(&paths.verification);
    }

    if user.email_verified && path == paths.verification {
        return GuardDecision::redirect(&paths.landing);
    }

    if user.email_verified && user.needs_onboarding() && path != paths.onboarding {
        return GuardDecision::redirect(&paths.onboarding);
    }

    if user.is_worker() && !user.skills().is_empty() && path == paths.onboarding {
        return GuardDecision::redirect(&paths.landing);
    }

    GuardDecision::Allow
}
