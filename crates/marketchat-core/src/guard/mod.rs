//! Navigation gating.
//!
//! - `routes`: the route table and each destination's requirements
//! - `policy`: the pure decision over a destination and a session snapshot
//! - `navigation`: the async guard that adds the lazy initial refresh

pub mod navigation;
pub mod policy;
pub mod routes;

pub use navigation::{NavigationError, NavigationGuard, MAX_REDIRECTS};
pub use policy::{decide, evaluate, GuardDecision, GuardStep};
pub use routes::{Route, RoutePaths, RouteRequirement, RouteTable};
