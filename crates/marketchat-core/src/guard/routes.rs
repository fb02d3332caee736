use serde::{Deserialize, Serialize};

/// Gating attached to a destination. Never mutated at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RouteRequirement {
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub requires_guest: bool,
    #[serde(default)]
    pub requires_email_verification: bool,
}

impl RouteRequirement {
    pub const PUBLIC: Self = Self {
        requires_auth: false,
        requires_guest: false,
        requires_email_verification: false,
    };

    pub const GUEST: Self = Self {
        requires_guest: true,
        ..Self::PUBLIC
    };

    pub const AUTH: Self = Self {
        requires_auth: true,
        ..Self::PUBLIC
    };

    pub const VERIFIED: Self = Self {
        requires_auth: true,
        requires_email_verification: true,
        ..Self::PUBLIC
    };

    /// Neither auth nor guest status matters
    pub fn is_public(&self) -> bool {
        !self.requires_auth && !self.requires_guest
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.requires_auth {
            parts.push("auth");
        }
        if self.requires_guest {
            parts.push("guest");
        }
        if self.requires_email_verification {
            parts.push("verified email");
        }
        if parts.is_empty() {
            "public".to_string()
        } else {
            parts.join(" + ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub name: String,
    pub requirement: RouteRequirement,
    /// Alias routes forward here without being gated themselves
    pub redirect: Option<String>,
}

impl Route {
    pub fn new(path: &str, name: &str, requirement: RouteRequirement) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
            requirement,
            redirect: None,
        }
    }

    pub fn alias(path: &str, name: &str, target: &str) -> Self {
        Self {
            redirect: Some(target.to_string()),
            ..Self::new(path, name, RouteRequirement::PUBLIC)
        }
    }
}

/// Destinations the guard redirects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePaths {
    pub login: String,
    /// Default landing route for signed-in users bounced off guest pages
    pub landing: String,
    pub verification: String,
    pub onboarding: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            landing: "/search".to_string(),
            verification: "/verify-email".to_string(),
            onboarding: "/onboarding".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    paths: RoutePaths,
}

impl Default for RouteTable {
    fn default() -> Self {
        let paths = RoutePaths::default();
        let landing = paths.landing.clone();
        Self::new(paths)
            .with_route(Route::alias("/", "root", &landing))
            .with_route(Route::new("/search", "search", RouteRequirement::PUBLIC))
            .with_route(Route::new("/login", "login", RouteRequirement::GUEST))
            .with_route(Route::new("/register", "register", RouteRequirement::GUEST))
            .with_route(Route::new("/chats", "chats", RouteRequirement::VERIFIED))
            .with_route(Route::new("/profile", "profile", RouteRequirement::AUTH))
            .with_route(Route::new("/verify-email", "verify-email", RouteRequirement::AUTH))
            .with_route(Route::new("/onboarding", "onboarding", RouteRequirement::VERIFIED))
    }
}

impl RouteTable {
    pub fn new(paths: RoutePaths) -> Self {
        Self {
            routes: Vec::new(),
            paths,
        }
    }

    /// Add a route, replacing any existing route with the same path
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.retain(|r| r.path != route.path);
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn paths(&self) -> &RoutePaths {
        &self.paths
    }

    /// Find the route for a location, ignoring query string, fragment and
    /// trailing slash.
    pub fn resolve(&self, location: &str) -> Option<&Route> {
        let path = normalize(location);
        self.routes.iter().find(|r| r.path == path)
    }
}

fn normalize(location: &str) -> &str {
    let end = location.find(|c: char| c == '?' || c == '#').unwrap_or(location.len());
    let path = &location[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
