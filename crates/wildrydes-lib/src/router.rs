//! Method and path routing.
//!
//! The route table is static. `OPTIONS` on any path is a CORS preflight and
//! never requires authentication; everything else must match an entry
//! exactly (ignoring the query string and a trailing slash).

use http::Method;

use crate::error::RouteError;

/// Operation selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Preflight,
    CreateRide,
}

/// Result of a successful route lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch {
    pub handler: Handler,
    /// The caller must present a verified bearer token.
    pub requires_auth: bool,
}

#[derive(Debug, Clone)]
struct RouteEntry {
    method: Method,
    path: &'static str,
    handler: Handler,
    requires_auth: bool,
}

#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<RouteEntry>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: vec![RouteEntry {
                method: Method::POST,
                path: "/ride",
                handler: Handler::CreateRide,
                requires_auth: true,
            }],
        }
    }

    pub fn route(&self, method: &Method, path: &str) -> Result<RouteMatch, RouteError> {
        if method == Method::OPTIONS {
            return Ok(RouteMatch {
                handler: Handler::Preflight,
                requires_auth: false,
            });
        }

        let normalized = normalize_path(path);
        self.routes
            .iter()
            .find(|entry| entry.method == method && entry.path == normalized)
            .map(|entry| RouteMatch {
                handler: entry.handler,
                requires_auth: entry.requires_auth,
            })
            .ok_or_else(|| RouteError::NotFound {
                method: method.to_string(),
                path: normalized.to_string(),
            })
    }
}

fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
