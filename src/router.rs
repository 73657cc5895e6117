//! Simple router abstraction for registering and matching request handlers.
//!
//! Routes match an exact path filtered by HTTP method. The query string is
//! ignored when matching. Handlers receive the request by value so
//! the upload handler can take the body without copying it.

use crate::error::AppError;
use crate::http::{Request, Response};
use log::{debug, trace};

/// Type alias for a request handler closure.
pub type Handler = Box<dyn Fn(Request) -> Result<Response, AppError> + Send + Sync + 'static>;

struct RouteEntry {
    method: String,
    path: String,
    handler: Handler,
}

impl RouteEntry {
    fn matches(&self, method: &str, path: &str) -> bool {
        self.method == method && self.path == path
    }
}

/// A minimal router storing registered routes and resolving them for incoming requests.
#[derive(Default)]
pub struct Router {
    routes: Vec<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exact path match for the given HTTP method.
    pub fn register_exact<M, P>(&mut self, method: M, path: P, handler: Handler)
    where
        M: Into<String>,
        P: Into<String>,
    {
        self.routes.push(RouteEntry {
            method: method.into().to_uppercase(),
            path: path.into(),
            handler,
        });
    }

    /// Resolve a request to the first matching route and run its handler.
    /// Returns `None` if no route matched.
    pub fn route(&self, request: Request) -> Option<Result<Response, AppError>> {
        debug!("Routing request: {} {}", request.method, request.path);
        trace!("Available routes: {}", self.routes.len());

        let method = request.method.to_uppercase();
        let path_only = request
            .path
            .split_once('?')
            .map_or(request.path.as_str(), |(path, _)| path);

        let entry = self
            .routes
            .iter()
            .find(|entry| entry.matches(&method, path_only));
        match entry {
            Some(entry) => {
                debug!("Route matched: {} {}", entry.method, entry.path);
                Some((entry.handler)(request))
            }
            None => {
                debug!("No route matched for: {} {}", request.method, request.path);
                None
            }
        }
    }
}
