// ABOUTME: Route registry - ordered (matcher, handler) pairs built before startup
// ABOUTME: Freezing sorts by descending pattern length and yields an immutable RouteTable

use std::sync::Arc;

use thiserror::Error;

use crate::event::InboundEvent;
use crate::handler::{Handler, SharedHandler};
use crate::matcher::{Matcher, RegexMatcher};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A matcher paired with the handler it triggers
#[derive(Clone)]
pub struct Route {
    matcher: Arc<dyn Matcher>,
    match_formatted: bool,
    handler: SharedHandler,
}

impl Route {
    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }

    /// Whether the formatted body (when present) is matched instead of the plain one
    pub fn matches_formatted(&self) -> bool {
        self.match_formatted
    }

    pub fn handler(&self) -> SharedHandler {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern())
            .field("match_formatted", &self.match_formatted)
            .finish()
    }
}

/// Mutable route list used during setup
#[derive(Default)]
pub struct RouteRegistry {
    routes: Vec<Route>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a regex route. Fails on a malformed pattern.
    pub fn add_route<H>(
        &mut self,
        pattern: &str,
        match_formatted: bool,
        handler: H,
    ) -> Result<&mut Self, RouteError>
    where
        H: Handler + 'static,
    {
        let matcher = RegexMatcher::new(pattern).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(self.add_matcher(matcher, match_formatted, Arc::new(handler)))
    }

    /// Register a route with any matcher implementation
    pub fn add_matcher<M>(
        &mut self,
        matcher: M,
        match_formatted: bool,
        handler: SharedHandler,
    ) -> &mut Self
    where
        M: Matcher + 'static,
    {
        self.routes.push(Route {
            matcher: Arc::new(matcher),
            match_formatted,
            handler,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Sort by descending pattern length (stable, so equal lengths keep
    /// registration order) and freeze
    pub fn freeze(mut self) -> RouteTable {
        self.routes
            .sort_by(|a, b| b.pattern().len().cmp(&a.pattern().len()));
        RouteTable {
            routes: self.routes.into(),
        }
    }
}

/// Frozen, precedence-ordered routes. Cheap to clone and safe to share.
#[derive(Clone, Debug)]
pub struct RouteTable {
    routes: Arc<[Route]>,
}

impl RouteTable {
    /// First route (in precedence order) whose matcher accepts the event's target text
    pub fn find(&self, event: &InboundEvent) -> Option<&Route> {
        self.routes.iter().find(|route| {
            route
                .matcher()
                .is_match(event.match_target(route.matches_formatted()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
