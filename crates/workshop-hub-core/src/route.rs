//! Request routing for the offline cache worker.
//!
//! A [`RouteTable`] is an ordered list of `(predicate, strategy)` pairs. The
//! first predicate matching a request decides how it is served. The default
//! table sends API paths to [`Strategy::NetworkFirst`] and everything else to
//! [`Strategy::CacheFirst`].

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

use crate::models::HttpRequest;

/// API path patterns served network-first by default.
pub const DEFAULT_API_PATTERNS: &[&str] = &[
    r"/api/profiles",
    r"/api/posts",
    r"/api/knowledge",
    r"/api/vehicles",
    r"/api/trips",
];

/// Static asset patterns eligible for dynamic caching on a cache-first miss.
pub const DEFAULT_CACHEABLE_PATTERNS: &[&str] = &[
    r"\.(jpg|jpeg|png|gif|webp|svg|ico)$",
    r"\.css$",
    r"\.js$",
    r"\.(woff|woff2|ttf|otf)$",
    r"\.pdf$",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Live response preferred; cache is the offline fallback.
    NetworkFirst,
    /// Cached response served immediately and refreshed in the background.
    CacheFirst,
}

#[derive(Debug, Clone)]
pub enum RoutePredicate {
    /// Request path matches any of the regexes.
    PathMatches(Vec<Regex>),
    Any,
}

impl RoutePredicate {
    pub fn matches(&self, request: &HttpRequest) -> bool {
        match self {
            RoutePredicate::Any => true,
            RoutePredicate::PathMatches(patterns) => {
                let path = request.path().unwrap_or_else(|| request.url.clone());
                patterns.iter().any(|re| re.is_match(&path))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub predicate: RoutePredicate,
    pub strategy: Strategy,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// API patterns to network-first, then a cache-first catch-all.
    pub fn with_api_patterns<S: AsRef<str>>(api_patterns: &[S]) -> Result<Self> {
        Ok(Self::new(vec![
            Route {
                predicate: RoutePredicate::PathMatches(compile(api_patterns, false)?),
                strategy: Strategy::NetworkFirst,
            },
            Route {
                predicate: RoutePredicate::Any,
                strategy: Strategy::CacheFirst,
            },
        ]))
    }

    /// Strategy of the first matching route. A table without a match falls
    /// back to cache-first.
    pub fn resolve(&self, request: &HttpRequest) -> Strategy {
        self.routes
            .iter()
            .find(|r| r.predicate.matches(request))
            .map(|r| r.strategy)
            .unwrap_or(Strategy::CacheFirst)
    }
}

/// Which cache-first misses are worth writing to the dynamic cache.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    cacheable: Vec<Regex>,
}

impl CachePolicy {
    /// Patterns are matched case-insensitively against the request path.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        Ok(Self {
            cacheable: compile(patterns, true)?,
        })
    }

    pub fn is_cacheable(&self, request: &HttpRequest) -> bool {
        let Some(path) = request.path() else {
            return false;
        };
        self.cacheable.iter().any(|re| re.is_match(&path))
    }
}

/// Compile route patterns, naming the offending pattern on failure.
pub fn compile<S: AsRef<str>>(patterns: &[S], case_insensitive: bool) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p.as_ref())
                .case_insensitive(case_insensitive)
                .build()
                .with_context(|| format!("invalid route pattern '{}'", p.as_ref()))
        })
        .collect()
}
