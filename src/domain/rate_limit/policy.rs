//! Rate limit policies and route-to-policy resolution.
//!
//! Resolution order for a request path:
//! 1. exact literal match
//! 2. longest matching wildcard prefix (`/api/admin/*`)
//! 3. the table's default policy
//!
//! A literal entry is never shadowed by a broader wildcard.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::client_key::{IpKeyStrategy, KeyStrategy};
use super::errors::PolicyError;
use super::window::WindowSpec;

/// Name given to the fallback policy.
pub const DEFAULT_POLICY_NAME: &str = "default";

/// A named rate limiting rule.
#[derive(Debug, Clone)]
pub struct Policy {
    name: String,
    request_limit: u32,
    window: WindowSpec,
    key_strategy: Arc<dyn KeyStrategy>,
}

impl Policy {
    /// Creates a policy keyed by client address.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidLimit` when `request_limit` is zero.
    pub fn new(
        name: impl Into<String>,
        request_limit: u32,
        window: WindowSpec,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        if request_limit == 0 {
            return Err(PolicyError::InvalidLimit(name));
        }
        Ok(Self {
            name,
            request_limit,
            window,
            key_strategy: Arc::new(IpKeyStrategy),
        })
    }

    /// Replaces the key strategy.
    pub fn with_key_strategy(mut self, strategy: Arc<dyn KeyStrategy>) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_limit(&self) -> u32 {
        self.request_limit
    }

    pub fn window(&self) -> WindowSpec {
        self.window
    }

    pub fn key_strategy(&self) -> &Arc<dyn KeyStrategy> {
        &self.key_strategy
    }

    /// Value for the `X-RateLimit-Policy` header, e.g. `60;w=1h`.
    pub fn descriptor(&self) -> String {
        format!("{};w={}", self.request_limit, self.window)
    }
}

/// A route pattern: a literal path or a `prefix/*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutePattern {
    Exact(String),
    /// Stores the prefix including its trailing slash.
    Prefix(String),
}

impl RoutePattern {
    /// Parses `/literal/path` or `/prefix/*`.
    pub fn parse(pattern: &str) -> Result<Self, PolicyError> {
        let invalid = || PolicyError::InvalidRoutePattern(pattern.to_string());

        if !pattern.starts_with('/') {
            return Err(invalid());
        }

        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('/') && !prefix.contains('*') => {
                Ok(RoutePattern::Prefix(prefix.to_string()))
            }
            Some(_) => Err(invalid()),
            None if pattern.contains('*') => Err(invalid()),
            None => Ok(RoutePattern::Exact(pattern.to_string())),
        }
    }

    /// Whether `path` falls under this pattern.
    ///
    /// A prefix pattern also matches its bare root (`/api/admin` for `/api/admin/*`).
    pub fn matches(&self, path: &str) -> bool {
        match self {
            RoutePattern::Exact(literal) => literal == path,
            RoutePattern::Prefix(prefix) => prefix_matches(prefix, path),
        }
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    path.starts_with(prefix) || path == prefix.trim_end_matches('/')
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutePattern::Exact(literal) => write!(f, "{}", literal),
            RoutePattern::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}

/// Route patterns mapped to policies, plus the mandatory default.
///
/// Read-only once the limiter is built.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    exact: HashMap<String, Policy>,
    /// Sorted longest prefix first.
    prefixes: Vec<(String, Policy)>,
    default: Policy,
}

impl PolicyTable {
    /// Creates a table that sends every route to `default`.
    pub fn new(default: Policy) -> Self {
        Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            default,
        }
    }

    /// Registers `policy` for a route pattern.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed pattern or one already registered.
    pub fn insert(&mut self, pattern: &str, policy: Policy) -> Result<(), PolicyError> {
        match RoutePattern::parse(pattern)? {
            RoutePattern::Exact(path) => {
                if self.exact.contains_key(&path) {
                    return Err(PolicyError::DuplicateRoute(pattern.to_string()));
                }
                self.exact.insert(path, policy);
            }
            RoutePattern::Prefix(prefix) => {
                if self.prefixes.iter().any(|(p, _)| *p == prefix) {
                    return Err(PolicyError::DuplicateRoute(pattern.to_string()));
                }
                self.prefixes.push((prefix, policy));
                self.prefixes
                    .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            }
        }
        Ok(())
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_route(mut self, pattern: &str, policy: Policy) -> Result<Self, PolicyError> {
        self.insert(pattern, policy)?;
        Ok(self)
    }

    /// Resolves the policy governing `path`.
    pub fn resolve(&self, path: &str) -> &Policy {
        if let Some(policy) = self.exact.get(path) {
            return policy;
        }

        self.prefixes
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, path))
            .map(|(_, policy)| policy)
            .unwrap_or(&self.default)
    }

    pub fn default_policy(&self) -> &Policy {
        &self.default
    }

    /// Number of registered routes, excluding the default.
    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(text: &str) -> WindowSpec {
        WindowSpec::parse(text).unwrap()
    }

    fn policy(name: &str, limit: u32) -> Policy {
        Policy::new(name, limit, window("1m")).unwrap()
    }

    fn table() -> PolicyTable {
        PolicyTable::new(policy(DEFAULT_POLICY_NAME, 1000))
            .with_route("/api/auth/signin", policy("signin", 5))
            .unwrap()
            .with_route("/api/*", policy("api", 100))
            .unwrap()
            .with_route("/api/admin/*", policy("admin", 300))
            .unwrap()
    }

    // ─── Policy Tests ─────────────────────────────────────────────────

    #[test]
    fn zero_limit_is_rejected() {
        let err = Policy::new("broken", 0, window("1m")).unwrap_err();
        assert_eq!(err, PolicyError::InvalidLimit("broken".to_string()));
    }

    #[test]
    fn descriptor_renders_limit_and_window() {
        let p = Policy::new("hourly", 60, window("1h")).unwrap();
        assert_eq!(p.descriptor(), "60;w=1h");
    }

    // ─── Pattern Tests ────────────────────────────────────────────────

    #[test]
    fn parses_literal_and_wildcard_patterns() {
        assert_eq!(
            RoutePattern::parse("/api/contact").unwrap(),
            RoutePattern::Exact("/api/contact".to_string())
        );
        assert_eq!(
            RoutePattern::parse("/api/admin/*").unwrap(),
            RoutePattern::Prefix("/api/admin/".to_string())
        );
    }

    #[test]
    fn rejects_malformed_patterns() {
        for pattern in ["", "api/contact", "/api/*/users", "/api*", "/api/**"] {
            assert!(RoutePattern::parse(pattern).is_err(), "{pattern:?} should be rejected");
        }
    }

    #[test]
    fn prefix_matches_its_root() {
        let pattern = RoutePattern::parse("/api/admin/*").unwrap();
        assert!(pattern.matches("/api/admin"));
        assert!(pattern.matches("/api/admin/users"));
        assert!(!pattern.matches("/api/administrators"));
    }

    // ─── Resolution Tests ─────────────────────────────────────────────

    #[test]
    fn exact_match_beats_wildcard() {
        assert_eq!(table().resolve("/api/auth/signin").name(), "signin");
    }

    #[test]
    fn longest_wildcard_wins() {
        let t = table();
        assert_eq!(t.resolve("/api/admin/users").name(), "admin");
        assert_eq!(t.resolve("/api/other").name(), "api");
    }

    #[test]
    fn unmatched_route_uses_default() {
        assert_eq!(table().resolve("/health").name(), DEFAULT_POLICY_NAME);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let t = PolicyTable::new(policy(DEFAULT_POLICY_NAME, 1000))
            .with_route("/api/admin/*", policy("admin", 300))
            .unwrap()
            .with_route("/api/*", policy("api", 100))
            .unwrap();
        assert_eq!(t.resolve("/api/admin/users").name(), "admin");
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let err = table()
            .with_route("/api/*", policy("again", 1))
            .unwrap_err();
        assert_eq!(err, PolicyError::DuplicateRoute("/api/*".to_string()));

        let err = table()
            .with_route("/api/auth/signin", policy("again", 1))
            .unwrap_err();
        assert_eq!(err, PolicyError::DuplicateRoute("/api/auth/signin".to_string()));
    }

    #[test]
    fn len_counts_registered_routes() {
        assert_eq!(table().len(), 3);
        assert!(PolicyTable::new(policy(DEFAULT_POLICY_NAME, 1)).is_empty());
    }
}
