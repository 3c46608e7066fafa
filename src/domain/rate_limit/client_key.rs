//! Rate limit key derivation.
//!
//! A key scopes one counter to a client, a policy, and a route. The default
//! strategy identifies clients by network address; policies can swap in a
//! per-user or a shared (global) strategy, or any custom [`KeyStrategy`].
//!
//! Client address precedence:
//! 1. `cf-connecting-ip` (trusted edge)
//! 2. `x-real-ip` (reverse proxy)
//! 3. first hop of `x-forwarded-for`
//! 4. the socket address of the connection
//! 5. the literal `"unknown"`

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::PolicyError;
use super::request::RequestContext;

/// Identity used when no address information is available at all.
pub const UNKNOWN_CLIENT: &str = "unknown";

const CF_CONNECTING_IP: &str = "cf-connecting-ip";
const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Derives the counter key for a request under a named policy.
pub trait KeyStrategy: Send + Sync + fmt::Debug {
    fn key(&self, policy_name: &str, request: &RequestContext<'_>) -> String;
}

/// Resolves client network identity from request metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientKeyResolver;

impl ClientKeyResolver {
    /// Returns the best available client address, or `"unknown"`.
    pub fn client_identity(request: &RequestContext<'_>) -> String {
        let headers = request.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        if let Some(ip) = header(CF_CONNECTING_IP) {
            return ip.to_string();
        }

        if let Some(ip) = header(X_REAL_IP) {
            return ip.to_string();
        }

        // Take the first IP (client IP, before any proxies)
        if let Some(first_hop) = header(X_FORWARDED_FOR)
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
        {
            return first_hop.to_string();
        }

        request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }

    /// Composes `"{policy}:{client}:{path}"`.
    pub fn resolve(request: &RequestContext<'_>, policy_name: &str) -> String {
        format!(
            "{}:{}:{}",
            policy_name,
            Self::client_identity(request),
            request.path()
        )
    }
}

/// Built-in key strategies, selectable by name from configuration.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategyKind {
    /// Per client network address.
    #[default]
    Ip,
    /// Per authenticated principal, falling back to the network address.
    User,
    /// One counter shared by every client of a route.
    Global,
}

impl KeyStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStrategyKind::Ip => "ip",
            KeyStrategyKind::User => "user",
            KeyStrategyKind::Global => "global",
        }
    }

    /// Returns the shared strategy instance for this kind.
    pub fn strategy(&self) -> Arc<dyn KeyStrategy> {
        match self {
            KeyStrategyKind::Ip => Arc::new(IpKeyStrategy),
            KeyStrategyKind::User => Arc::new(UserKeyStrategy),
            KeyStrategyKind::Global => Arc::new(GlobalKeyStrategy),
        }
    }
}

impl fmt::Display for KeyStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KeyStrategyKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(KeyStrategyKind::Ip),
            "user" => Ok(KeyStrategyKind::User),
            "global" => Ok(KeyStrategyKind::Global),
            other => Err(PolicyError::UnknownKeyStrategy(other.to_string())),
        }
    }
}

/// Keys by client network address.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpKeyStrategy;

impl KeyStrategy for IpKeyStrategy {
    fn key(&self, policy_name: &str, request: &RequestContext<'_>) -> String {
        ClientKeyResolver::resolve(request, policy_name)
    }
}

/// Keys by authenticated principal when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserKeyStrategy;

impl KeyStrategy for UserKeyStrategy {
    fn key(&self, policy_name: &str, request: &RequestContext<'_>) -> String {
        match request.principal() {
            Some(principal) => format!("{}:user:{}:{}", policy_name, principal, request.path()),
            None => ClientKeyResolver::resolve(request, policy_name),
        }
    }
}

/// Every client shares one counter per policy and route.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalKeyStrategy;

impl KeyStrategy for GlobalKeyStrategy {
    fn key(&self, policy_name: &str, request: &RequestContext<'_>) -> String {
        format!("{}:global:{}", policy_name, request.path())
    }
}
