//! Framework-neutral view of an inbound request.

use std::net::IpAddr;

use http::HeaderMap;

/// Authenticated principal attached to a request by upstream auth middleware.
///
/// Insert it into the request extensions to make per-user key strategies
/// count by principal instead of by network address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientPrincipal(pub String);

/// The parts of a request the limiter looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    path: &'a str,
    headers: &'a HeaderMap,
    remote_addr: Option<IpAddr>,
    principal: Option<&'a str>,
}

impl<'a> RequestContext<'a> {
    pub fn new(path: &'a str, headers: &'a HeaderMap) -> Self {
        Self {
            path,
            headers,
            remote_addr: None,
            principal: None,
        }
    }

    /// Sets the raw connection address of the peer.
    pub fn with_remote_addr(mut self, addr: Option<IpAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    /// Sets the authenticated principal, if any.
    pub fn with_principal(mut self, principal: Option<&'a str>) -> Self {
        self.principal = principal;
        self
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    pub fn headers(&self) -> &'a HeaderMap {
        self.headers
    }

    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    pub fn principal(&self) -> Option<&'a str> {
        self.principal
    }
}
