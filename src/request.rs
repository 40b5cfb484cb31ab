//! Request context and client address normalization.

use std::net::IpAddr;

/// Describes the request an event happened in.
///
/// Only the raw client address is read here; validation happens in
/// [`normalize_ip`] so every context is treated the same way.
pub trait RequestContext: Send + Sync {
    /// Returns the raw client address, if the call came from a client.
    fn remote_addr(&self) -> Option<String>;

    /// Returns the network (site) id.
    fn site_id(&self) -> u64 {
        1
    }

    /// Returns the tenant (blog) id.
    fn blog_id(&self) -> u64 {
        1
    }
}

/// A request context with no client, for command-line and background calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRequest;

impl RequestContext for NoRequest {
    fn remote_addr(&self) -> Option<String> {
        None
    }
}

/// A request context built from known values.
///
/// # Examples
///
/// ```
/// use audit_core::{RequestContext, StaticRequest};
///
/// let request = StaticRequest::new()
///     .with_remote_addr("198.51.100.4")
///     .with_blog_id(3);
///
/// assert_eq!(request.remote_addr().as_deref(), Some("198.51.100.4"));
/// assert_eq!(request.site_id(), 1);
/// assert_eq!(request.blog_id(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct StaticRequest {
    remote_addr: Option<String>,
    site_id: u64,
    blog_id: u64,
}

impl Default for StaticRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticRequest {
    /// Creates a context for site 1, blog 1, with no client address.
    pub fn new() -> Self {
        Self {
            remote_addr: None,
            site_id: 1,
            blog_id: 1,
        }
    }

    /// Sets the raw client address.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Sets the site id.
    pub fn with_site_id(mut self, site_id: u64) -> Self {
        self.site_id = site_id;
        self
    }

    /// Sets the blog id.
    pub fn with_blog_id(mut self, blog_id: u64) -> Self {
        self.blog_id = blog_id;
        self
    }
}

impl RequestContext for StaticRequest {
    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }

    fn site_id(&self) -> u64 {
        self.site_id
    }

    fn blog_id(&self) -> u64 {
        self.blog_id
    }
}

/// Request values captured once per logging call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Normalized client IP (empty when unknown or invalid)
    pub client_ip: String,
    /// Network (site) id
    pub site_id: u64,
    /// Tenant (blog) id
    pub blog_id: u64,
}

impl RequestInfo {
    /// Captures the values of a request context.
    pub fn capture(request: &dyn RequestContext) -> Self {
        Self {
            client_ip: normalize_ip(request.remote_addr().as_deref()),
            site_id: request.site_id(),
            blog_id: request.blog_id(),
        }
    }
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self::capture(&NoRequest)
    }
}

/// Returns the address if it is a valid IPv4 or IPv6 address, else an empty string.
///
/// # Examples
///
/// ```
/// use audit_core::normalize_ip;
///
/// assert_eq!(normalize_ip(Some("192.0.2.7")), "192.0.2.7");
/// assert_eq!(normalize_ip(Some("::1")), "::1");
/// assert_eq!(normalize_ip(Some("not-an-ip")), "");
/// assert_eq!(normalize_ip(None), "");
/// ```
pub fn normalize_ip(raw: Option<&str>) -> String {
    match raw {
        Some(addr) if addr.parse::<IpAddr>().is_ok() => addr.to_string(),
        _ => String::new(),
    }
}
