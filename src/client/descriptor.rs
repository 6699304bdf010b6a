//! Request Descriptor Module
//!
//! Describes one logical API call and derives its cache key.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::limiter::Priority;

// == Method ==
/// HTTP method of a logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// True for methods with no remote side effects.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Request Descriptor ==
/// One logical call: what to send, and how the pipeline should treat it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the API base URL
    pub endpoint: String,
    pub body: Option<Value>,
    /// Consult and populate the cache; only honoured for reads
    pub use_cache: bool,
    /// Overrides the cache's default TTL
    pub cache_ttl: Option<Duration>,
    pub priority: Priority,
    /// Overrides the executor's default retry count
    pub max_retries: Option<u32>,
}

impl RequestDescriptor {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            use_cache: true,
            cache_ttl: None,
            priority: Priority::Normal,
            max_retries: None,
        }
    }

    /// Fetches a resource.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    /// Creates a resource from `body`.
    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, endpoint).body(body)
    }

    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, endpoint).body(body)
    }

    pub fn patch(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, endpoint).body(body)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    /// Cacheable read whose query travels in the body.
    pub fn search(endpoint: impl Into<String>, query: Value) -> Self {
        Self::new(Method::Get, endpoint).body(query)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    // == Cacheable ==
    /// True when the executor may answer from, and write to, the cache.
    pub fn is_cacheable(&self) -> bool {
        self.use_cache && self.method.is_read()
    }

    // == Cache Key ==
    /// Derives the cache key from method, endpoint and body.
    ///
    /// Cache policy, priority and retry settings do not participate, so two
    /// descriptors for the same call share a key. Object keys serialize in
    /// sorted order, which keeps the key stable across equal bodies.
    pub fn cache_key(&self) -> String {
        let body = self
            .body
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        format!("{}|{}|{}", self.method, self.endpoint, body)
    }
}
