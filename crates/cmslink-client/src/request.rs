//! Request descriptions consumed by the executor.

use reqwest::Method;
use serde_json::Value;

/// Which authority surface a request is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authority {
    /// Session JWT obtained through the admin login exchange.
    #[default]
    Admin,
    /// Long-lived static API token.
    Static,
}

/// A single logical request: target, method, body and authority.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Path relative to the service base URL
    pub path: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
    /// Authority surface
    pub authority: Authority,
    /// Label used in logs and errors; defaults to the method name
    pub operation: String,
}

impl RequestSpec {
    /// Admin-scoped request with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            operation: method.as_str().to_string(),
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            authority: Authority::Admin,
        }
    }

    /// `GET path`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path` with a JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    /// `PUT path` with a JSON body
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    /// `DELETE path`
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Select the authority surface.
    #[must_use]
    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }

    /// Send with the static API token instead of the admin session.
    #[must_use]
    pub fn with_static_token(self) -> Self {
        self.with_authority(Authority::Static)
    }

    /// Label the request for logs and errors.
    #[must_use]
    pub fn named(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }
}
