//! Caller identity values.

use serde::{Deserialize, Serialize};

/// Identity of the caller that triggered a request.
///
/// A plain value: it can be stored in the request scope or threaded
/// through the call chain and handed straight to the record builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    acting_user: Option<String>,
    source_address: Option<String>,
    request_path: Option<String>,
}

impl CallerContext {
    /// Create a context from the three request attributes.
    pub fn new(
        acting_user: Option<&str>,
        source_address: Option<&str>,
        request_path: Option<&str>,
    ) -> Self {
        Self {
            acting_user: acting_user.map(str::to_string),
            source_address: source_address.map(str::to_string),
            request_path: request_path.map(str::to_string),
        }
    }

    /// Context with no caller information.
    pub const fn empty() -> Self {
        Self {
            acting_user: None,
            source_address: None,
            request_path: None,
        }
    }

    /// Set the acting user.
    #[must_use]
    pub fn with_acting_user(mut self, user: impl Into<String>) -> Self {
        self.acting_user = Some(user.into());
        self
    }

    /// Set the source address.
    #[must_use]
    pub fn with_source_address(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    /// Set the requested endpoint.
    #[must_use]
    pub fn with_request_path(mut self, path: impl Into<String>) -> Self {
        self.request_path = Some(path.into());
        self
    }

    pub fn acting_user(&self) -> Option<&str> {
        self.acting_user.as_deref()
    }

    pub fn source_address(&self) -> Option<&str> {
        self.source_address.as_deref()
    }

    pub fn request_path(&self) -> Option<&str> {
        self.request_path.as_deref()
    }

    /// True when no attribute is set.
    pub fn is_empty(&self) -> bool {
        self.acting_user.is_none() && self.source_address.is_none() && self.request_path.is_none()
    }
}
