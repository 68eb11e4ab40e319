//! Request-scoped caller context for Auditline.
//!
//! The inbound request layer establishes a scope per request:
//!
//! ```
//! use auditline_audit_context::{CallerContext, RequestContext};
//!
//! let caller = CallerContext::new(Some("alice"), Some("10.0.0.5"), Some("/accounts/42"));
//! let user = RequestContext::sync_scope(caller, RequestContext::acting_user);
//! assert_eq!(user.as_deref(), Some("alice"));
//! assert!(RequestContext::acting_user().is_none());
//! ```

mod caller;
mod request;

pub use caller::CallerContext;
pub use request::RequestContext;
