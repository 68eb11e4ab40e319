//! Record building and lifecycle hooks for Auditline.
//!
//! Entities opt in through [`Auditable`] (usually via [`auditable!`]).
//! [`RecordBuilder`] turns an entity, an action and the caller into an
//! immutable record; [`EntityAuditor`] wires that to a dispatcher for the
//! create, update and remove hooks of a persistence layer.

mod auditable;
mod auditor;
mod builder;

pub use auditable::{Auditable, HasIdentifier};
pub use auditor::EntityAuditor;
pub use builder::RecordBuilder;

// Re-export types for convenience
pub use auditline_audit_context::{CallerContext, RequestContext};
pub use auditline_audit_types::{AuditAction, AuditRecord, Metadata};
