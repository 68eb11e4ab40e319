//! Audit record types for Auditline.

mod action;
mod id;
mod record;
pub mod timestamp;

pub use action::AuditAction;
pub use id::{AuditRecordId, IdParseError};
pub use record::{AuditRecord, AuditRecordBuilder, Metadata};
