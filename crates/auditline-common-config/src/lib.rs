//! Configuration types for Auditline.
//!
//! Settings live under the `audit:` key of `audit.yaml`, with `AUDIT_*`
//! environment variables taking precedence over file values.

pub mod types;
pub mod loader;
pub mod env;

#[cfg(test)]
mod integration_test;

pub use types::*;
pub use loader::*;
pub use env::*;
