//! HTTP client utilities for Auditline sinks.

pub mod client;
pub mod request;

pub use client::{HttpClient, HttpConfig, HttpError};
pub use request::{endpoint_url, headers, HttpAuth};
