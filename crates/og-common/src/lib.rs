//! og Common - Shared types and utilities
//!
//! This crate provides the types shared across the og workload generator:
//! operations, request context, credentials, body descriptors, configuration
//! and the common error type.

pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod types;

// Re-exports
pub use config::WorkloadConfig;
pub use context::{Context, ContextKey};
pub use error::{Error, Result};
pub use message::{HttpRequest, HttpResponse};
pub use types::{Body, Credential, DataType, ObjectName, Operation};
