//! Settee Core Library
//!
//! Transport-free building blocks for the Settee CouchDB client:
//! - Document, view result and security document models
//! - View query options and their canonical encoding
//! - Bulk write request/response shapes
//! - Client configuration

pub mod bulk;
pub mod config;
pub mod models;
pub mod query;

// Re-export commonly used types
pub use bulk::{BulkDocumentRequest, BulkDocumentResponse, BulkItem, BulkOutcome};
pub use config::{AuthConfig, AuthMode, Config};
pub use models::*;
pub use query::{EncodedQuery, ParamKind, ParamValue, Stale, ViewOptions, ViewParam};
