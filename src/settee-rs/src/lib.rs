//! Settee Client Library
//!
//! Synchronous HTTP client for CouchDB-style document databases.

mod attachment;
mod auth;
mod bulk;
mod client;
mod database;
mod design;
mod request;
mod response;
mod transport;

#[cfg(test)]
mod testing;

pub use attachment::{AttachmentBody, AttachmentStream};
pub use auth::{auth_from_config, Authenticator, BasicAuth, CookieAuth, NoAuth};
pub use bulk::BulkWrite;
pub use client::{Client, ClientBuilder};
pub use database::Database;
pub use design::DesignDoc;
pub use request::{CouchRequest, RequestBody};
pub use response::CouchResponse;
pub use transport::{HttpTransport, RawResponse, Transport};

pub use settee_core::bulk::{BulkDocumentRequest, BulkDocumentResponse, BulkItem, BulkOutcome};
pub use settee_core::query::{EncodedQuery, Stale, ViewOptions, ViewParam};
pub use settee_core::{
    Config, Document, ListResult, SecurityDocument, SecurityGroup, ViewResult, ViewRow,
    WriteResult,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {status} - {reason}")]
    Server {
        status: u16,
        error: Option<String>,
        reason: String,
    },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl ClientError {
    /// HTTP status for server-reported failures
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Revision conflict on a single-document write
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
