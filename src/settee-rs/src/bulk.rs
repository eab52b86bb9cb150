//! Bulk write coordination.
//!
//! A batch goes out as one POST to `_bulk_docs`. Whatever the server decides
//! per document comes back unaltered: an accepted batch yields a
//! [`BulkDocumentResponse`] even when some items failed, and only a non-2xx
//! status for the whole batch is an error. `all_or_nothing` only changes the
//! query string; atomicity is the server's call.

use settee_core::bulk::{BulkDocumentRequest, BulkDocumentResponse, BulkOutcome};
use settee_core::Document;

use crate::database::Database;
use crate::request::CouchRequest;
use crate::response::decode_bulk;
use crate::Result;

/// A batch being assembled against one database
pub struct BulkWrite<'a> {
    db: &'a Database,
    request: BulkDocumentRequest,
}

impl<'a> BulkWrite<'a> {
    pub fn save(mut self, doc: Document) -> Self {
        self.request.push(doc);
        self
    }

    pub fn delete(mut self, id: impl Into<String>, rev: impl Into<String>) -> Self {
        self.request.push(Document::deletion(id, rev));
        self
    }

    pub fn all_or_nothing(mut self, enabled: bool) -> Self {
        self.request = self.request.all_or_nothing(enabled);
        self
    }

    pub fn len(&self) -> usize {
        self.request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty()
    }

    pub fn submit(self) -> Result<BulkDocumentResponse> {
        self.db.save_documents(&self.request)
    }
}

impl Database {
    /// Start a batch
    pub fn bulk(&self) -> BulkWrite<'_> {
        BulkWrite {
            db: self,
            request: BulkDocumentRequest::new(),
        }
    }

    /// Submit a batch through `_bulk_docs`
    #[tracing::instrument(skip(self, request), fields(db = %self.name(), docs = request.len()))]
    pub fn save_documents(&self, request: &BulkDocumentRequest) -> Result<BulkDocumentResponse> {
        let body = request.to_json()?;
        let uri = format!("{}/_bulk_docs{}", self.uri(), request.query());
        tracing::debug!(all_or_nothing = request.is_all_or_nothing(), "Submitting bulk write");

        let response = decode_bulk(self.conn().send(CouchRequest::post(uri).json(body))?)?;

        match response.outcome() {
            BulkOutcome::AllSucceeded => {
                tracing::debug!(saved = response.len(), "Bulk write succeeded");
            }
            BulkOutcome::PartiallyFailed => {
                tracing::warn!(
                    saved = response.saved().count(),
                    failed = response.failed().count(),
                    "Bulk write partially failed"
                );
            }
        }
        Ok(response)
    }
}
