//! Bulk write request and response shapes.
//!
//! A response carries one item per submitted document. Items are correlated
//! with the request by `id`, never by position.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Document;

/// Ordered batch of document mutations plus the consistency flag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkDocumentRequest {
    docs: Vec<Document>,
    all_or_nothing: bool,
}

#[derive(Serialize)]
struct BulkBody<'a> {
    docs: &'a [Document],
}

impl BulkDocumentRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update, depending on whether `doc.rev` is set
    pub fn save(mut self, doc: Document) -> Self {
        self.docs.push(doc);
        self
    }

    pub fn delete(mut self, id: impl Into<String>, rev: impl Into<String>) -> Self {
        self.docs.push(Document::deletion(id, rev));
        self
    }

    pub fn all_or_nothing(mut self, enabled: bool) -> Self {
        self.all_or_nothing = enabled;
        self
    }

    pub fn push(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn is_all_or_nothing(&self) -> bool {
        self.all_or_nothing
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// `?all_or_nothing=true` when requested, otherwise empty
    pub fn query(&self) -> &'static str {
        if self.all_or_nothing {
            "?all_or_nothing=true"
        } else {
            ""
        }
    }

    /// `{"docs": [...]}` request body
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&BulkBody { docs: &self.docs })
    }
}

/// Per-document outcome of a bulk write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkItem {
    Saved {
        id: String,
        rev: String,
    },
    /// Per-document rejection, typically `conflict` or `forbidden`
    Failed {
        id: String,
        error: String,
        reason: String,
    },
}

impl BulkItem {
    pub fn id(&self) -> &str {
        match self {
            BulkItem::Saved { id, .. } | BulkItem::Failed { id, .. } => id,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, BulkItem::Saved { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BulkItem::Failed { error, .. } if error == "conflict")
    }
}

/// Wire form of one response item, before classification
#[derive(Debug, Clone, Deserialize)]
pub struct RawBulkItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BulkItemError {
    #[error("bulk response item has no id")]
    MissingId,
    #[error("bulk response item for `{0}` has neither rev nor error")]
    Unclassified(String),
}

impl TryFrom<RawBulkItem> for BulkItem {
    type Error = BulkItemError;

    fn try_from(raw: RawBulkItem) -> Result<Self, Self::Error> {
        let id = raw.id.ok_or(BulkItemError::MissingId)?;
        match (raw.error, raw.rev) {
            (Some(error), _) => Ok(BulkItem::Failed {
                id,
                error,
                reason: raw.reason.unwrap_or_default(),
            }),
            (None, Some(rev)) => Ok(BulkItem::Saved { id, rev }),
            (None, None) => Err(BulkItemError::Unclassified(id)),
        }
    }
}

/// Overall shape of a bulk write reply that the server accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    AllSucceeded,
    /// At least one item carries an error record
    PartiallyFailed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkDocumentResponse {
    items: Vec<BulkItem>,
}

impl BulkDocumentResponse {
    pub fn new(items: Vec<BulkItem>) -> Self {
        Self { items }
    }

    /// Classify wire items; any unclassifiable item fails the whole parse
    pub fn from_raw(raw: Vec<RawBulkItem>) -> Result<Self, BulkItemError> {
        let items = raw
            .into_iter()
            .map(BulkItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { items })
    }

    pub fn outcome(&self) -> BulkOutcome {
        if self.items.iter().all(BulkItem::is_saved) {
            BulkOutcome::AllSucceeded
        } else {
            BulkOutcome::PartiallyFailed
        }
    }

    pub fn items(&self) -> &[BulkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item for `id`; the last one wins if the batch repeated an id
    pub fn get(&self, id: &str) -> Option<&BulkItem> {
        self.items.iter().rev().find(|item| item.id() == id)
    }

    pub fn by_id(&self) -> HashMap<&str, &BulkItem> {
        self.items.iter().map(|item| (item.id(), item)).collect()
    }

    pub fn saved(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| item.is_saved())
    }

    pub fn failed(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| !item.is_saved())
    }
}

impl IntoIterator for BulkDocumentResponse {
    type Item = BulkItem;
    type IntoIter = std::vec::IntoIter<BulkItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
