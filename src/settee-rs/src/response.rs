//! Response decoding: status + body text into typed results or errors.
//!
//! Data-shaped outcomes (a missing document or view, per-document bulk
//! failures) come back as values. Anything that means the request itself was
//! not honored becomes a [`ClientError`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use settee_core::bulk::{BulkDocumentResponse, RawBulkItem};
use settee_core::{ViewResult, WriteResult};
use std::cell::OnceCell;
use std::io::Read;

use crate::transport::{find_header, RawResponse};
use crate::{ClientError, Result};

/// Statuses that count as success for a document write
pub const WRITE_OK: &[u16] = &[201, 202];
/// DELETE answers 200 when the change is already durable
pub const DELETE_OK: &[u16] = &[200, 202];

/// Buffered response with a lazily parsed JSON view
#[derive(Debug)]
pub struct CouchResponse {
    status: u16,
    headers: Vec<(String, String)>,
    text: String,
    json: OnceCell<Value>,
}

impl CouchResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, text: String) -> Self {
        Self {
            status,
            headers,
            text,
            json: OnceCell::new(),
        }
    }

    /// Read the whole body of a raw response
    pub fn read(raw: RawResponse) -> Result<Self> {
        let RawResponse {
            status,
            headers,
            mut body,
        } = raw;
        let mut text = String::new();
        body.read_to_string(&mut text)?;
        Ok(Self::new(status, headers, text))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header("ETag")
    }

    /// Parsed once, on first use
    pub fn json(&self) -> Result<&Value> {
        if let Some(value) = self.json.get() {
            return Ok(value);
        }
        let value: Value = serde_json::from_str(&self.text)?;
        Ok(self.json.get_or_init(|| value))
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.text)?)
    }

    /// Fatal error carrying the status and the server's description
    pub fn into_error(self) -> ClientError {
        let (error, reason) = match self.json() {
            Ok(body) => (
                body.get("error").and_then(Value::as_str).map(str::to_string),
                body.get("reason").and_then(Value::as_str).map(str::to_string),
            ),
            Err(_) => (None, None),
        };

        let reason = reason
            .or_else(|| (!self.text.trim().is_empty()).then(|| self.text.trim().to_string()))
            .or_else(|| {
                reqwest::StatusCode::from_u16(self.status)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        ClientError::Server {
            status: self.status,
            error,
            reason,
        }
    }
}

/// Pass the response through when its status is one of `accepted`
pub fn expect_status(response: CouchResponse, accepted: &[u16]) -> Result<CouchResponse> {
    if accepted.contains(&response.status()) {
        Ok(response)
    } else {
        Err(response.into_error())
    }
}

/// Any 2xx
pub fn expect_success(response: CouchResponse) -> Result<CouchResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(response.into_error())
    }
}

pub fn decode_write(response: CouchResponse, accepted: &[u16]) -> Result<WriteResult> {
    expect_status(response, accepted)?.deserialize()
}

/// 404 is an absent value, not an error
pub fn decode_document<T: DeserializeOwned>(response: CouchResponse) -> Result<Option<T>> {
    if response.status() == 404 {
        return Ok(None);
    }
    expect_success(response)?.deserialize().map(Some)
}

/// Rows in server order; 404 is absent, 304 is "not modified"
pub fn decode_view(response: CouchResponse) -> Result<Option<ViewResult>> {
    match response.status() {
        404 => Ok(None),
        304 => Ok(Some(ViewResult::not_modified(
            response.etag().map(str::to_string),
        ))),
        _ => {
            let response = expect_success(response)?;
            let mut result: ViewResult = response.deserialize()?;
            result.etag = response.etag().map(str::to_string);
            Ok(Some(result))
        }
    }
}

/// Per-document failures are data; a non-2xx status rejects the batch
pub fn decode_bulk(response: CouchResponse) -> Result<BulkDocumentResponse> {
    let response = expect_status(response, WRITE_OK)?;
    let raw: Vec<RawBulkItem> = response.deserialize()?;
    BulkDocumentResponse::from_raw(raw).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}
