//! In-memory transport for tests: records requests, replays canned responses.

use reqwest::Method;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex};

use crate::client::{Client, ClientBuilder};
use crate::request::{CouchRequest, RequestBody};
use crate::transport::{RawResponse, Transport};
use crate::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        crate::transport::find_header(&self.headers, name)
    }

    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn body_json(&self) -> Value {
        serde_json::from_slice(self.body.as_deref().unwrap_or_default()).unwrap()
    }
}

type Canned = (u16, Vec<(String, String)>, Vec<u8>);

#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<Canned>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.push_with_headers(status, Vec::new(), body);
    }

    pub fn push_with_headers(&self, status: u16, headers: Vec<(String, String)>, body: Value) {
        self.push_raw(status, headers, body.to_string().into_bytes());
    }

    pub fn push_raw(&self, status: u16, headers: Vec<(String, String)>, body: Vec<u8>) {
        self.responses.lock().unwrap().push_back((status, headers, body));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("no request was sent")
    }

    /// Builder on `http://couch:5984` using this transport
    pub fn client_builder(&self) -> ClientBuilder {
        Client::builder("http://couch:5984").transport(self.clone())
    }

    pub fn client(&self) -> Client {
        self.client_builder().build().unwrap()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: CouchRequest) -> Result<RawResponse> {
        let body = match request.body {
            RequestBody::Empty => None,
            RequestBody::Text(text) => Some(text.into_bytes()),
            RequestBody::Bytes(bytes) => Some(bytes),
            RequestBody::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Some(bytes)
            }
        };

        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
        });

        let (status, headers, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ClientError::Transport("no canned response".into()))?;

        Ok(RawResponse::buffered(status, headers, body))
    }
}
