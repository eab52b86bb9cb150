use crate::request::{CouchRequest, RequestBody};
use crate::Result;
use std::fmt;
use std::io::{Cursor, Read};
use std::time::Duration;

/// Synchronous request/response exchange with the server
pub trait Transport: Send + Sync {
    fn send(&self, request: CouchRequest) -> Result<RawResponse>;
}

/// Status, headers and an unread body stream
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl RawResponse {
    /// Response with a fully buffered body
    pub fn buffered(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body: Box::new(Cursor::new(body)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// reqwest blocking transport
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, insecure_skip_verify: bool) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: CouchRequest) -> Result<RawResponse> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text),
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream(reader) => builder.body(reqwest::blocking::Body::new(reader)),
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        Ok(RawResponse {
            status,
            headers,
            body: Box::new(response),
        })
    }
}
