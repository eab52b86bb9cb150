use reqwest::Method;
use settee_core::query::{encode_component, EncodedQuery, ViewOptions};
use std::fmt;
use std::io::Read;

/// Payload of an outgoing request
pub enum RequestBody {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    /// Streamed to the server without buffering the whole payload
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Outgoing request description, ready for a [`Transport`](crate::Transport)
#[derive(Debug)]
pub struct CouchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl CouchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url).header("Accept", "application/json")
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url).header("Accept", "application/json")
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url).header("Accept", "application/json")
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url).header("Accept", "application/json")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Replace any existing header with the same (case-insensitive) name
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(self, text: impl Into<String>) -> Self {
        let mut request = self.header("Content-Type", "application/json");
        request.body = RequestBody::Text(text.into());
        request
    }

    pub fn form(self, text: impl Into<String>) -> Self {
        let mut request = self.header("Content-Type", "application/x-www-form-urlencoded");
        request.body = RequestBody::Text(text.into());
        request
    }

    pub fn bytes(self, bytes: Vec<u8>, content_type: &str) -> Self {
        let mut request = self.header("Content-Type", content_type);
        request.body = RequestBody::Bytes(bytes);
        request
    }

    pub fn stream(self, reader: Box<dyn Read + Send>, content_type: &str) -> Self {
        let mut request = self.header("Content-Type", content_type);
        request.body = RequestBody::Stream(reader);
        request
    }

    /// Conditional fetch against a previously seen ETag
    pub fn if_none_match(self, etag: Option<&str>) -> Self {
        match etag {
            Some(etag) => self.header("If-None-Match", etag),
            None => self,
        }
    }

    pub fn body_text(&self) -> Option<&str> {
        match &self.body {
            RequestBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// GET with every option in the query string, or POST with a `keys` body
/// when the keys would push the url past `max_url_length`
pub fn view_request(uri: &str, options: &ViewOptions, max_url_length: usize) -> CouchRequest {
    let request = match options.encode(uri, max_url_length) {
        EncodedQuery::Get { query } => CouchRequest::get(format!("{uri}{query}")),
        EncodedQuery::Post { query, body } => {
            CouchRequest::post(format!("{uri}{query}")).json(body.to_string())
        }
    };
    request.if_none_match(options.etag_value())
}

/// Path for a document id; `_design/` and `_local/` keep their slash
pub fn doc_path(id: &str) -> String {
    for prefix in ["_design/", "_local/"] {
        if let Some(rest) = id.strip_prefix(prefix) {
            return format!("{prefix}{}", encode_component(rest));
        }
    }
    encode_component(id)
}

/// Path for an attachment name; `/` separates nested names
pub fn attachment_path(name: &str) -> String {
    name.split('/')
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// `_design/{name}`, accepting names with or without the prefix
pub fn design_path(name: &str) -> String {
    doc_path(&format!("_design/{}", name.trim_start_matches("_design/")))
}
