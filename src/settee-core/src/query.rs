//! View query options and their canonical wire encoding.
//!
//! Every recognized option is a [`ViewParam`] with a declared [`ParamKind`].
//! [`ViewOptions`] keeps set options in a map ordered by parameter
//! declaration, so the encoded query string is the same for equal option
//! sets no matter in which order the setters were called.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Everything outside the RFC 3986 unreserved set is escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single query value or path segment.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

/// Recognized view query parameters, in wire precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViewParam {
    Key,
    Keys,
    StartKey,
    EndKey,
    StartKeyDocId,
    EndKeyDocId,
    Limit,
    Skip,
    Group,
    GroupLevel,
    Reduce,
    Descending,
    IncludeDocs,
    InclusiveEnd,
    UpdateSeq,
    Stale,
}

/// The value kind a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Any JSON value, JSON-encoded on the wire.
    Json,
    /// A sequence of JSON values, sent as a JSON array.
    JsonArray,
    /// Plain text, sent without JSON quoting.
    String,
    Boolean,
    Integer,
    /// Passed through verbatim.
    Token,
}

impl ViewParam {
    pub const ALL: [ViewParam; 16] = [
        ViewParam::Key,
        ViewParam::Keys,
        ViewParam::StartKey,
        ViewParam::EndKey,
        ViewParam::StartKeyDocId,
        ViewParam::EndKeyDocId,
        ViewParam::Limit,
        ViewParam::Skip,
        ViewParam::Group,
        ViewParam::GroupLevel,
        ViewParam::Reduce,
        ViewParam::Descending,
        ViewParam::IncludeDocs,
        ViewParam::InclusiveEnd,
        ViewParam::UpdateSeq,
        ViewParam::Stale,
    ];

    /// Name used on the wire.
    pub fn name(self) -> &'static str {
        match self {
            ViewParam::Key => "key",
            ViewParam::Keys => "keys",
            ViewParam::StartKey => "startkey",
            ViewParam::EndKey => "endkey",
            ViewParam::StartKeyDocId => "startkey_docid",
            ViewParam::EndKeyDocId => "endkey_docid",
            ViewParam::Limit => "limit",
            ViewParam::Skip => "skip",
            ViewParam::Group => "group",
            ViewParam::GroupLevel => "group_level",
            ViewParam::Reduce => "reduce",
            ViewParam::Descending => "descending",
            ViewParam::IncludeDocs => "include_docs",
            ViewParam::InclusiveEnd => "inclusive_end",
            ViewParam::UpdateSeq => "update_seq",
            ViewParam::Stale => "stale",
        }
    }

    pub fn kind(self) -> ParamKind {
        match self {
            ViewParam::Key | ViewParam::StartKey | ViewParam::EndKey => ParamKind::Json,
            ViewParam::Keys => ParamKind::JsonArray,
            ViewParam::StartKeyDocId | ViewParam::EndKeyDocId => ParamKind::String,
            ViewParam::Limit | ViewParam::Skip | ViewParam::GroupLevel => ParamKind::Integer,
            ViewParam::Group
            | ViewParam::Reduce
            | ViewParam::Descending
            | ViewParam::IncludeDocs
            | ViewParam::InclusiveEnd => ParamKind::Boolean,
            ViewParam::UpdateSeq | ViewParam::Stale => ParamKind::Token,
        }
    }
}

impl fmt::Display for ViewParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Json(Value),
    Keys(Vec<Value>),
    Text(String),
    Bool(bool),
    Int(u64),
    Token(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Json(_) => ParamKind::Json,
            ParamValue::Keys(_) => ParamKind::JsonArray,
            ParamValue::Text(_) => ParamKind::String,
            ParamValue::Bool(_) => ParamKind::Boolean,
            ParamValue::Int(_) => ParamKind::Integer,
            ParamValue::Token(_) => ParamKind::Token,
        }
    }

    /// Unescaped wire text of the value.
    fn render(&self) -> String {
        match self {
            ParamValue::Json(value) => value.to_string(),
            ParamValue::Keys(keys) => Value::Array(keys.clone()).to_string(),
            ParamValue::Text(text) | ParamValue::Token(text) => text.clone(),
            ParamValue::Bool(flag) => flag.to_string(),
            ParamValue::Int(n) => n.to_string(),
        }
    }
}

/// `stale` tokens understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stale {
    Ok,
    UpdateAfter,
}

impl Stale {
    pub fn as_str(self) -> &'static str {
        match self {
            Stale::Ok => "ok",
            Stale::UpdateAfter => "update_after",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OptionError {
    #[error("option `{param}` expects a {expected:?} value, got {actual:?}")]
    KindMismatch {
        param: ViewParam,
        expected: ParamKind,
        actual: ParamKind,
    },
}

/// Query options for views, `_all_docs` and list functions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewOptions {
    params: BTreeMap<ViewParam, ParamValue>,
    etag: Option<String>,
}

/// Wire shape chosen for a query.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedQuery {
    /// Every option travels in the query string.
    Get { query: String },
    /// `keys` moved into a `{"keys": [...]}` body, the rest stays in `query`.
    Post { query: String, body: Value },
}

impl EncodedQuery {
    /// The query string, including the leading `?`, or empty.
    pub fn query(&self) -> &str {
        match self {
            EncodedQuery::Get { query } | EncodedQuery::Post { query, .. } => query,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            EncodedQuery::Get { .. } => None,
            EncodedQuery::Post { body, .. } => Some(body),
        }
    }

    pub fn is_post(&self) -> bool {
        matches!(self, EncodedQuery::Post { .. })
    }
}

impl ViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, checking the value against its declared kind.
    pub fn set(&mut self, param: ViewParam, value: ParamValue) -> Result<(), OptionError> {
        if value.kind() != param.kind() {
            return Err(OptionError::KindMismatch {
                param,
                expected: param.kind(),
                actual: value.kind(),
            });
        }
        self.params.insert(param, value);
        Ok(())
    }

    pub fn get(&self, param: ViewParam) -> Option<&ParamValue> {
        self.params.get(&param)
    }

    pub fn remove(&mut self, param: ViewParam) -> Option<ParamValue> {
        self.params.remove(&param)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    // Setters below always pass a value of the parameter's kind.
    fn with(mut self, param: ViewParam, value: ParamValue) -> Self {
        debug_assert_eq!(param.kind(), value.kind());
        self.params.insert(param, value);
        self
    }

    pub fn key(self, key: impl Into<Value>) -> Self {
        self.with(ViewParam::Key, ParamValue::Json(key.into()))
    }

    pub fn keys<I, K>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Value>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.with(ViewParam::Keys, ParamValue::Keys(keys))
    }

    pub fn startkey(self, key: impl Into<Value>) -> Self {
        self.with(ViewParam::StartKey, ParamValue::Json(key.into()))
    }

    pub fn endkey(self, key: impl Into<Value>) -> Self {
        self.with(ViewParam::EndKey, ParamValue::Json(key.into()))
    }

    pub fn startkey_docid(self, id: impl Into<String>) -> Self {
        self.with(ViewParam::StartKeyDocId, ParamValue::Text(id.into()))
    }

    pub fn endkey_docid(self, id: impl Into<String>) -> Self {
        self.with(ViewParam::EndKeyDocId, ParamValue::Text(id.into()))
    }

    pub fn limit(self, limit: u64) -> Self {
        self.with(ViewParam::Limit, ParamValue::Int(limit))
    }

    pub fn skip(self, skip: u64) -> Self {
        self.with(ViewParam::Skip, ParamValue::Int(skip))
    }

    pub fn group(self, group: bool) -> Self {
        self.with(ViewParam::Group, ParamValue::Bool(group))
    }

    /// Passed through as-is, even without `group=true`.
    pub fn group_level(self, level: u64) -> Self {
        self.with(ViewParam::GroupLevel, ParamValue::Int(level))
    }

    pub fn reduce(self, reduce: bool) -> Self {
        self.with(ViewParam::Reduce, ParamValue::Bool(reduce))
    }

    pub fn descending(self, descending: bool) -> Self {
        self.with(ViewParam::Descending, ParamValue::Bool(descending))
    }

    pub fn include_docs(self, include: bool) -> Self {
        self.with(ViewParam::IncludeDocs, ParamValue::Bool(include))
    }

    pub fn inclusive_end(self, inclusive: bool) -> Self {
        self.with(ViewParam::InclusiveEnd, ParamValue::Bool(inclusive))
    }

    pub fn update_seq(self, update_seq: bool) -> Self {
        self.with(ViewParam::UpdateSeq, ParamValue::Token(update_seq.to_string()))
    }

    pub fn stale(self, stale: Stale) -> Self {
        self.with(ViewParam::Stale, ParamValue::Token(stale.as_str().to_string()))
    }

    /// ETag from a previous response; sent as `If-None-Match`, never in the query.
    pub fn etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn etag_value(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn include_docs_requested(&self) -> bool {
        matches!(self.get(ViewParam::IncludeDocs), Some(ParamValue::Bool(true)))
    }

    fn encode_pairs(&self, skip_keys: bool) -> String {
        let pairs: Vec<String> = self
            .params
            .iter()
            .filter(|(param, _)| !(skip_keys && **param == ViewParam::Keys))
            .map(|(param, value)| format!("{}={}", param.name(), encode_component(&value.render())))
            .collect();

        if pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", pairs.join("&"))
        }
    }

    /// Full query string with every set option, `keys` included.
    pub fn to_query_string(&self) -> String {
        self.encode_pairs(false)
    }

    /// Pick the request shape for `base_uri`.
    ///
    /// When `keys` is set and `base_uri` plus the full query string would be
    /// longer than `max_url_length`, the keys move into a POST body and the
    /// remaining options stay in the query string.
    pub fn encode(&self, base_uri: &str, max_url_length: usize) -> EncodedQuery {
        let full = self.to_query_string();
        match self.params.get(&ViewParam::Keys) {
            Some(ParamValue::Keys(keys)) if base_uri.len() + full.len() > max_url_length => {
                tracing::debug!(
                    keys = keys.len(),
                    url_length = base_uri.len() + full.len(),
                    max_url_length,
                    "keys exceed url limit, switching to POST body"
                );
                EncodedQuery::Post {
                    query: self.encode_pairs(true),
                    body: serde_json::json!({ "keys": keys }),
                }
            }
            _ => EncodedQuery::Get { query: full },
        }
    }
}
