use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document represents a stored document: reserved `_id`/`_rev`/`_deleted`
/// fields plus an arbitrary JSON body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Empty for a new document whose id the server assigns
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Opaque revision token, absent until the document has been persisted
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

const RESERVED_FIELDS: [&str; 3] = ["_id", "_rev", "_deleted"];

impl Document {
    /// New unsaved document. Reserved fields in `body` are dropped.
    pub fn new(id: impl Into<String>, body: Map<String, Value>) -> Self {
        let mut body = body;
        for field in RESERVED_FIELDS {
            body.remove(field);
        }
        Self {
            id: id.into(),
            rev: None,
            deleted: false,
            body,
        }
    }

    /// New document without an id; the server assigns one on write
    pub fn unidentified(body: Map<String, Value>) -> Self {
        Self::new(String::new(), body)
    }

    /// New document with a client-generated UUID id
    pub fn with_generated_id(body: Map<String, Value>) -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string(), body)
    }

    /// Deletion marker for a bulk write
    pub fn deletion(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: Some(rev.into()),
            deleted: true,
            body: Map::new(),
        }
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    /// Build from any serializable value that produces a JSON object
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(value)?)
    }

    /// Deserialize the whole document, reserved fields included, into `T`
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Names of the attachment stubs carried in `_attachments`
    pub fn attachment_names(&self) -> Vec<&str> {
        self.body
            .get("_attachments")
            .and_then(Value::as_object)
            .map(|stubs| stubs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Successful single-document write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    #[serde(default)]
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

/// One row of a view, `_all_docs` or `keys` query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    /// Present when `include_docs=true`; `None` for deleted or missing docs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
    /// Set on `keys` lookups that matched nothing (e.g. `not_found`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rows returned by a view query, in server order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewResult {
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub update_seq: Option<Value>,
    #[serde(default)]
    pub rows: Vec<ViewRow>,
    #[serde(skip)]
    pub etag: Option<String>,
    /// The server answered a conditional fetch with 304
    #[serde(skip)]
    pub not_modified: bool,
}

impl ViewResult {
    pub fn not_modified(etag: Option<String>) -> Self {
        Self {
            etag,
            not_modified: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> Vec<&Value> {
        self.rows.iter().map(|row| &row.key).collect()
    }

    pub fn rows_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.rows
            .iter()
            .map(|row| serde_json::from_value(row.value.clone()))
            .collect()
    }

    /// Included documents, skipping rows without one
    pub fn docs_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.rows
            .iter()
            .filter_map(|row| row.doc.as_ref())
            .filter(|doc| !doc.is_null())
            .map(|doc| serde_json::from_value(doc.clone()))
            .collect()
    }
}

/// Raw output of a list function
#[derive(Debug, Clone, PartialEq)]
pub struct ListResult {
    pub status: u16,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub body: String,
}

/// User names and roles for one security class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Cloudant's `nobody` block (roles granted to unauthenticated users)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudantGroup {
    #[serde(default)]
    pub nobody: Vec<String>,
}

/// Database `_security` object
///
/// Example: `{"admins":{"names":[],"roles":[]},"readers":{"names":["dave"],"roles":[]}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDocument {
    #[serde(default)]
    pub admins: SecurityGroup,
    /// `members` on current servers; older servers call it `readers`
    #[serde(default, alias = "members")]
    pub readers: SecurityGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudant: Option<CloudantGroup>,
}

impl SecurityDocument {
    pub fn add_cloudant(&mut self) {
        self.cloudant = Some(CloudantGroup {
            nobody: vec![
                "_reader".to_string(),
                "_writer".to_string(),
                "_admin".to_string(),
            ],
        });
    }
}
