use serde::de::DeserializeOwned;
use serde_json::Value;
use settee_core::query::{encode_component, ViewOptions};
use settee_core::{Document, SecurityDocument, ViewResult, WriteResult};
use std::fmt;
use std::sync::Arc;

use crate::attachment::{AttachmentBody, AttachmentStream};
use crate::client::Connection;
use crate::design::DesignDoc;
use crate::request::{attachment_path, doc_path, view_request, CouchRequest};
use crate::response::{
    decode_document, decode_view, decode_write, expect_status, CouchResponse, DELETE_OK, WRITE_OK,
};
use crate::{ClientError, Result};

/// Handle for one database. Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
    name: String,
    uri: String,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

/// Parse caller-supplied JSON before anything goes on the wire
fn parse_document(json: &str) -> Result<Value> {
    let body: Value = serde_json::from_str(json)?;
    if !body.is_object() {
        return Err(ClientError::InvalidArgument(
            "document must be a JSON object".into(),
        ));
    }
    Ok(body)
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

impl Database {
    pub(crate) fn new(conn: Arc<Connection>, name: String) -> Self {
        let uri = format!("{}/{}", conn.base_url, encode_component(&name));
        Self { conn, name, uri }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn doc_uri(&self, id: &str) -> String {
        format!("{}/{}", self.uri, doc_path(id))
    }

    pub fn exists(&self) -> Result<bool> {
        let response = self
            .conn
            .send(CouchRequest::head(format!("{}/_all_docs", self.uri)))?;
        Ok(response.status() == 200)
    }

    /// PUT a document from raw JSON. A null `_rev` is dropped; malformed
    /// JSON fails before any request is made.
    #[tracing::instrument(skip(self, json), fields(db = %self.name))]
    pub fn create_document(&self, id: &str, json: &str) -> Result<WriteResult> {
        require(id, "document id")?;
        let mut body = parse_document(json)?;
        if let Some(fields) = body.as_object_mut() {
            if fields.get("_rev").is_some_and(Value::is_null) {
                fields.remove("_rev");
            }
        }

        let request = CouchRequest::put(self.doc_uri(id)).json(body.to_string());
        decode_write(self.conn.send(request)?, WRITE_OK)
    }

    /// POST a document and let the server assign its id
    #[tracing::instrument(skip(self, json), fields(db = %self.name))]
    pub fn create_document_auto(&self, json: &str) -> Result<WriteResult> {
        let body = parse_document(json)?;
        let request = CouchRequest::post(format!("{}/", self.uri)).json(body.to_string());
        decode_write(self.conn.send(request)?, WRITE_OK)
    }

    /// Create when `doc.rev` is unset, otherwise update that revision
    #[tracing::instrument(skip(self, doc), fields(db = %self.name, id = %doc.id))]
    pub fn save_document(&self, doc: &Document) -> Result<WriteResult> {
        require(&doc.id, "document id")?;
        let uri = match &doc.rev {
            Some(rev) => format!("{}?rev={}", self.doc_uri(&doc.id), encode_component(rev)),
            None => self.doc_uri(&doc.id),
        };

        let request = CouchRequest::put(uri).json(serde_json::to_string(doc)?);
        decode_write(self.conn.send(request)?, WRITE_OK)
    }

    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub fn delete_document(&self, id: &str, rev: &str) -> Result<WriteResult> {
        require(id, "document id")?;
        require(rev, "revision")?;

        let uri = format!("{}?rev={}", self.doc_uri(id), encode_component(rev));
        decode_write(self.conn.send(CouchRequest::delete(uri))?, DELETE_OK)
    }

    /// `None` when the document does not exist
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.get_document_as(id)
    }

    /// Same as [`get_document`](Self::get_document) with inline attachment data
    pub fn get_document_with_attachments(&self, id: &str) -> Result<Option<Document>> {
        let uri = format!("{}?attachments=true", self.doc_uri(id));
        decode_document(self.conn.send(CouchRequest::get(uri))?)
    }

    pub fn get_document_as<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        require(id, "document id")?;
        decode_document(self.conn.send(CouchRequest::get(self.doc_uri(id)))?)
    }

    /// Fetch several documents through `_all_docs` in one request
    pub fn get_documents<I, K>(&self, keys: I) -> Result<Option<ViewResult>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Value>,
    {
        let options = ViewOptions::new().include_docs(true).keys(keys);
        self.all_documents(&options)
    }

    pub fn all_documents(&self, options: &ViewOptions) -> Result<Option<ViewResult>> {
        self.query_view(&format!("{}/_all_docs", self.uri), options)
    }

    pub fn design_documents(&self) -> Result<Option<ViewResult>> {
        let options = ViewOptions::new().startkey("_design").endkey("_design0");
        self.all_documents(&options)
    }

    pub(crate) fn query_view(&self, uri: &str, options: &ViewOptions) -> Result<Option<ViewResult>> {
        let request = view_request(uri, options, self.conn.max_url_length);
        tracing::debug!(method = %request.method, url = %request.url, "View query");
        decode_view(self.conn.send(request)?)
    }

    pub fn design(&self, name: impl Into<String>) -> DesignDoc<'_> {
        DesignDoc::new(self, name.into())
    }

    /// Design document named in the client configuration
    pub fn default_design(&self) -> Result<DesignDoc<'_>> {
        match &self.conn.default_design_doc {
            Some(name) => Ok(self.design(name.clone())),
            None => Err(ClientError::InvalidArgument(
                "no default design document configured; name one explicitly".into(),
            )),
        }
    }

    pub fn view(
        &self,
        design_doc: &str,
        view: &str,
        options: &ViewOptions,
    ) -> Result<Option<ViewResult>> {
        self.design(design_doc).view(view, options)
    }

    /// Upload an attachment against an explicit revision
    #[tracing::instrument(skip(self, body), fields(db = %self.name))]
    pub fn put_attachment(
        &self,
        id: &str,
        rev: &str,
        name: &str,
        content_type: &str,
        body: impl Into<AttachmentBody>,
    ) -> Result<WriteResult> {
        require(id, "document id")?;
        require(name, "attachment name")?;

        let uri = format!(
            "{}/{}?rev={}",
            self.doc_uri(id),
            attachment_path(name),
            encode_component(rev)
        );
        let request = match body.into() {
            AttachmentBody::Bytes(bytes) => CouchRequest::put(uri).bytes(bytes, content_type),
            AttachmentBody::Stream(reader) => CouchRequest::put(uri).stream(reader, content_type),
        };
        decode_write(self.conn.send(request)?, WRITE_OK)
    }

    /// Upload against whatever revision is current. The revision is read
    /// first, so a concurrent writer can slip in between; use
    /// [`put_attachment`](Self::put_attachment) to get conflict detection.
    pub fn put_attachment_latest(
        &self,
        id: &str,
        name: &str,
        content_type: &str,
        body: impl Into<AttachmentBody>,
    ) -> Result<WriteResult> {
        let rev = self.current_rev(id)?;
        tracing::warn!(db = %self.name, id, rev = %rev, "Attachment upload without explicit revision");
        self.put_attachment(id, &rev, name, content_type, body)
    }

    /// Stream an attachment; `None` if the document or attachment is missing
    pub fn get_attachment(&self, id: &str, name: &str) -> Result<Option<AttachmentStream>> {
        require(id, "document id")?;
        let uri = format!("{}/{}", self.doc_uri(id), attachment_path(name));
        let raw = self
            .conn
            .send_raw(CouchRequest::new(reqwest::Method::GET, uri))?;

        match raw.status {
            404 => Ok(None),
            200..=299 => {
                let content_type = raw.header("Content-Type").map(str::to_string);
                let content_length = raw.header("Content-Length").and_then(|v| v.parse().ok());
                Ok(Some(AttachmentStream::new(content_type, content_length, raw.body)))
            }
            _ => Err(CouchResponse::read(raw)?.into_error()),
        }
    }

    #[tracing::instrument(skip(self), fields(db = %self.name))]
    pub fn delete_attachment(&self, id: &str, rev: &str, name: &str) -> Result<WriteResult> {
        require(id, "document id")?;
        require(rev, "revision")?;
        require(name, "attachment name")?;

        let uri = format!(
            "{}/{}?rev={}",
            self.doc_uri(id),
            attachment_path(name),
            encode_component(rev)
        );
        decode_write(self.conn.send(CouchRequest::delete(uri))?, DELETE_OK)
    }

    /// Delete against the current revision; same race window as
    /// [`put_attachment_latest`](Self::put_attachment_latest)
    pub fn delete_attachment_latest(&self, id: &str, name: &str) -> Result<WriteResult> {
        let rev = self.current_rev(id)?;
        tracing::warn!(db = %self.name, id, rev = %rev, "Attachment delete without explicit revision");
        self.delete_attachment(id, &rev, name)
    }

    fn current_rev(&self, id: &str) -> Result<String> {
        let doc = self.get_document(id)?.ok_or_else(|| ClientError::Server {
            status: 404,
            error: Some("not_found".into()),
            reason: format!("document `{id}` does not exist"),
        })?;
        doc.rev
            .ok_or_else(|| ClientError::InvalidResponse(format!("document `{id}` has no _rev")))
    }

    pub(crate) fn expect_accepted(&self, request: CouchRequest) -> Result<Value> {
        let response = expect_status(self.conn.send(request)?, &[202])?;
        Ok(response.json()?.clone())
    }

    /// Start database compaction
    pub fn compact(&self) -> Result<Value> {
        tracing::info!(db = %self.name, "Compacting database");
        self.expect_accepted(
            CouchRequest::post(format!("{}/_compact", self.uri)).json(String::new()),
        )
    }

    /// Start compaction of one design document's views (admin only)
    pub fn compact_view(&self, design_doc: &str) -> Result<Value> {
        self.design(design_doc).compact()
    }

    /// Remove index files no current design document uses
    pub fn view_cleanup(&self) -> Result<Value> {
        tracing::info!(db = %self.name, "Cleaning up views");
        self.expect_accepted(
            CouchRequest::post(format!("{}/_view_cleanup", self.uri)).json(String::new()),
        )
    }

    pub fn security(&self) -> Result<SecurityDocument> {
        let response = self
            .conn
            .send(CouchRequest::get(format!("{}/_security", self.uri)))?;
        expect_status(response, &[200])?.deserialize()
    }

    pub fn set_security(&self, security: &SecurityDocument) -> Result<()> {
        tracing::info!(db = %self.name, "Updating security document");
        let request = CouchRequest::put(format!("{}/_security", self.uri))
            .json(serde_json::to_string(security)?);
        expect_status(self.conn.send(request)?, &[200])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde::Deserialize;
    use serde_json::json;
    use std::io::{Cursor, Read};

    fn db(mock: &MockTransport) -> Database {
        mock.client().database("app")
    }

    #[test]
    fn test_debug_shows_name_and_uri() {
        let text = format!("{:?}", db(&MockTransport::new()));
        assert!(text.contains("\"app\""));
        assert!(text.contains("http://couch:5984/app"));
    }

    #[test]
    fn test_missing_document_is_none() {
        let mock = MockTransport::new();
        mock.push_json(404, json!({"error": "not_found", "reason": "missing"}));

        assert!(db(&mock).get_document("nope").unwrap().is_none());
        assert_eq!(mock.last_request().url, "http://couch:5984/app/nope");
    }

    #[test]
    fn test_get_document_typed() {
        #[derive(Deserialize)]
        struct Sofa {
            #[serde(rename = "_id")]
            id: String,
            seats: u32,
        }

        let mock = MockTransport::new();
        mock.push_json(200, json!({"_id": "s1", "_rev": "1-a", "seats": 3}));

        let sofa: Sofa = db(&mock).get_document_as("s1").unwrap().unwrap();
        assert_eq!(sofa.id, "s1");
        assert_eq!(sofa.seats, 3);
    }

    #[test]
    fn test_get_document_with_attachments() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"_id": "a b", "_rev": "1-a"}));

        db(&mock).get_document_with_attachments("a b").unwrap();
        assert_eq!(
            mock.last_request().url,
            "http://couch:5984/app/a%20b?attachments=true"
        );
    }

    #[test]
    fn test_create_document_drops_null_rev() {
        let mock = MockTransport::new();
        mock.push_json(201, json!({"ok": true, "id": "x", "rev": "1-a"}));

        let result = db(&mock)
            .create_document("x", r#"{"_rev": null, "name": "sofa"}"#)
            .unwrap();

        assert_eq!(result.rev, "1-a");
        let request = mock.last_request();
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.body_json(), json!({"name": "sofa"}));
    }

    #[test]
    fn test_malformed_json_never_reaches_the_wire() {
        let mock = MockTransport::new();
        let err = db(&mock).create_document("x", "{not json").unwrap_err();
        assert!(matches!(err, ClientError::Serialization(_)));

        let err = db(&mock).create_document_auto("[1, 2]").unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_create_document_auto_posts() {
        let mock = MockTransport::new();
        mock.push_json(201, json!({"ok": true, "id": "generated", "rev": "1-a"}));

        let result = db(&mock).create_document_auto(r#"{"n": 1}"#).unwrap();
        assert_eq!(result.id, "generated");
        let request = mock.last_request();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "http://couch:5984/app/");
    }

    #[test]
    fn test_save_document_with_rev_updates() {
        let mock = MockTransport::new();
        mock.push_json(201, json!({"ok": true, "id": "x", "rev": "2-b"}));

        let doc = Document::new("x", json!({"n": 2}).as_object().cloned().unwrap()).with_rev("1-a");
        db(&mock).save_document(&doc).unwrap();

        let request = mock.last_request();
        assert_eq!(request.url, "http://couch:5984/app/x?rev=1-a");
        assert_eq!(request.body_json(), json!({"_id": "x", "_rev": "1-a", "n": 2}));
    }

    #[test]
    fn test_save_document_stale_rev_is_conflict() {
        let mock = MockTransport::new();
        mock.push_json(409, json!({"error": "conflict", "reason": "Document update conflict."}));

        let doc = Document::new("x", Default::default()).with_rev("1-stale");
        let err = db(&mock).save_document(&doc).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_delete_requires_id_and_rev() {
        let mock = MockTransport::new();
        assert!(matches!(
            db(&mock).delete_document("x", "").unwrap_err(),
            ClientError::InvalidArgument(_)
        ));
        assert!(mock.requests().is_empty());

        mock.push_json(200, json!({"ok": true, "id": "x", "rev": "2-b"}));
        db(&mock).delete_document("x", "1-a").unwrap();
        let request = mock.last_request();
        assert_eq!(request.method, Method::DELETE);
        assert_eq!(request.url, "http://couch:5984/app/x?rev=1-a");
    }

    #[test]
    fn test_get_documents_uses_all_docs_keys() {
        let mock = MockTransport::new();
        mock.push_json(
            200,
            json!({"total_rows": 5, "offset": 0, "rows": [
                {"id": "a", "key": "a", "value": {"rev": "1-a"}, "doc": {"_id": "a"}},
                {"key": "b", "error": "not_found"}
            ]}),
        );

        let result = db(&mock).get_documents(["a", "b"]).unwrap().unwrap();
        assert_eq!(result.len(), 2);

        let request = mock.last_request();
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.url,
            "http://couch:5984/app/_all_docs?keys=%5B%22a%22%2C%22b%22%5D&include_docs=true"
        );
    }

    #[test]
    fn test_get_documents_falls_back_to_post() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"total_rows": 0, "offset": 0, "rows": []}));

        let keys: Vec<String> = (0..400).map(|i| format!("id-{i}")).collect();
        db(&mock).get_documents(keys.clone()).unwrap();

        let request = mock.last_request();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "http://couch:5984/app/_all_docs?include_docs=true");
        assert_eq!(request.body_json(), json!({ "keys": keys }));
    }

    #[test]
    fn test_design_documents_range() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"rows": []}));

        db(&mock).design_documents().unwrap();
        assert_eq!(
            mock.last_request().url,
            "http://couch:5984/app/_all_docs?startkey=%22_design%22&endkey=%22_design0%22"
        );
    }

    #[test]
    fn test_default_design_requires_configuration() {
        let mock = MockTransport::new();
        assert!(db(&mock).default_design().is_err());

        let client = crate::Client::builder("http://couch:5984")
            .transport(mock.clone())
            .default_design_doc("app")
            .build()
            .unwrap();
        let app = client.database("app");
        assert_eq!(
            app.default_design().unwrap().uri(),
            "http://couch:5984/app/_design/app"
        );
    }

    #[test]
    fn test_exists() {
        let mock = MockTransport::new();
        mock.push_raw(200, Vec::new(), Vec::new());
        mock.push_raw(404, Vec::new(), Vec::new());

        assert!(db(&mock).exists().unwrap());
        assert!(!db(&mock).exists().unwrap());
        assert_eq!(mock.last_request().method, Method::HEAD);
    }

    #[test]
    fn test_put_attachment_streams_body() {
        let mock = MockTransport::new();
        mock.push_json(201, json!({"ok": true, "id": "x", "rev": "3-c"}));

        let reader = Cursor::new(b"hello".to_vec());
        db(&mock)
            .put_attachment(
                "x",
                "2-b",
                "notes/read me.txt",
                "text/plain",
                AttachmentBody::from_reader(reader),
            )
            .unwrap();

        let request = mock.last_request();
        assert_eq!(
            request.url,
            "http://couch:5984/app/x/notes/read%20me.txt?rev=2-b"
        );
        assert_eq!(request.header("Content-Type"), Some("text/plain"));
        assert_eq!(request.body.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_put_attachment_latest_reads_revision_first() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"_id": "x", "_rev": "5-e"}));
        mock.push_json(201, json!({"ok": true, "id": "x", "rev": "6-f"}));

        let result = db(&mock)
            .put_attachment_latest("x", "a.bin", "application/octet-stream", vec![1u8, 2, 3])
            .unwrap();
        assert_eq!(result.rev, "6-f");

        let requests = mock.requests();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[1].url, "http://couch:5984/app/x/a.bin?rev=5-e");
    }

    #[test]
    fn test_put_attachment_latest_on_missing_document() {
        let mock = MockTransport::new();
        mock.push_json(404, json!({"error": "not_found", "reason": "missing"}));

        let err = db(&mock)
            .put_attachment_latest("x", "a.bin", "application/octet-stream", vec![1u8])
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_get_attachment_stream() {
        let mock = MockTransport::new();
        mock.push_raw(
            200,
            vec![
                ("Content-Type".into(), "image/png".into()),
                ("Content-Length".into(), "4".into()),
            ],
            vec![0x89, b'P', b'N', b'G'],
        );
        mock.push_json(404, json!({"error": "not_found", "reason": "Document is missing attachment"}));

        let mut stream = db(&mock).get_attachment("x", "logo.png").unwrap().unwrap();
        assert_eq!(stream.content_type(), Some("image/png"));
        assert_eq!(stream.content_length(), Some(4));
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);

        assert!(db(&mock).get_attachment("x", "gone.png").unwrap().is_none());
    }

    #[test]
    fn test_delete_attachment_latest() {
        let mock = MockTransport::new();
        mock.push_json(200, json!({"_id": "x", "_rev": "2-b"}));
        mock.push_json(200, json!({"ok": true, "id": "x", "rev": "3-c"}));

        db(&mock).delete_attachment_latest("x", "a.txt").unwrap();
        let request = mock.last_request();
        assert_eq!(request.method, Method::DELETE);
        assert_eq!(request.url, "http://couch:5984/app/x/a.txt?rev=2-b");
    }

    #[test]
    fn test_compact_requires_accepted() {
        let mock = MockTransport::new();
        mock.push_json(202, json!({"ok": true}));
        mock.push_json(401, json!({"error": "unauthorized", "reason": "You are not a server admin."}));

        assert_eq!(db(&mock).compact().unwrap(), json!({"ok": true}));
        let request = mock.last_request();
        assert_eq!(request.url, "http://couch:5984/app/_compact");
        assert_eq!(request.header("Content-Type"), Some("application/json"));

        assert_eq!(db(&mock).view_cleanup().unwrap_err().status(), Some(401));
    }

    #[test]
    fn test_compact_view() {
        let mock = MockTransport::new();
        mock.push_json(202, json!({"ok": true}));

        db(&mock).compact_view("app").unwrap();
        assert_eq!(mock.last_request().url, "http://couch:5984/app/_compact/app");
    }

    #[test]
    fn test_security_round_trip() {
        let mock = MockTransport::new();
        mock.push_json(
            200,
            json!({"admins": {"names": [], "roles": ["ops"]}, "readers": {"names": ["dave"], "roles": []}}),
        );
        mock.push_json(200, json!({"ok": true}));
        mock.push_json(500, json!({"error": "internal", "reason": "boom"}));

        let mut security = db(&mock).security().unwrap();
        assert_eq!(security.readers.names, vec!["dave"]);

        security.admins.names.push("root".into());
        db(&mock).set_security(&security).unwrap();
        let request = mock.last_request();
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.body_json()["admins"]["names"], json!(["root"]));

        assert_eq!(db(&mock).set_security(&security).unwrap_err().status(), Some(500));
    }
}
