use serde::Serialize;
use serde_json::Value;
use settee_core::query::{encode_component, ViewOptions};
use settee_core::{ListResult, ViewResult};

use crate::database::Database;
use crate::request::{design_path, doc_path, view_request, CouchRequest};
use crate::response::expect_success;
use crate::Result;

/// A design document within a database: views, lists, shows, update
/// handlers and search indexes
pub struct DesignDoc<'a> {
    db: &'a Database,
    name: String,
    uri: String,
}

impl<'a> DesignDoc<'a> {
    pub(crate) fn new(db: &'a Database, name: String) -> Self {
        let name = name.trim_start_matches("_design/").to_string();
        let uri = format!("{}/{}", db.uri(), design_path(&name));
        Self { db, name, uri }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Query a view; `None` when the design document or view is missing
    pub fn view(&self, view: &str, options: &ViewOptions) -> Result<Option<ViewResult>> {
        let uri = format!("{}/_view/{}", self.uri, encode_component(view));
        self.db.query_view(&uri, options)
    }

    /// Run a list function over a view; `None` when the list, view or
    /// design document is missing
    pub fn list(
        &self,
        list: &str,
        view: &str,
        options: &ViewOptions,
    ) -> Result<Option<ListResult>> {
        let uri = format!(
            "{}/_list/{}/{}",
            self.uri,
            encode_component(list),
            encode_component(view)
        );
        let response = self
            .db
            .conn()
            .send(view_request(&uri, options, self.db.conn().max_url_length))?;

        let response = match response.status() {
            404 => return Ok(None),
            304 => response,
            _ => expect_success(response)?,
        };

        Ok(Some(ListResult {
            status: response.status(),
            content_type: response.header("Content-Type").map(str::to_string),
            etag: response.etag().map(str::to_string),
            body: response.into_text(),
        }))
    }

    /// Render a document through a show function
    pub fn show(&self, show: &str, doc_id: &str) -> Result<String> {
        let uri = format!(
            "{}/_show/{}/{}",
            self.uri,
            encode_component(show),
            doc_path(doc_id)
        );
        let request = CouchRequest::new(reqwest::Method::GET, uri);
        Ok(expect_success(self.db.conn().send(request)?)?.into_text())
    }

    /// PUT `body` through an update handler. Returns the handler's JSON
    /// reply, or its text as a JSON string when it is not JSON.
    pub fn update<T: Serialize>(&self, handler: &str, doc_id: &str, body: &T) -> Result<Value> {
        let uri = format!(
            "{}/_update/{}/{}",
            self.uri,
            encode_component(handler),
            doc_path(doc_id)
        );
        let request = CouchRequest::put(uri).json(serde_json::to_string(body)?);
        let response = expect_success(self.db.conn().send(request)?)?;

        let parsed = response.json().ok().cloned();
        Ok(parsed.unwrap_or_else(|| Value::String(response.into_text())))
    }

    /// Query a search index; `query` is a raw query string such as `q=name:sofa&limit=5`
    pub fn search(&self, index: &str, query: &str) -> Result<Value> {
        let uri = format!(
            "{}/_search/{}?{}",
            self.uri,
            encode_component(index),
            query.trim_start_matches('?')
        );
        tracing::debug!(url = %uri, "Search request");
        let response = expect_success(self.db.conn().send(CouchRequest::get(uri))?)?;
        Ok(response.json()?.clone())
    }

    /// Compact this design document's view indexes
    pub fn compact(&self) -> Result<Value> {
        tracing::info!(db = %self.db.name(), design = %self.name, "Compacting views");
        let uri = format!("{}/_compact/{}", self.db.uri(), encode_component(&self.name));
        self.db.expect_accepted(CouchRequest::post(uri).json(String::new()))
    }
}
