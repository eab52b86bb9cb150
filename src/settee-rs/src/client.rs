use serde_json::Value;
use settee_core::query::encode_component;
use settee_core::Config;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{auth_from_config, Authenticator, NoAuth};
use crate::database::Database;
use crate::request::CouchRequest;
use crate::response::{expect_status, expect_success, CouchResponse, DELETE_OK, WRITE_OK};
use crate::transport::{HttpTransport, RawResponse, Transport};
use crate::Result;

/// State shared by a client and every database handle it hands out
pub(crate) struct Connection {
    pub(crate) base_url: String,
    transport: Box<dyn Transport>,
    auth: Box<dyn Authenticator>,
    pub(crate) max_url_length: usize,
    pub(crate) default_design_doc: Option<String>,
}

impl Connection {
    /// Authorize and send, leaving the body unread
    pub(crate) fn send_raw(&self, mut request: CouchRequest) -> Result<RawResponse> {
        self.auth.authorize(&mut request, self.transport.as_ref())?;

        let method = request.method.clone();
        let url = request.url.clone();
        let response = self.transport.send(request)?;
        tracing::debug!(%method, %url, status = response.status, "CouchDB request");
        self.auth.observe(&response);
        Ok(response)
    }

    pub(crate) fn send(&self, request: CouchRequest) -> Result<CouchResponse> {
        CouchResponse::read(self.send_raw(request)?)
    }
}

/// CouchDB server client
#[derive(Clone)]
pub struct Client {
    inner: Arc<Connection>,
}

pub struct ClientBuilder {
    base_url: String,
    transport: Option<Box<dyn Transport>>,
    auth: Box<dyn Authenticator>,
    max_url_length: usize,
    timeout: Duration,
    insecure_skip_verify: bool,
    default_design_doc: Option<String>,
}

impl ClientBuilder {
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn auth(mut self, auth: impl Authenticator + 'static) -> Self {
        self.auth = Box::new(auth);
        self
    }

    pub fn boxed_auth(mut self, auth: Box<dyn Authenticator>) -> Self {
        self.auth = auth;
        self
    }

    pub fn max_url_length(mut self, max_url_length: usize) -> Self {
        self.max_url_length = max_url_length;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    pub fn default_design_doc(mut self, design_doc: impl Into<String>) -> Self {
        self.default_design_doc = Some(design_doc.into());
        self
    }

    pub fn build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new(self.timeout, self.insecure_skip_verify)?),
        };

        Ok(Client {
            inner: Arc::new(Connection {
                base_url: self.base_url,
                transport,
                auth: self.auth,
                max_url_length: self.max_url_length,
                default_design_doc: self.default_design_doc,
            }),
        })
    }
}

impl Client {
    /// Anonymous client over HTTP with default settings
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        let defaults = Config::default();
        ClientBuilder {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport: None,
            auth: Box::new(NoAuth),
            max_url_length: defaults.max_url_length,
            timeout: Duration::from_secs(defaults.timeout_secs),
            insecure_skip_verify: false,
            default_design_doc: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Self::builder(config.base_url())
            .boxed_auth(auth_from_config(&config.auth, config.base_url()))
            .max_url_length(config.max_url_length)
            .timeout(Duration::from_secs(config.timeout_secs))
            .insecure_skip_verify(config.insecure_skip_verify);
        if let Some(design_doc) = &config.default_design_doc {
            builder = builder.default_design_doc(design_doc.clone());
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Handle for a database; no request is made
    pub fn database(&self, name: impl Into<String>) -> Database {
        Database::new(self.inner.clone(), name.into())
    }

    /// Server welcome object (`GET /`)
    pub fn server_info(&self) -> Result<Value> {
        let response = self.inner.send(CouchRequest::get(format!("{}/", self.base_url())))?;
        Ok(expect_success(response)?.json()?.clone())
    }

    pub fn all_databases(&self) -> Result<Vec<String>> {
        let response = self
            .inner
            .send(CouchRequest::get(format!("{}/_all_dbs", self.base_url())))?;
        expect_success(response)?.deserialize()
    }

    pub fn create_database(&self, name: &str) -> Result<Database> {
        tracing::info!(db = %name, "Creating database");
        let url = format!("{}/{}", self.base_url(), encode_component(name));
        expect_status(self.inner.send(CouchRequest::put(url))?, WRITE_OK)?;
        Ok(self.database(name))
    }

    pub fn delete_database(&self, name: &str) -> Result<()> {
        tracing::info!(db = %name, "Deleting database");
        let url = format!("{}/{}", self.base_url(), encode_component(name));
        expect_status(self.inner.send(CouchRequest::delete(url))?, DELETE_OK)?;
        Ok(())
    }
}
