use base64::{engine::general_purpose::STANDARD, Engine as _};
use settee_core::query::encode_component;
use settee_core::{AuthConfig, AuthMode};
use std::sync::{Mutex, MutexGuard};

use crate::request::CouchRequest;
use crate::response::CouchResponse;
use crate::transport::{RawResponse, Transport};
use crate::{ClientError, Result};

/// Decorates outgoing requests with credentials
pub trait Authenticator: Send + Sync {
    fn authorize(&self, request: &mut CouchRequest, transport: &dyn Transport) -> Result<()>;

    /// Sees every response before it is decoded
    fn observe(&self, _response: &RawResponse) {}
}

/// Anonymous access
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn authorize(&self, _request: &mut CouchRequest, _transport: &dyn Transport) -> Result<()> {
        Ok(())
    }
}

/// `Authorization: Basic ...` on every request
pub struct BasicAuth {
    header: String,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{username}:{password}"));
        Self {
            header: format!("Basic {token}"),
        }
    }
}

impl Authenticator for BasicAuth {
    fn authorize(&self, request: &mut CouchRequest, _transport: &dyn Transport) -> Result<()> {
        request.set_header("Authorization", self.header.clone());
        Ok(())
    }
}

/// Cookie session: logs in through `/_session` when no session is held and
/// sends the `AuthSession` cookie afterwards. A refreshed cookie from the
/// server replaces the held one; a 401 drops it so the next request logs in
/// again. The failed request itself is not resent.
pub struct CookieAuth {
    session_url: String,
    username: String,
    password: String,
    cookie: Mutex<Option<String>>,
}

fn session_cookie(response: &RawResponse) -> Option<String> {
    response
        .header("Set-Cookie")
        .and_then(|cookie| cookie.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.starts_with("AuthSession=") && pair.len() > "AuthSession=".len())
        .map(str::to_string)
}

impl CookieAuth {
    pub fn new(base_url: &str, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            session_url: format!("{}/_session", base_url.trim_end_matches('/')),
            username: username.into(),
            password: password.into(),
            cookie: Mutex::new(None),
        }
    }

    fn login(&self, transport: &dyn Transport) -> Result<String> {
        tracing::debug!(url = %self.session_url, user = %self.username, "Opening cookie session");

        let form = format!(
            "name={}&password={}",
            encode_component(&self.username),
            encode_component(&self.password)
        );
        let raw = transport.send(CouchRequest::post(&self.session_url).form(form))?;
        let cookie = session_cookie(&raw);
        let response = CouchResponse::read(raw)?;

        if response.status() != 200 {
            let reason = response.into_error().to_string();
            return Err(ClientError::Auth(reason));
        }

        cookie.ok_or_else(|| ClientError::Auth("no AuthSession cookie in session response".into()))
    }

    fn held(&self) -> MutexGuard<'_, Option<String>> {
        self.cookie
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Authenticator for CookieAuth {
    fn authorize(&self, request: &mut CouchRequest, transport: &dyn Transport) -> Result<()> {
        let held = self.held().clone();
        let cookie = match held {
            Some(cookie) => cookie,
            None => {
                let cookie = self.login(transport)?;
                *self.held() = Some(cookie.clone());
                cookie
            }
        };
        request.set_header("Cookie", cookie);
        Ok(())
    }

    fn observe(&self, response: &RawResponse) {
        if response.status == 401 {
            tracing::debug!(user = %self.username, "Session rejected, logging in again on next request");
            *self.held() = None;
        } else if let Some(cookie) = session_cookie(response) {
            *self.held() = Some(cookie);
        }
    }
}

/// Strategy selected by configuration
pub fn auth_from_config(config: &AuthConfig, base_url: &str) -> Box<dyn Authenticator> {
    match config.mode {
        AuthMode::None => Box::new(NoAuth),
        AuthMode::Basic => Box::new(BasicAuth::new(&config.username, &config.password)),
        AuthMode::Cookie => Box::new(CookieAuth::new(
            base_url,
            config.username.clone(),
            config.password.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use reqwest::Method;
    use serde_json::json;

    #[test]
    fn test_basic_auth_header() {
        let mock = MockTransport::new();
        let mut request = CouchRequest::get("http://couch/db");
        BasicAuth::new("admin", "secret")
            .authorize(&mut request, &mock)
            .unwrap();
        assert_eq!(
            request.header_value("Authorization"),
            Some("Basic YWRtaW46c2VjcmV0")
        );
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_cookie_auth_logs_in_once() {
        let mock = MockTransport::new();
        mock.push_with_headers(
            200,
            vec![(
                "Set-Cookie".into(),
                "AuthSession=YWRtaW46; Version=1; Path=/; HttpOnly".into(),
            )],
            json!({"ok": true, "name": "admin", "roles": ["_admin"]}),
        );

        let auth = CookieAuth::new("http://couch:5984/", "admin", "p&ss");
        for _ in 0..2 {
            let mut request = CouchRequest::get("http://couch:5984/db");
            auth.authorize(&mut request, &mock).unwrap();
            assert_eq!(request.header_value("Cookie"), Some("AuthSession=YWRtaW46"));
        }

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].url, "http://couch:5984/_session");
        assert_eq!(requests[0].body_text(), Some("name=admin&password=p%26ss"));
    }

    fn session_response(mock: &MockTransport, cookie: &str) {
        mock.push_with_headers(
            200,
            vec![("Set-Cookie".into(), format!("{cookie}; Version=1; Path=/; HttpOnly"))],
            json!({"ok": true, "name": "admin", "roles": ["_admin"]}),
        );
    }

    #[test]
    fn test_cookie_auth_logs_in_again_after_401() {
        let mock = MockTransport::new();
        session_response(&mock, "AuthSession=old");
        mock.push_json(401, json!({"error": "unauthorized", "reason": "Session expired"}));
        session_response(&mock, "AuthSession=new");
        mock.push_json(200, json!({"couchdb": "Welcome"}));

        let client = mock
            .client_builder()
            .auth(CookieAuth::new("http://couch:5984", "admin", "secret"))
            .build()
            .unwrap();

        let err = client.server_info().unwrap_err();
        assert_eq!(err.status(), Some(401));
        client.server_info().unwrap();

        let sent: Vec<(Method, String, Option<String>)> = mock
            .requests()
            .iter()
            .map(|r| (r.method.clone(), r.url.clone(), r.header("Cookie").map(str::to_string)))
            .collect();
        assert_eq!(
            sent,
            vec![
                (Method::POST, "http://couch:5984/_session".to_string(), None),
                (Method::GET, "http://couch:5984/".to_string(), Some("AuthSession=old".to_string())),
                (Method::POST, "http://couch:5984/_session".to_string(), None),
                (Method::GET, "http://couch:5984/".to_string(), Some("AuthSession=new".to_string())),
            ]
        );
    }

    #[test]
    fn test_cookie_auth_takes_refreshed_cookie() {
        let mock = MockTransport::new();
        session_response(&mock, "AuthSession=first");
        mock.push_with_headers(
            200,
            vec![("Set-Cookie".into(), "AuthSession=second; Version=1; Path=/".into())],
            json!({"couchdb": "Welcome"}),
        );
        mock.push_json(200, json!({"couchdb": "Welcome"}));

        let client = mock
            .client_builder()
            .auth(CookieAuth::new("http://couch:5984", "admin", "secret"))
            .build()
            .unwrap();
        client.server_info().unwrap();
        client.server_info().unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].header("Cookie"), Some("AuthSession=second"));
    }

    #[test]
    fn test_cookie_auth_rejected_login() {
        let mock = MockTransport::new();
        mock.push_json(
            401,
            json!({"error": "unauthorized", "reason": "Name or password is incorrect."}),
        );

        let auth = CookieAuth::new("http://couch:5984", "admin", "wrong");
        let mut request = CouchRequest::get("http://couch:5984/db");
        let err = auth.authorize(&mut request, &mock).unwrap_err();

        assert!(matches!(err, ClientError::Auth(ref msg) if msg.contains("incorrect")));
        assert!(request.header_value("Cookie").is_none());
    }

    #[test]
    fn test_auth_from_config() {
        let config = AuthConfig {
            mode: AuthMode::Basic,
            username: "u".into(),
            password: "p".into(),
        };
        let auth = auth_from_config(&config, "http://couch");
        let mut request = CouchRequest::get("http://couch/db");
        auth.authorize(&mut request, &MockTransport::new()).unwrap();
        assert!(request.header_value("Authorization").is_some());
    }
}
