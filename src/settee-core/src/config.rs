use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_url")]
    pub url: String,
    /// Database used when a command does not name one
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Longest GET url before `keys` move into a POST body
    #[serde(default = "default_max_url_length")]
    pub max_url_length: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Design document used by `Database::default_design`
    #[serde(default)]
    pub default_design_doc: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    None,
    Basic,
    Cookie,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_url() -> String {
    "http://localhost:5984".to_string()
}

fn default_max_url_length() -> usize {
    2000
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Server url without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: None,
            auth: AuthConfig::default(),
            max_url_length: default_max_url_length(),
            timeout_secs: default_timeout_secs(),
            insecure_skip_verify: false,
            default_design_doc: None,
        }
    }
}
