//! Configuration - OAuth client credentials and upstream listing limits

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth.bitrix.info/oauth/token/";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "GANTTKIT_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    /// Upstream `error` value that means "access token expired"
    pub expired_token_error: String,
    pub page_limit: u32,
    pub max_pages: u32,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            expired_token_error: crate::executor::EXPIRED_TOKEN_ERROR.to_string(),
            page_limit: 50,
            max_pages: 40,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// `<config dir>/ganttkit/config.yml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ganttkit")
            .join("config.yml")
    }

    /// Resolve and load the configuration
    /// Priority:
    /// 1. explicit path (`--config`)
    /// 2. `$GANTTKIT_CONFIG`
    /// 3. the default path, if it exists
    /// 4. built-in defaults
    ///
    /// Environment credentials override whatever the file says.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from(&path)?,
            None => Self::load_from(&Self::default_path())?,
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a YAML file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if config.max_pages == 0 || config.page_limit == 0 {
            anyhow::bail!(
                "config {}: max_pages and page_limit must be at least 1",
                path.display()
            );
        }
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `GANTTKIT_CLIENT_ID`, `GANTTKIT_CLIENT_SECRET` and `GANTTKIT_TOKEN_URL`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = non_empty("GANTTKIT_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = non_empty("GANTTKIT_CLIENT_SECRET") {
            self.client_secret = v;
        }
        if let Some(v) = non_empty("GANTTKIT_TOKEN_URL") {
            self.token_url = v;
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}
