//! Configuration loader and validator for the feed sync service.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::RetentionPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Top-level `config.yaml` layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub http: Http,
    pub actu: Actu,
    pub memento: Memento,
}

/// Store location and sync schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub sync_interval_secs: u64,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

/// Outbound HTTP settings shared by every feed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Http {
    pub user_agent: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub allowed_hosts: Vec<String>,
}

/// News API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actu {
    pub base_url: String,
}

/// Events API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Memento {
    pub ical_base_url: String,
}

impl Config {
    /// Create `app.data_dir` when it does not exist yet.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Database URL, honouring a `DATABASE_URL` override.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/epfl-ws.db", self.app.resolved_data_dir()))
    }
}

impl App {
    /// `data_dir` with a leading `~/` expanded to `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }
}

/// Read and validate the YAML file at `path` (default `./config.yaml`).
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.sync_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.sync_interval_secs must be > 0"));
    }

    if cfg.http.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("http.user_agent must be non-empty"));
    }
    if cfg.http.timeout_secs == Some(0) {
        return Err(ConfigError::Invalid("http.timeout_secs must be > 0 when set"));
    }
    if cfg.http.allowed_hosts.iter().all(|h| h.trim().is_empty()) {
        return Err(ConfigError::Invalid("http.allowed_hosts must list at least one host"));
    }

    let actu = Url::parse(&cfg.actu.base_url)
        .map_err(|_| ConfigError::Invalid("actu.base_url must be an absolute URL"))?;
    let actu_host = actu.host_str().unwrap_or_default();
    if !cfg
        .http
        .allowed_hosts
        .iter()
        .any(|h| h.trim().eq_ignore_ascii_case(actu_host))
    {
        return Err(ConfigError::Invalid("actu.base_url host must be in http.allowed_hosts"));
    }

    if Url::parse(&cfg.memento.ical_base_url).is_err() {
        return Err(ConfigError::Invalid("memento.ical_base_url must be an absolute URL"));
    }

    Ok(())
}

/// Returns the example YAML shipped with the service.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  sync_interval_secs: 3600
  retention: retain

http:
  user_agent: "epfl-ws-sync/0.1"
  timeout_secs: 30
  allowed_hosts:
    - actu.epfl.ch
    - memento.epfl.ch

actu:
  base_url: "https://actu.epfl.ch/api/v1/"

memento:
  ical_base_url: "https://memento.epfl.ch/event/export/"
"#
}
