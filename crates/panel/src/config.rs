//! Panel configuration: TOML file, environment overrides, and validation.

use anyhow::{bail, Context, Result};
use irrigation_api::Credentials;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "panel.toml";

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_NODE_ID: &str = "node-01";
const DEFAULT_POLL_INTERVAL_SEC: u64 = 5;
const MAX_POLL_INTERVAL_SEC: u64 = 3600;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub panel: PanelSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PanelSection {
    #[serde(default = "default_node_id")]
    pub default_node_id: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_sec: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_node_id() -> String {
    DEFAULT_NODE_ID.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SEC
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: None,
            password: None,
        }
    }
}

impl Default for PanelSection {
    fn default() -> Self {
        Self {
            default_node_id: default_node_id(),
            poll_interval_sec: DEFAULT_POLL_INTERVAL_SEC,
        }
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl Config {
    /// Basic-auth pair, when both halves are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.api.username, &self.api.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.panel.poll_interval_sec)
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production; empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = var("API_USERNAME") {
            self.api.username = Some(v);
        }
        if let Some(v) = var("API_PASSWORD") {
            self.api.password = Some(v);
        }
        if let Some(v) = var("DEFAULT_NODE_ID") {
            self.panel.default_node_id = v;
        }
        if let Some(v) = var("POLL_INTERVAL_SEC") {
            self.panel.poll_interval_sec = v
                .trim()
                .parse()
                .with_context(|| format!("POLL_INTERVAL_SEC is not a number: {v}"))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Returns `Ok(())` or an error describing every violation found.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        let url = self.api.base_url.trim();
        if url.is_empty() {
            errors.push("api.base_url is empty".to_string());
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!(
                "api.base_url '{url}' must start with http:// or https://"
            ));
        }

        match (&self.api.username, &self.api.password) {
            (Some(_), None) => {
                errors.push("api.username is set but api.password is not".to_string())
            }
            (None, Some(_)) => {
                errors.push("api.password is set but api.username is not".to_string())
            }
            _ => {}
        }

        if self.panel.default_node_id.trim().is_empty() {
            errors.push("panel.default_node_id is empty".to_string());
        }

        if !(1..=MAX_POLL_INTERVAL_SEC).contains(&self.panel.poll_interval_sec) {
            errors.push(format!(
                "panel.poll_interval_sec {} out of range [1, {MAX_POLL_INTERVAL_SEC}]",
                self.panel.poll_interval_sec
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read `path`; a missing file yields the defaults.
pub fn read(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        tracing::debug!(path, "no config file, using defaults");
        return Ok(Config::default());
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    Ok(config)
}

/// File, then environment, then the command-line node override; validated.
pub fn load(path: &str, node_override: Option<&str>) -> Result<Config> {
    let mut config = read(path)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    if let Some(node) = node_override {
        config.panel.default_node_id = node.to_string();
    }
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
