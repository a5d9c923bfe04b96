//! Gateway settings.
//!
//! Loaded from .siyuan-mcp.yml or ~/.config/siyuan-mcp/siyuan-mcp.yml, then overridden by
//! `SIYUAN_API_URL`, `SIYUAN_API_TOKEN` and `SIYUAN_API_TIMEOUT_MS`.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS};

/// Project config file name
pub const PROJECT_CONFIG_FILE: &str = ".siyuan-mcp.yml";

/// Settings for the gateway binary.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Note store connection.
    pub api: ApiSettings,
}

impl GatewaySettings {
    /// Load settings with fallback chain, then apply environment overrides.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .siyuan-mcp.yml in current directory
    /// 3. ~/.config/siyuan-mcp/siyuan-mcp.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut settings = Self::load_file(config_path)?;
        settings.apply_overrides(|name| std::env::var(name).ok());
        Ok(settings)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(PROJECT_CONFIG_FILE);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(settings) => {
                    log::info!("Loaded config from {}", PROJECT_CONFIG_FILE);
                    return Ok(settings);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", PROJECT_CONFIG_FILE, e);
                }
            }
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(settings) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(settings);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// `<config_dir>/siyuan-mcp/siyuan-mcp.yml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("siyuan-mcp").join("siyuan-mcp.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let settings: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(settings)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Empty values are ignored, as is a timeout that is not a positive integer.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("SIYUAN_API_URL") {
            self.api.url = url;
        }
        if let Some(token) = lookup("SIYUAN_API_TOKEN") {
            self.api.token = Some(token);
        }
        if let Some(raw) = lookup("SIYUAN_API_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.api.timeout_ms = ms,
                _ => log::warn!("Ignoring invalid SIYUAN_API_TIMEOUT_MS: {}", raw),
            }
        }
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        if self.api.url.trim().is_empty() {
            eyre::bail!("api.url must not be empty");
        }
        if self.api.timeout_ms == 0 {
            eyre::bail!("api.timeout-ms must be > 0");
        }
        Ok(())
    }

    /// HTTP client settings derived from `api`.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.url.clone(),
            token: self.api.token.clone().filter(|t| !t.is_empty()),
            timeout: Duration::from_millis(self.api.timeout_ms),
        }
    }
}

/// Note store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Kernel base URL.
    pub url: String,

    /// API token sent as `Authorization: Token <token>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}
