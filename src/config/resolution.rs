//! Tool config resolution.
//!
//! Walks the ranked sources on every call and takes the first one that yields a usable
//! config. Sources are never merged:
//! 1. Host storage (`mcpToolsConfig` via the note store)
//! 2. The first parseable candidate file
//! 3. `SIYUAN_MCP_TOOLS`
//! 4. Everything enabled

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::api::{HostStorage, TOOLS_CONFIG_KEY};
use crate::error::{GatewayError, Result};

use super::sources::{ConfigEnv, TOOLS_ENV_VAR};
use super::tool_config::ToolConfig;

/// Where a resolved config came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    HostStorage,
    File(PathBuf),
    Environment,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::HostStorage => write!(f, "host storage ({})", TOOLS_CONFIG_KEY),
            ConfigSource::File(path) => write!(f, "file {}", path.display()),
            ConfigSource::Environment => write!(f, "environment ({})", TOOLS_ENV_VAR),
            ConfigSource::Default => write!(f, "built-in default"),
        }
    }
}

/// Produces the current [`ToolConfig`] from the ranked sources.
#[derive(Clone)]
pub struct ConfigResolver {
    host: Option<Arc<dyn HostStorage>>,
    env: ConfigEnv,
}

impl ConfigResolver {
    /// Create a resolver. Without `host` the host-storage source is skipped.
    pub fn new(host: Option<Arc<dyn HostStorage>>, env: ConfigEnv) -> Self {
        Self { host, env }
    }

    /// Resolve the current config. Never fails.
    pub async fn resolve(&self) -> ToolConfig {
        self.resolve_with_source().await.0
    }

    /// Resolve the current config and report which source produced it.
    pub async fn resolve_with_source(&self) -> (ToolConfig, ConfigSource) {
        if let Some(config) = first_success("host storage", self.from_host().await) {
            return (config, ConfigSource::HostStorage);
        }

        for path in self.env.candidate_paths() {
            if let Some(config) = first_success("config file", self.from_file(&path).await) {
                return (config, ConfigSource::File(path));
            }
        }

        if let Some(config) = first_success(TOOLS_ENV_VAR, self.from_env()) {
            return (config, ConfigSource::Environment);
        }

        (ToolConfig::default(), ConfigSource::Default)
    }

    async fn from_host(&self) -> Result<Option<ToolConfig>> {
        let Some(host) = &self.host else {
            return Ok(None);
        };
        match host.load(TOOLS_CONFIG_KEY).await? {
            Some(Value::Object(switches)) => Ok(Some(ToolConfig::from_tool_level(&switches))),
            Some(other) => Err(not_an_object(&other)),
            None => Ok(None),
        }
    }

    async fn from_file(&self, path: &Path) -> Result<Option<ToolConfig>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path).await?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(switches) => Ok(Some(ToolConfig::from_tool_level(&switches))),
            Value::Null => Ok(None),
            other => Err(not_an_object(&other)),
        }
    }

    fn from_env(&self) -> Result<Option<ToolConfig>> {
        let Some(raw) = &self.env.tools_json else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(object) if ToolConfig::is_category_shaped(&object) => {
                Ok(Some(serde_json::from_value(Value::Object(object))?))
            }
            Value::Object(switches) => Ok(Some(ToolConfig::from_tool_level(&switches))),
            Value::Null => Ok(None),
            other => Err(not_an_object(&other)),
        }
    }
}

/// Unwrap one source lookup; failures are logged and treated as "no config here".
fn first_success(source: &str, lookup: Result<Option<ToolConfig>>) -> Option<ToolConfig> {
    match lookup {
        Ok(found) => found,
        Err(e) => {
            log::debug!("Skipping tool config from {}: {}", source, e);
            None
        }
    }
}

fn not_an_object(value: &Value) -> GatewayError {
    GatewayError::InvalidArguments(format!("expected a JSON object, got {}", value))
}
