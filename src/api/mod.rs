//! Note-store collaborators
//!
//! The gateway talks to SiYuan through two narrow seams:
//! - [`NoteStore`]: one request/response call per tool invocation
//! - [`HostStorage`]: the plugin's persisted JSON blobs (get/set/remove)
//!
//! [`SiyuanClient`] implements both over HTTP.

mod client;

pub use client::{
    ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS, SiyuanClient, unwrap_envelope,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Plugin directory under which the host persists plugin data
pub const PLUGIN_NAME: &str = "siyuan-plugins-mcp-sisyphus";

/// Logical key of the persisted tool permission blob
pub const TOOLS_CONFIG_KEY: &str = "mcpToolsConfig";

/// Workspace-relative storage path for a plugin data key.
pub fn storage_path(key: &str) -> String {
    format!("/data/storage/petal/{}/{}", PLUGIN_NAME, key)
}

/// Downstream note-store API
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// POST `payload` to `endpoint` and return the unwrapped `data` of the response envelope.
    ///
    /// A non-zero envelope `code` is returned as [`crate::GatewayError::Api`].
    async fn request(&self, endpoint: &str, payload: Value) -> Result<Value>;

    /// Upload one asset file into `assets_dir_path`.
    async fn upload_asset(
        &self,
        assets_dir_path: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value>;
}

/// Key-value storage for plugin data owned by the host application
#[async_trait]
pub trait HostStorage: Send + Sync {
    /// Load the JSON value stored under `key`, `None` when nothing is stored.
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove whatever is stored under `key`.
    async fn remove(&self, key: &str) -> Result<()>;
}
