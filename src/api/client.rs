//! SiYuan HTTP client
//!
//! Implements [`NoteStore`] and [`HostStorage`] against the SiYuan kernel API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{GatewayError, Result};

use super::{HostStorage, NoteStore, storage_path};

/// Default kernel address
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:6806";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Connection settings for [`SiyuanClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Envelope code getFile uses for a missing file
const FILE_NOT_FOUND: i64 = 404;

/// `{code, msg, data}` response envelope
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Unwrap a response envelope, turning a non-zero code into an error.
pub fn unwrap_envelope(body: Value) -> Result<Value> {
    let envelope: ApiEnvelope = serde_json::from_value(body)
        .map_err(|e| GatewayError::Http(format!("Malformed API response: {}", e)))?;
    if envelope.code != 0 {
        return Err(GatewayError::Api {
            code: envelope.code,
            msg: envelope.msg,
        });
    }
    Ok(envelope.data)
}

/// Check whether a JSON body is an API envelope rather than raw file content.
fn is_envelope(body: &Value) -> bool {
    body.get("code").is_some_and(Value::is_i64) && body.get("msg").is_some()
}

/// HTTP client for the SiYuan kernel
#[derive(Debug, Clone)]
pub struct SiyuanClient {
    http: Client,
    config: ClientConfig,
}

impl SiyuanClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Base URL of the kernel
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) if !token.is_empty() => {
                builder.header("Authorization", format!("Token {}", token))
            }
            _ => builder,
        }
    }

    fn map_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.timeout.as_millis() as u64)
        } else {
            GatewayError::Http(err.to_string())
        }
    }

    /// Send a request and return the decoded JSON body without unwrapping it.
    async fn send(&self, builder: RequestBuilder) -> Result<Value> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Http(format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }

        response.json::<Value>().await.map_err(|e| self.map_error(e))
    }
}

#[async_trait]
impl NoteStore for SiyuanClient {
    async fn request(&self, endpoint: &str, payload: Value) -> Result<Value> {
        log::debug!("POST {}", endpoint);
        let mut builder = self.http.post(self.url(endpoint));
        if !payload.is_null() {
            builder = builder.json(&payload);
        }
        let body = self.send(builder).await?;
        unwrap_envelope(body)
    }

    async fn upload_asset(
        &self,
        assets_dir_path: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value> {
        log::debug!("Uploading asset {} to {}", file_name, assets_dir_path);
        let form = Form::new()
            .text("assetsDirPath", assets_dir_path.to_string())
            .part("file[]", Part::bytes(bytes).file_name(file_name.to_string()));
        let builder = self.http.post(self.url("/api/asset/upload")).multipart(form);
        let body = self.send(builder).await?;
        unwrap_envelope(body)
    }
}

#[async_trait]
impl HostStorage for SiyuanClient {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let builder = self
            .http
            .post(self.url("/api/file/getFile"))
            .json(&json!({ "path": storage_path(key) }));
        let body = self.send(builder).await?;

        // getFile answers with the raw file on success and an envelope otherwise.
        let content = if is_envelope(&body) {
            if body["code"] == FILE_NOT_FOUND {
                return Ok(None);
            }
            unwrap_envelope(body)?
        } else {
            body
        };

        match content {
            Value::Null => Ok(None),
            Value::String(text) if text.trim().is_empty() => Ok(None),
            Value::String(text) => Ok(Some(serde_json::from_str(&text)?)),
            other => Ok(Some(other)),
        }
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let form = Form::new()
            .text("path", storage_path(key))
            .text("isDir", "false")
            .part("file", Part::bytes(bytes).file_name(key.to_string()));
        let builder = self.http.post(self.url("/api/file/putFile")).multipart(form);
        let body = self.send(builder).await?;
        unwrap_envelope(body).map(|_| ())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let builder = self
            .http
            .post(self.url("/api/file/removeFile"))
            .json(&json!({ "path": storage_path(key) }));
        let body = self.send(builder).await?;
        unwrap_envelope(body).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_envelope_success() {
        let body = json!({"code": 0, "msg": "", "data": {"notebooks": []}});
        let data = unwrap_envelope(body).unwrap();
        assert!(data["notebooks"].is_array());
    }

    #[test]
    fn test_unwrap_envelope_error_code() {
        let body = json!({"code": -1, "msg": "invalid ID", "data": null});
        let err = unwrap_envelope(body).unwrap_err();
        match err {
            GatewayError::Api { code, msg } => {
                assert_eq!(code, -1);
                assert_eq!(msg, "invalid ID");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_unwrap_envelope_missing_data() {
        let body = json!({"code": 0, "msg": ""});
        assert_eq!(unwrap_envelope(body).unwrap(), Value::Null);
    }

    #[test]
    fn test_unwrap_envelope_malformed() {
        let err = unwrap_envelope(json!({"list_notebooks": true})).unwrap_err();
        assert!(matches!(err, GatewayError::Http(_)));
    }

    #[test]
    fn test_is_envelope() {
        assert!(is_envelope(&json!({"code": 404, "msg": "not found", "data": null})));
        assert!(!is_envelope(&json!({"list_notebooks": true})));
        assert!(!is_envelope(&json!({"code": "x", "msg": ""})));
    }

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:6806");
        assert!(config.token.is_none());
        assert_eq!(config.timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_url_join() {
        let client = SiyuanClient::new(ClientConfig {
            base_url: "http://localhost:6806/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.url("/api/system/version"),
            "http://localhost:6806/api/system/version"
        );
    }
}
