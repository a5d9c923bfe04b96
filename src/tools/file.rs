//! File, template, export, notification and system tools

use std::sync::LazyLock;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::api::NoteStore;
use crate::error::{GatewayError, Result};

use super::{CallToolResult, Category, ToolCategory, ToolDescriptor, parse_args, unhandled};

static FILE_TOOLS: LazyLock<Vec<ToolDescriptor>> = LazyLock::new(|| {
    let message = json!({
        "type": "object",
        "properties": { "msg": { "type": "string" }, "timeout": { "type": "number" } },
        "required": ["msg"]
    });

    vec![
        ToolDescriptor::new(
            "upload_asset",
            "Upload a file asset to the specified assets directory",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "assetsDirPath": { "type": "string" },
                "file": { "type": "string" },
                "fileName": { "type": "string" }
            },
            "required": ["assetsDirPath", "file", "fileName"]
        })),
        ToolDescriptor::new("render_template", "Render a template with document context")
            .with_schema(json!({
                "type": "object",
                "properties": { "id": { "type": "string" }, "path": { "type": "string" } },
                "required": ["id", "path"]
            })),
        ToolDescriptor::new("render_sprig", "Render a Sprig template").with_schema(json!({
            "type": "object",
            "properties": { "template": { "type": "string" } },
            "required": ["template"]
        })),
        ToolDescriptor::new("export_md_content", "Export document content as Markdown")
            .with_schema(json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"]
            })),
        ToolDescriptor::new(
            "export_resources",
            "Export resources (files) as a ZIP archive",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "paths": { "type": "array", "items": { "type": "string" } },
                "name": { "type": "string" }
            },
            "required": ["paths"]
        })),
        ToolDescriptor::new("push_msg", "Push a notification message").with_schema(message.clone()),
        ToolDescriptor::new("push_err_msg", "Push an error notification message")
            .with_schema(message),
        ToolDescriptor::new("get_version", "Get the SiYuan system version"),
        ToolDescriptor::new(
            "get_current_time",
            "Get the current system time (Unix timestamp in milliseconds)",
        ),
    ]
});

pub(crate) fn descriptors() -> &'static [ToolDescriptor] {
    &FILE_TOOLS
}

#[derive(Debug, Deserialize)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadArgs {
    assets_dir_path: String,
    /// Base64-encoded file content
    file: String,
    file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RenderTemplateArgs {
    id: String,
    path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RenderSprigArgs {
    template: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportMdArgs {
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportResourcesArgs {
    paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PushMsgArgs {
    msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<f64>,
}

/// Decode an asset payload
fn decode_asset(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| GatewayError::InvalidArguments(format!("file is not valid base64: {}", e)))
}

/// Registry for file, export and system tools
pub struct FileTools;

#[async_trait]
impl ToolCategory for FileTools {
    fn category(&self) -> Category {
        Category::File
    }

    fn tools(&self) -> &[ToolDescriptor] {
        descriptors()
    }

    async fn invoke(
        &self,
        store: &dyn NoteStore,
        name: &str,
        args: Value,
    ) -> Result<CallToolResult> {
        match name {
            "upload_asset" => {
                let parsed: UploadArgs = parse_args(args)?;
                let bytes = decode_asset(&parsed.file)?;
                let result = store
                    .upload_asset(&parsed.assets_dir_path, &parsed.file_name, bytes)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "render_template" => {
                let parsed: RenderTemplateArgs = parse_args(args)?;
                let result = store
                    .request("/api/template/render", serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "render_sprig" => {
                let parsed: RenderSprigArgs = parse_args(args)?;
                let result = store
                    .request("/api/template/renderSprig", serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "export_md_content" => {
                let parsed: ExportMdArgs = parse_args(args)?;
                let result = store
                    .request("/api/export/exportMdContent", serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "export_resources" => {
                let parsed: ExportResourcesArgs = parse_args(args)?;
                let result = store
                    .request("/api/export/exportResources", serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "push_msg" | "push_err_msg" => {
                let parsed: PushMsgArgs = parse_args(args)?;
                let endpoint = if name == "push_msg" {
                    "/api/notification/pushMsg"
                } else {
                    "/api/notification/pushErrMsg"
                };
                let result = store
                    .request(endpoint, serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "get_version" => {
                parse_args::<NoArgs>(args)?;
                let version = store.request("/api/system/version", Value::Null).await?;
                Ok(CallToolResult::json(&json!({ "version": version })))
            }
            "get_current_time" => {
                parse_args::<NoArgs>(args)?;
                let now = store.request("/api/system/currentTime", Value::Null).await?;
                Ok(CallToolResult::json(&json!({ "currentTime": now })))
            }
            _ => Err(unhandled(name)),
        }
    }
}
