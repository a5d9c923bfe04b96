//! Tool descriptors and call results
//!
//! The two shapes that cross the protocol boundary: what a tool looks like when listed,
//! and what a tool call returns.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::GatewayError;

/// A tool as advertised to the agent client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name (unique across the gateway)
    pub name: String,
    /// Human-readable description for the agent
    pub description: String,
    /// JSON schema for input parameters
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Create a new descriptor with an empty object schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    /// Set input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// One part of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

/// Result of a tool call, successful or error-flagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Successful plain-text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: None,
        }
    }

    /// Successful result carrying pretty-printed JSON
    pub fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }

    /// Error-flagged plain-text result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text {
                text: message.into(),
            }],
            is_error: Some(true),
        }
    }

    /// Error-flagged result describing a failed call of `tool`
    pub fn failure(tool: &str, err: &GatewayError, args: &Value) -> Self {
        let mut body = json!({
            "error": err.to_string(),
            "tool": tool,
            "args": args,
        });
        if let Some(details) = err.details() {
            body["details"] = json!(details);
        }
        let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| err.to_string());
        Self::error(text)
    }

    /// Whether this result is error-flagged
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// Concatenated text of all content parts
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                Content::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_new() {
        let tool = ToolDescriptor::new("list_notebooks", "List all notebooks");
        assert_eq!(tool.name, "list_notebooks");
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let tool = ToolDescriptor::new("delete_block", "Delete a block").with_schema(json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        }));
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(value["inputSchema"]["required"][0], "id");
        assert!(value.get("input_schema").is_none());
    }

    #[test]
    fn test_text_result_has_no_error_flag() {
        let result = CallToolResult::text("ok");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "ok");
        assert!(value.get("isError").is_none());
        assert!(!result.is_error());
    }

    #[test]
    fn test_error_result_flagged() {
        let result = CallToolResult::error("Unknown tool: nope");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["isError"], true);
        assert!(result.is_error());
        assert_eq!(result.text_content(), "Unknown tool: nope");
    }

    #[test]
    fn test_failure_includes_details() {
        let err = GatewayError::Api {
            code: 3,
            msg: "block not found".into(),
        };
        let result = CallToolResult::failure("get_block_kramdown", &err, &json!({"id": "x"}));
        assert!(result.is_error());
        let body: Value = serde_json::from_str(&result.text_content()).unwrap();
        assert_eq!(body["tool"], "get_block_kramdown");
        assert_eq!(body["args"]["id"], "x");
        assert_eq!(body["details"], "code 3: Data not found");
        assert!(body["error"].as_str().unwrap().contains("block not found"));
    }

    #[test]
    fn test_failure_without_details() {
        let err = GatewayError::InvalidArguments("missing field `id`".into());
        let result = CallToolResult::failure("delete_block", &err, &json!({}));
        let body: Value = serde_json::from_str(&result.text_content()).unwrap();
        assert!(body.get("details").is_none());
    }
}
