//! Notebook tools

use std::sync::LazyLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::api::NoteStore;
use crate::error::Result;

use super::{CallToolResult, Category, ToolCategory, ToolDescriptor, parse_args, unhandled};

static NOTEBOOK_TOOLS: LazyLock<Vec<ToolDescriptor>> = LazyLock::new(|| {
    let notebook_only = json!({
        "type": "object",
        "properties": { "notebook": { "type": "string", "description": "Notebook ID" } },
        "required": ["notebook"]
    });

    vec![
        ToolDescriptor::new("list_notebooks", "List all notebooks in the workspace"),
        ToolDescriptor::new("create_notebook", "Create a new notebook").with_schema(json!({
            "type": "object",
            "properties": { "name": { "type": "string", "description": "Notebook name" } },
            "required": ["name"]
        })),
        ToolDescriptor::new("open_notebook", "Open a notebook").with_schema(notebook_only.clone()),
        ToolDescriptor::new("close_notebook", "Close a notebook").with_schema(notebook_only.clone()),
        ToolDescriptor::new("remove_notebook", "Remove a notebook")
            .with_schema(notebook_only.clone()),
        ToolDescriptor::new("rename_notebook", "Rename a notebook").with_schema(json!({
            "type": "object",
            "properties": {
                "notebook": { "type": "string", "description": "Notebook ID" },
                "name": { "type": "string", "description": "New notebook name" }
            },
            "required": ["notebook", "name"]
        })),
        ToolDescriptor::new("get_notebook_conf", "Get notebook configuration")
            .with_schema(notebook_only),
        ToolDescriptor::new("set_notebook_conf", "Set notebook configuration").with_schema(json!({
            "type": "object",
            "properties": {
                "notebook": { "type": "string", "description": "Notebook ID" },
                "conf": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "closed": { "type": "boolean" },
                        "refCreateSavePath": { "type": "string" },
                        "createDocNameTemplate": { "type": "string" },
                        "dailyNoteSavePath": { "type": "string" },
                        "dailyNoteTemplatePath": { "type": "string" }
                    }
                }
            },
            "required": ["notebook", "conf"]
        })),
    ]
});

pub(crate) fn descriptors() -> &'static [ToolDescriptor] {
    &NOTEBOOK_TOOLS
}

#[derive(Debug, Deserialize)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
struct NotebookArgs {
    notebook: String,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RenameArgs {
    notebook: String,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookConf {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_create_save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    create_doc_name_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    daily_note_save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    daily_note_template_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetConfArgs {
    notebook: String,
    conf: NotebookConf,
}

/// Registry for notebook management tools
pub struct NotebookTools;

#[async_trait]
impl ToolCategory for NotebookTools {
    fn category(&self) -> Category {
        Category::Notebook
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
            "list_notebooks" => {
                parse_args::<NoArgs>(args)?;
                let result = store.request("/api/notebook/lsNotebooks", Value::Null).await?;
                Ok(CallToolResult::json(&result["notebooks"]))
            }
            "create_notebook" => {
                let parsed: CreateArgs = parse_args(args)?;
                let result = store
                    .request("/api/notebook/createNotebook", json!({ "name": parsed.name }))
                    .await?;
                Ok(CallToolResult::json(&result["notebook"]))
            }
            "open_notebook" | "close_notebook" | "remove_notebook" => {
                let parsed: NotebookArgs = parse_args(args)?;
                let endpoint = match name {
                    "open_notebook" => "/api/notebook/openNotebook",
                    "close_notebook" => "/api/notebook/closeNotebook",
                    _ => "/api/notebook/removeNotebook",
                };
                store
                    .request(endpoint, json!({ "notebook": parsed.notebook }))
                    .await?;
                Ok(CallToolResult::json(
                    &json!({ "success": true, "notebook": parsed.notebook }),
                ))
            }
            "rename_notebook" => {
                let parsed: RenameArgs = parse_args(args)?;
                store
                    .request(
                        "/api/notebook/renameNotebook",
                        json!({ "notebook": parsed.notebook, "name": parsed.name }),
                    )
                    .await?;
                Ok(CallToolResult::json(&json!({
                    "success": true,
                    "notebook": parsed.notebook,
                    "name": parsed.name,
                })))
            }
            "get_notebook_conf" => {
                let parsed: NotebookArgs = parse_args(args)?;
                let result = store
                    .request(
                        "/api/notebook/getNotebookConf",
                        json!({ "notebook": parsed.notebook }),
                    )
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "set_notebook_conf" => {
                let parsed: SetConfArgs = parse_args(args)?;
                let result = store
                    .request(
                        "/api/notebook/setNotebookConf",
                        json!({ "notebook": parsed.notebook, "conf": parsed.conf }),
                    )
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            _ => Err(unhandled(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::RecordingStore;

    #[test]
    fn test_declaration_order() {
        let names: Vec<&str> = descriptors().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "list_notebooks",
                "create_notebook",
                "open_notebook",
                "close_notebook",
                "remove_notebook",
                "rename_notebook",
                "get_notebook_conf",
                "set_notebook_conf",
            ]
        );
    }

    #[tokio::test]
    async fn test_call_not_owned_returns_none() {
        let store = RecordingStore::new(Value::Null);
        let result = NotebookTools.call(&store, "delete_block", json!({})).await;
        assert!(result.is_none());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_notebooks_returns_notebooks_field() {
        let store = RecordingStore::new(json!({
            "notebooks": [{ "id": "20210817205410-2kvfpfn", "name": "Inbox" }]
        }));
        let result = NotebookTools
            .call(&store, "list_notebooks", json!({}))
            .await
            .unwrap();
        assert!(!result.is_error());
        let listed: Value = serde_json::from_str(&result.text_content()).unwrap();
        assert_eq!(listed[0]["name"], "Inbox");
        assert_eq!(store.calls()[0].0, "/api/notebook/lsNotebooks");
    }

    #[tokio::test]
    async fn test_rename_notebook_payload() {
        let store = RecordingStore::new(Value::Null);
        let result = NotebookTools
            .call(
                &store,
                "rename_notebook",
                json!({ "notebook": "nb1", "name": "Archive" }),
            )
            .await
            .unwrap();
        assert!(!result.is_error());
        let calls = store.calls();
        assert_eq!(calls[0].0, "/api/notebook/renameNotebook");
        assert_eq!(calls[0].1, json!({ "notebook": "nb1", "name": "Archive" }));
    }

    #[tokio::test]
    async fn test_set_notebook_conf_skips_unset_fields() {
        let store = RecordingStore::new(json!({ "name": "Inbox" }));
        NotebookTools
            .call(
                &store,
                "set_notebook_conf",
                json!({ "notebook": "nb1", "conf": { "dailyNoteSavePath": "/daily" } }),
            )
            .await
            .unwrap();
        let payload = &store.calls()[0].1;
        assert_eq!(payload["conf"], json!({ "dailyNoteSavePath": "/daily" }));
    }

    #[tokio::test]
    async fn test_missing_argument_is_error_result() {
        let store = RecordingStore::new(Value::Null);
        let result = NotebookTools
            .call(&store, "open_notebook", json!({}))
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.text_content().contains("notebook"));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_api_error_becomes_error_result() {
        let store = RecordingStore::failing(-1, "notebook not found");
        let result = NotebookTools
            .call(&store, "remove_notebook", json!({ "notebook": "missing" }))
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.text_content().contains("notebook not found"));
    }
}
