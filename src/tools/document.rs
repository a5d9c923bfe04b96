//! Document (file tree) tools

use std::sync::LazyLock;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::NoteStore;
use crate::error::Result;

use super::{CallToolResult, Category, ToolCategory, ToolDescriptor, parse_args, unhandled};

static DOCUMENT_TOOLS: LazyLock<Vec<ToolDescriptor>> = LazyLock::new(|| {
    let doc_id = json!({
        "type": "object",
        "properties": { "id": { "type": "string", "description": "Document ID" } },
        "required": ["id"]
    });
    let notebook_and_path = json!({
        "type": "object",
        "properties": {
            "notebook": { "type": "string", "description": "Notebook ID" },
            "path": { "type": "string", "description": "Storage path (e.g., /20210902210113-0avi12f.sy)" }
        },
        "required": ["notebook", "path"]
    });

    vec![
        ToolDescriptor::new(
            "create_document",
            "Create a new document with markdown content. Returns document ID. Path should start with / and use storage path format (e.g., /foo/bar).",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "notebook": { "type": "string", "description": "Notebook ID" },
                "path": { "type": "string", "description": "Storage path, must start with / (e.g., /foo/bar)" },
                "markdown": { "type": "string", "description": "Markdown content" }
            },
            "required": ["notebook", "path", "markdown"]
        })),
        ToolDescriptor::new(
            "rename_document",
            "Rename a document by storage path. Path should be storage path format (e.g., /20210902210113-0avi12f.sy).",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "notebook": { "type": "string", "description": "Notebook ID" },
                "path": { "type": "string", "description": "Storage path (e.g., /20210902210113-0avi12f.sy)" },
                "title": { "type": "string", "description": "New document title" }
            },
            "required": ["notebook", "path", "title"]
        })),
        ToolDescriptor::new("rename_document_by_id", "Rename a document by document ID").with_schema(
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Document ID" },
                    "title": { "type": "string", "description": "New document title" }
                },
                "required": ["id", "title"]
            }),
        ),
        ToolDescriptor::new(
            "remove_document",
            "Remove a document by storage path. Path should be storage path format (e.g., /20210902210113-0avi12f.sy).",
        )
        .with_schema(notebook_and_path.clone()),
        ToolDescriptor::new("remove_document_by_id", "Remove a document by document ID")
            .with_schema(doc_id.clone()),
        ToolDescriptor::new(
            "move_documents",
            "Move multiple documents to a new location. fromPaths should be storage paths (e.g., /20210902210113-0avi12f.sy).",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "fromPaths": { "type": "array", "items": { "type": "string", "description": "Storage paths" } },
                "toNotebook": { "type": "string", "description": "Target notebook ID" },
                "toPath": { "type": "string", "description": "Target storage path" }
            },
            "required": ["fromPaths", "toNotebook", "toPath"]
        })),
        ToolDescriptor::new(
            "move_documents_by_id",
            "Move multiple documents by document ID. toID can be a document ID or notebook ID.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "fromIDs": { "type": "array", "items": { "type": "string", "description": "Document IDs" } },
                "toID": { "type": "string", "description": "Target document ID or notebook ID" }
            },
            "required": ["fromIDs", "toID"]
        })),
        ToolDescriptor::new(
            "get_document_path",
            "Get storage path by document ID. Returns notebook ID and storage path.",
        )
        .with_schema(doc_id.clone()),
        ToolDescriptor::new(
            "get_hpath_by_path",
            "Get hierarchical (human-readable) path by storage path. Path should be storage path format (e.g., /20210902210113-0avi12f.sy).",
        )
        .with_schema(notebook_and_path),
        ToolDescriptor::new(
            "get_hpath_by_id",
            "Get hierarchical (human-readable) path by document ID",
        )
        .with_schema(doc_id),
        ToolDescriptor::new(
            "get_ids_by_hpath",
            "Get document IDs by hierarchical (human-readable) path. Path should be human-readable format (e.g., /foo/bar).",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Human-readable path (e.g., /foo/bar)" },
                "notebook": { "type": "string", "description": "Notebook ID" }
            },
            "required": ["path", "notebook"]
        })),
    ]
});

pub(crate) fn descriptors() -> &'static [ToolDescriptor] {
    &DOCUMENT_TOOLS
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    notebook: String,
    path: String,
    markdown: String,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    notebook: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct RenameArgs {
    notebook: String,
    path: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RenameByIdArgs {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveArgs {
    from_paths: Vec<String>,
    to_notebook: String,
    to_path: String,
}

#[derive(Debug, Deserialize)]
struct MoveByIdArgs {
    #[serde(rename = "fromIDs")]
    from_ids: Vec<String>,
    #[serde(rename = "toID")]
    to_id: String,
}

/// Registry for document tree tools
pub struct DocumentTools;

#[async_trait]
impl ToolCategory for DocumentTools {
    fn category(&self) -> Category {
        Category::Document
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
            "create_document" => {
                let parsed: CreateArgs = parse_args(args)?;
                let id = store
                    .request(
                        "/api/filetree/createDocWithMd",
                        json!({
                            "notebook": parsed.notebook,
                            "path": parsed.path,
                            "markdown": parsed.markdown,
                        }),
                    )
                    .await?;
                Ok(CallToolResult::json(&json!({
                    "success": true,
                    "notebook": parsed.notebook,
                    "path": parsed.path,
                    "id": id,
                })))
            }
            "rename_document" => {
                let parsed: RenameArgs = parse_args(args)?;
                let payload = json!({
                    "notebook": parsed.notebook,
                    "path": parsed.path,
                    "title": parsed.title,
                });
                store.request("/api/filetree/renameDoc", payload.clone()).await?;
                Ok(success_with(payload))
            }
            "rename_document_by_id" => {
                let parsed: RenameByIdArgs = parse_args(args)?;
                let payload = json!({ "id": parsed.id, "title": parsed.title });
                store
                    .request("/api/filetree/renameDocByID", payload.clone())
                    .await?;
                Ok(success_with(payload))
            }
            "remove_document" => {
                let parsed: PathArgs = parse_args(args)?;
                let payload = json!({ "notebook": parsed.notebook, "path": parsed.path });
                store.request("/api/filetree/removeDoc", payload.clone()).await?;
                Ok(success_with(payload))
            }
            "remove_document_by_id" => {
                let parsed: IdArgs = parse_args(args)?;
                let payload = json!({ "id": parsed.id });
                store
                    .request("/api/filetree/removeDocByID", payload.clone())
                    .await?;
                Ok(success_with(payload))
            }
            "move_documents" => {
                let parsed: MoveArgs = parse_args(args)?;
                let payload = json!({
                    "fromPaths": parsed.from_paths,
                    "toNotebook": parsed.to_notebook,
                    "toPath": parsed.to_path,
                });
                store.request("/api/filetree/moveDocs", payload.clone()).await?;
                Ok(success_with(payload))
            }
            "move_documents_by_id" => {
                let parsed: MoveByIdArgs = parse_args(args)?;
                let payload = json!({ "fromIDs": parsed.from_ids, "toID": parsed.to_id });
                store
                    .request("/api/filetree/moveDocsByID", payload.clone())
                    .await?;
                Ok(success_with(payload))
            }
            "get_document_path" => {
                let parsed: IdArgs = parse_args(args)?;
                let result = store
                    .request("/api/filetree/getPathByID", json!({ "id": parsed.id }))
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "get_hpath_by_path" => {
                let parsed: PathArgs = parse_args(args)?;
                let result = store
                    .request(
                        "/api/filetree/getHPathByPath",
                        json!({ "notebook": parsed.notebook, "path": parsed.path }),
                    )
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "get_hpath_by_id" => {
                let parsed: IdArgs = parse_args(args)?;
                let result = store
                    .request("/api/filetree/getHPathByID", json!({ "id": parsed.id }))
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "get_ids_by_hpath" => {
                let parsed: PathArgs = parse_args(args)?;
                let result = store
                    .request(
                        "/api/filetree/getIDsByHPath",
                        json!({ "path": parsed.path, "notebook": parsed.notebook }),
                    )
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            _ => Err(unhandled(name)),
        }
    }
}

/// `{"success": true, ...payload}` acknowledgement for calls that return no data
fn success_with(payload: Value) -> CallToolResult {
    let mut body = json!({ "success": true });
    if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), payload) {
        target.extend(fields);
    }
    CallToolResult::json(&body)
}
