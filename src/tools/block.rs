//! Block tools
//!
//! Content blocks are addressed by ID. A document ID names the document's root block,
//! so most read operations accept either.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::api::NoteStore;
use crate::error::Result;

use super::{CallToolResult, Category, ToolCategory, ToolDescriptor, parse_args, unhandled};

static BLOCK_TOOLS: LazyLock<Vec<ToolDescriptor>> = LazyLock::new(|| {
    let data_type = json!({ "type": "string", "enum": ["markdown", "dom"], "description": "Data format" });
    let into_parent = json!({
        "type": "object",
        "properties": {
            "dataType": data_type,
            "data": { "type": "string", "description": "Block content" },
            "parentID": { "type": "string", "description": "Parent block ID (document ID can be used)" }
        },
        "required": ["dataType", "data", "parentID"]
    });
    let block_or_doc = json!({
        "type": "object",
        "properties": { "id": { "type": "string", "description": "Block ID or document ID" } },
        "required": ["id"]
    });
    let block_only = json!({
        "type": "object",
        "properties": { "id": { "type": "string", "description": "Block ID" } },
        "required": ["id"]
    });

    vec![
        ToolDescriptor::new(
            "insert_block",
            "Insert a new block at the specified position. Returns block ID in result.action.id. Note: Document ID can be used as block ID (document root block).",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "dataType": data_type,
                "data": { "type": "string", "description": "Block content" },
                "nextID": { "type": "string", "description": "Next block ID (optional)" },
                "previousID": { "type": "string", "description": "Previous block ID (optional)" },
                "parentID": { "type": "string", "description": "Parent block ID (optional)" }
            },
            "required": ["dataType", "data"]
        })),
        ToolDescriptor::new(
            "prepend_block",
            "Insert a block at the beginning of the parent's children. Returns block ID in result.action.id. parentID can be a document ID (document root block).",
        )
        .with_schema(into_parent.clone()),
        ToolDescriptor::new(
            "append_block",
            "Insert a block at the end of the parent's children. Returns block ID in result.action.id. parentID can be a document ID (document root block).",
        )
        .with_schema(into_parent),
        ToolDescriptor::new(
            "update_block",
            "Update an existing block's content. id should be a block ID (not document ID). Document root blocks may have limitations.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "dataType": data_type,
                "data": { "type": "string", "description": "New block content" },
                "id": { "type": "string", "description": "Block ID (not document ID)" }
            },
            "required": ["dataType", "data", "id"]
        })),
        ToolDescriptor::new(
            "delete_block",
            "Delete a block by block ID. Note: Cannot delete document root blocks.",
        )
        .with_schema(block_only.clone()),
        ToolDescriptor::new(
            "move_block",
            "Move a block to a new position. id should be a block ID (not document ID).",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Block ID to move" },
                "previousID": { "type": "string", "description": "Previous block ID (optional)" },
                "parentID": { "type": "string", "description": "New parent block ID (optional)" }
            },
            "required": ["id"]
        })),
        ToolDescriptor::new(
            "fold_block",
            "Fold a block (collapse its children). id can be a document ID (document root block) or block ID.",
        )
        .with_schema(block_or_doc.clone()),
        ToolDescriptor::new(
            "unfold_block",
            "Unfold a block (expand its children). id can be a document ID (document root block) or block ID.",
        )
        .with_schema(block_or_doc.clone()),
        ToolDescriptor::new(
            "get_block_kramdown",
            "Get the kramdown content of a block. id can be a document ID (document root block) or block ID.",
        )
        .with_schema(block_or_doc.clone()),
        ToolDescriptor::new(
            "get_child_blocks",
            "Get all child blocks of a parent block. id can be a document ID (document root block) or block ID.",
        )
        .with_schema(block_or_doc),
        ToolDescriptor::new(
            "transfer_block_ref",
            "Transfer block references from one block to another. Both fromID and toID should be block IDs.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "fromID": { "type": "string", "description": "Source block ID" },
                "toID": { "type": "string", "description": "Target block ID" },
                "refIDs": { "type": "array", "items": { "type": "string", "description": "Reference block IDs" } }
            },
            "required": ["fromID", "toID"]
        })),
        ToolDescriptor::new(
            "set_block_attrs",
            "Set attributes for a block. id should be a block ID (not document ID).",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Block ID" },
                "attrs": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Attributes object"
                }
            },
            "required": ["id", "attrs"]
        })),
        ToolDescriptor::new(
            "get_block_attrs",
            "Get attributes for a block. id should be a block ID (not document ID).",
        )
        .with_schema(block_only),
    ]
});

pub(crate) fn descriptors() -> &'static [ToolDescriptor] {
    &BLOCK_TOOLS
}

/// Content format of block data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DataType {
    Markdown,
    Dom,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertArgs {
    data_type: DataType,
    data: String,
    #[serde(rename = "nextID", skip_serializing_if = "Option::is_none")]
    next_id: Option<String>,
    #[serde(rename = "previousID", skip_serializing_if = "Option::is_none")]
    previous_id: Option<String>,
    #[serde(rename = "parentID", skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildArgs {
    data_type: DataType,
    data: String,
    #[serde(rename = "parentID")]
    parent_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateArgs {
    data_type: DataType,
    data: String,
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MoveArgs {
    id: String,
    #[serde(rename = "previousID", skip_serializing_if = "Option::is_none")]
    previous_id: Option<String>,
    #[serde(rename = "parentID", skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransferArgs {
    #[serde(rename = "fromID")]
    from_id: String,
    #[serde(rename = "toID")]
    to_id: String,
    #[serde(rename = "refIDs", skip_serializing_if = "Option::is_none")]
    ref_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SetAttrsArgs {
    id: String,
    attrs: BTreeMap<String, String>,
}

/// Registry for block editing tools
pub struct BlockTools;

#[async_trait]
impl ToolCategory for BlockTools {
    fn category(&self) -> Category {
        Category::Block
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
            "insert_block" => {
                let parsed: InsertArgs = parse_args(args)?;
                let result = store
                    .request("/api/block/insertBlock", serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "prepend_block" | "append_block" => {
                let parsed: ChildArgs = parse_args(args)?;
                let endpoint = if name == "prepend_block" {
                    "/api/block/prependBlock"
                } else {
                    "/api/block/appendBlock"
                };
                let result = store
                    .request(endpoint, serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "update_block" => {
                let parsed: UpdateArgs = parse_args(args)?;
                let result = store
                    .request("/api/block/updateBlock", serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "move_block" => {
                let parsed: MoveArgs = parse_args(args)?;
                let result = store
                    .request("/api/block/moveBlock", serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&result))
            }
            "delete_block" | "fold_block" | "unfold_block" => {
                let parsed: IdArgs = parse_args(args)?;
                let endpoint = match name {
                    "delete_block" => "/api/block/deleteBlock",
                    "fold_block" => "/api/block/foldBlock",
                    _ => "/api/block/unfoldBlock",
                };
                store.request(endpoint, json!({ "id": parsed.id })).await?;
                Ok(CallToolResult::json(
                    &json!({ "success": true, "id": parsed.id }),
                ))
            }
            "get_block_kramdown" | "get_child_blocks" | "get_block_attrs" => {
                let parsed: IdArgs = parse_args(args)?;
                let endpoint = match name {
                    "get_block_kramdown" => "/api/block/getBlockKramdown",
                    "get_child_blocks" => "/api/block/getChildBlocks",
                    _ => "/api/attr/getBlockAttrs",
                };
                let result = store.request(endpoint, json!({ "id": parsed.id })).await?;
                Ok(CallToolResult::json(&result))
            }
            "transfer_block_ref" => {
                let parsed: TransferArgs = parse_args(args)?;
                store
                    .request(
                        "/api/block/transferBlockRef",
                        serde_json::to_value(&parsed)?,
                    )
                    .await?;
                Ok(CallToolResult::json(&json!({
                    "success": true,
                    "fromID": parsed.from_id,
                    "toID": parsed.to_id,
                })))
            }
            "set_block_attrs" => {
                let parsed: SetAttrsArgs = parse_args(args)?;
                store
                    .request("/api/attr/setBlockAttrs", serde_json::to_value(&parsed)?)
                    .await?;
                Ok(CallToolResult::json(&json!({
                    "success": true,
                    "id": parsed.id,
                    "attrs": parsed.attrs,
                })))
            }
            _ => Err(unhandled(name)),
        }
    }
}
