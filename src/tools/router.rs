//! Tool routing and execution
//!
//! [`ToolRouter`] answers "list tools" and "call tool" against the config in force at the
//! moment of the request. Nothing is cached between requests.

use std::sync::Arc;

use serde_json::Value;

use crate::api::NoteStore;
use crate::config::{ConfigResolver, ToolConfig};

use super::{CallToolResult, ToolCategory, ToolDescriptor, category_of, registries};

/// Tools the agent must confirm with the user before calling
pub const HIGH_RISK_TOOLS: [&str; 7] = [
    "remove_notebook",
    "remove_document",
    "remove_document_by_id",
    "delete_block",
    "move_documents",
    "move_documents_by_id",
    "move_block",
];

/// Advisory sent to the agent on `initialize`. Not enforced by the gateway.
pub const SERVER_INSTRUCTIONS: &str = "## 高危操作确认 (High-risk operations)

在调用以下工具**之前**，你必须先向用户明确说明将要执行的操作，并等待用户明确同意后再调用。未经用户确认不得直接调用。

Before calling any of the following tools, you MUST clearly describe the action to the user and wait for explicit confirmation. Do not call them without user confirmation.

**必须确认的高危工具 / Tools that require confirmation:**
- remove_notebook, remove_document, remove_document_by_id（删除笔记本/文档）
- delete_block（删除块）
- move_documents, move_documents_by_id, move_block（移动文档/块，可能影响结构）

流程：先说明「我将执行 X，是否继续？」→ 用户同意后再调用工具。
Flow: State \"I will do X. Proceed?\" → only call the tool after user confirms.

使用 append_block 工具时，请注意：如果parentID为文档ID，则会在文档开头添加块；如果parentID为块ID，则会在块末尾添加块。
When using append_block: a document ID as parentID adds the block at the start of the document; a block ID as parentID adds it at the end of that block.";

/// One `(membership predicate, handler)` pair, built per request
struct Route<'a> {
    config: &'a ToolConfig,
    registry: &'a dyn ToolCategory,
}

impl Route<'_> {
    fn accepts(&self, name: &str) -> bool {
        self.config.allows(self.registry.category(), name)
    }
}

/// Dispatcher combining the resolved config with the category registries
pub struct ToolRouter {
    resolver: ConfigResolver,
    store: Arc<dyn NoteStore>,
    registries: Vec<Box<dyn ToolCategory>>,
}

impl ToolRouter {
    /// Create a router over the four standard registries
    pub fn new(resolver: ConfigResolver, store: Arc<dyn NoteStore>) -> Self {
        Self {
            resolver,
            store,
            registries: registries(),
        }
    }

    /// Resolver consulted on every request
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Currently enabled tools, category order then declaration order
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let config = self.resolver.resolve().await;
        self.enabled_tools(&config)
    }

    /// Tools enabled under `config`
    pub fn enabled_tools(&self, config: &ToolConfig) -> Vec<ToolDescriptor> {
        self.registries
            .iter()
            .flat_map(|registry| {
                let category = registry.category();
                registry
                    .tools()
                    .iter()
                    .filter(move |tool| config.allows(category, &tool.name))
            })
            .cloned()
            .collect()
    }

    /// Call `name` with `args` if the current config allows it.
    ///
    /// Always produces a result; refusals and failures come back error-flagged.
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        let config = self.resolver.resolve().await;
        let routes = self.routes(&config);

        for route in &routes {
            if !route.accepts(name) {
                continue;
            }
            if let Some(result) = route.registry.call(self.store.as_ref(), name, args.clone()).await {
                log::debug!(
                    "Tool '{}' handled by {} registry (error: {})",
                    name,
                    route.registry.category(),
                    result.is_error()
                );
                return result;
            }
        }

        match category_of(name) {
            Some(category) => {
                log::info!("Refusing tool '{}': {} tools restricted", name, category);
                CallToolResult::error(format!(
                    "Tool '{}' is unavailable: disabled by the current tool configuration",
                    name
                ))
            }
            None => {
                log::warn!("Unknown tool requested: {}", name);
                CallToolResult::error(format!("Unknown tool: {}", name))
            }
        }
    }

    fn routes<'a>(&'a self, config: &'a ToolConfig) -> Vec<Route<'a>> {
        self.registries
            .iter()
            .filter(|registry| config.get(registry.category()).is_enabled())
            .map(|registry| Route {
                config,
                registry: registry.as_ref(),
            })
            .collect()
    }
}
