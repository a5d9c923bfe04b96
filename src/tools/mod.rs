//! Tool System - per-category registries and the dispatching router
//!
//! Every tool belongs to exactly one [`Category`]. Each category is a [`ToolCategory`]
//! implementation holding a constant descriptor list and a call handler.

mod block;
mod definition;
mod document;
mod file;
mod notebook;
mod router;

pub use block::BlockTools;
pub use definition::{CallToolResult, Content, ToolDescriptor};
pub use document::DocumentTools;
pub use file::FileTools;
pub use notebook::NotebookTools;
pub use router::{HIGH_RISK_TOOLS, SERVER_INSTRUCTIONS, ToolRouter};

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::NoteStore;
use crate::error::{GatewayError, Result};

/// Functional grouping of tools, used for registry layout and coarse permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Notebook,
    Document,
    Block,
    File,
}

impl Category {
    /// All categories in dispatch order
    pub const ALL: [Category; 4] = [
        Category::Notebook,
        Category::Document,
        Category::Block,
        Category::File,
    ];

    /// Configuration key of this category
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Notebook => "notebook",
            Category::Document => "document",
            Category::Block => "block",
            Category::File => "file",
        }
    }

    /// Parse from a configuration key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category registry: constant tool catalog plus call handler
#[async_trait]
pub trait ToolCategory: Send + Sync {
    /// Category this registry serves
    fn category(&self) -> Category;

    /// Descriptors in declaration order
    fn tools(&self) -> &[ToolDescriptor];

    /// Run an owned tool. Only called for names this registry owns.
    async fn invoke(&self, store: &dyn NoteStore, name: &str, args: Value)
    -> Result<CallToolResult>;

    /// Whether `name` is one of this category's tools
    fn owns(&self, name: &str) -> bool {
        self.tools().iter().any(|t| t.name == name)
    }

    /// Call `name`, or `None` when this category does not own it.
    ///
    /// Validation and downstream failures come back as error-flagged results.
    async fn call(&self, store: &dyn NoteStore, name: &str, args: Value) -> Option<CallToolResult> {
        if !self.owns(name) {
            return None;
        }
        match self.invoke(store, name, args.clone()).await {
            Ok(result) => Some(result),
            Err(err) => {
                log::warn!("Tool '{}' failed: {}", name, err);
                Some(CallToolResult::failure(name, &err, &args))
            }
        }
    }
}

/// The four registries in dispatch order
pub fn registries() -> Vec<Box<dyn ToolCategory>> {
    vec![
        Box::new(NotebookTools),
        Box::new(DocumentTools),
        Box::new(BlockTools),
        Box::new(FileTools),
    ]
}

/// Names of every registered tool of `category`, in declaration order
pub fn tool_names(category: Category) -> Vec<&'static str> {
    let tools: &'static [ToolDescriptor] = match category {
        Category::Notebook => notebook::descriptors(),
        Category::Document => document::descriptors(),
        Category::Block => block::descriptors(),
        Category::File => file::descriptors(),
    };
    tools.iter().map(|t| t.name.as_str()).collect()
}

/// Category owning `name`, if any registry declares it
pub fn category_of(name: &str) -> Option<Category> {
    Category::ALL
        .into_iter()
        .find(|c| tool_names(*c).contains(&name))
}

/// Deserialize tool arguments into their typed shape.
///
/// Missing arguments are treated as an empty object.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| GatewayError::InvalidArguments(e.to_string()))
}

/// Error for a name the registry declares but has no handler arm for
pub(crate) fn unhandled(name: &str) -> GatewayError {
    GatewayError::Protocol(format!("No handler for tool: {}", name))
}
