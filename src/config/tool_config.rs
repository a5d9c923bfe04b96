//! Category-level tool permissions.
//!
//! A [`ToolConfig`] maps each [`Category`] to an [`Enablement`]. On the wire each category is
//! `true`, `false`, or an explicit list of tool names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::{Category, tool_names};

/// Per-tool switches as persisted by the host, `{"list_notebooks": true, ...}`.
pub type ToolLevelConfig = Map<String, Value>;

/// Tools the host leaves off until the user opts in.
pub const DEFAULT_DISABLED_TOOLS: [&str; 4] = [
    "remove_notebook",
    "remove_document",
    "remove_document_by_id",
    "delete_block",
];

/// How much of a category is enabled.
///
/// Decoding never fails: `true` enables everything, a list keeps its string entries, and any
/// other value (`false`, `null`, strings, numbers) disables the category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "RawEnablement")]
pub enum Enablement {
    /// Every tool of the category
    All,
    /// No tool of the category
    Disabled,
    /// Only the named tools; never empty
    Only(Vec<String>),
}

impl Enablement {
    fn disabled() -> Self {
        Enablement::Disabled
    }

    /// Whether any tool of the category can be listed or called.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Enablement::Disabled)
    }

    /// Whether `name` passes this category's filter.
    pub fn allows(&self, name: &str) -> bool {
        match self {
            Enablement::All => true,
            Enablement::Disabled => false,
            Enablement::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum RawEnablement {
    Flag(bool),
    Names(Vec<String>),
}

impl From<Value> for Enablement {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(true) => Enablement::All,
            Value::Array(items) => {
                let names: Vec<String> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(name) => Some(name),
                        _ => None,
                    })
                    .collect();
                if names.is_empty() {
                    Enablement::Disabled
                } else {
                    Enablement::Only(names)
                }
            }
            _ => Enablement::Disabled,
        }
    }
}

impl From<Enablement> for RawEnablement {
    fn from(enablement: Enablement) -> Self {
        match enablement {
            Enablement::All => RawEnablement::Flag(true),
            Enablement::Disabled => RawEnablement::Flag(false),
            Enablement::Only(names) => RawEnablement::Names(names),
        }
    }
}

/// Category → enablement mapping.
///
/// When deserialized, a category missing from the input is disabled. The [`Default`] value
/// enables everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "Enablement::disabled")]
    pub notebook: Enablement,
    #[serde(default = "Enablement::disabled")]
    pub document: Enablement,
    #[serde(default = "Enablement::disabled")]
    pub block: Enablement,
    #[serde(default = "Enablement::disabled")]
    pub file: Enablement,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            notebook: Enablement::All,
            document: Enablement::All,
            block: Enablement::All,
            file: Enablement::All,
        }
    }
}

impl ToolConfig {
    /// Enablement of one category.
    pub fn get(&self, category: Category) -> &Enablement {
        match category {
            Category::Notebook => &self.notebook,
            Category::Document => &self.document,
            Category::Block => &self.block,
            Category::File => &self.file,
        }
    }

    fn get_mut(&mut self, category: Category) -> &mut Enablement {
        match category {
            Category::Notebook => &mut self.notebook,
            Category::Document => &mut self.document,
            Category::Block => &mut self.block,
            Category::File => &mut self.file,
        }
    }

    /// Whether `name` of `category` may be listed and called.
    pub fn allows(&self, category: Category, name: &str) -> bool {
        self.get(category).allows(name)
    }

    /// Translate per-tool switches into category enablement.
    ///
    /// Each category becomes the list of its registered tools switched on, in declaration
    /// order, or `Disabled` when none are. Names no registry declares are dropped, and only
    /// a literal `true` switches a tool on.
    pub fn from_tool_level(switches: &ToolLevelConfig) -> Self {
        let mut config = Self::default();
        for category in Category::ALL {
            let enabled: Vec<String> = tool_names(category)
                .into_iter()
                .filter(|name| switches.get(*name).and_then(Value::as_bool) == Some(true))
                .map(str::to_string)
                .collect();
            *config.get_mut(category) = if enabled.is_empty() {
                Enablement::Disabled
            } else {
                Enablement::Only(enabled)
            };
        }
        config
    }

    /// Whether a JSON object looks like a category-level config rather than per-tool switches.
    pub fn is_category_shaped(object: &Map<String, Value>) -> bool {
        object.keys().any(|key| Category::from_key(key).is_some())
    }
}

/// Per-tool switches written by `config init`: everything on except the destructive removals.
pub fn default_tool_level_config() -> ToolLevelConfig {
    Category::ALL
        .into_iter()
        .flat_map(tool_names)
        .map(|name| {
            let enabled = !DEFAULT_DISABLED_TOOLS.contains(&name);
            (name.to_string(), Value::Bool(enabled))
        })
        .collect()
}
