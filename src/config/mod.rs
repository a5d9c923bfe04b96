//! Configuration for the gateway.
//!
//! Two independent concerns:
//! 1. Gateway settings (note store URL, token, timeouts) from YAML plus environment
//! 2. Tool permissions, re-resolved from ranked sources on every request

pub use self::global::{ApiSettings, GatewaySettings, PROJECT_CONFIG_FILE};
pub use self::resolution::{ConfigResolver, ConfigSource};
pub use self::sources::{ConfigEnv, DATA_DIR_ENV_VAR, TOOLS_ENV_VAR};
pub use self::tool_config::{
    DEFAULT_DISABLED_TOOLS, Enablement, ToolConfig, ToolLevelConfig, default_tool_level_config,
};

mod global;
mod resolution;
mod sources;
mod tool_config;
