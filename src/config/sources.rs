//! Process environment consulted by the tool config resolver.

use std::env;
use std::path::PathBuf;

use crate::api::{PLUGIN_NAME, TOOLS_CONFIG_KEY};

/// Environment variable holding an inline tool config
pub const TOOLS_ENV_VAR: &str = "SIYUAN_MCP_TOOLS";

/// Environment variable pointing at the SiYuan workspace
pub const DATA_DIR_ENV_VAR: &str = "SIYUAN_DATA_DIR";

/// Snapshot of the environment inputs that can carry a tool config.
#[derive(Debug, Clone, Default)]
pub struct ConfigEnv {
    /// `SIYUAN_DATA_DIR`
    pub data_dir: Option<PathBuf>,
    /// `HOME`, or `USERPROFILE` when `HOME` is unset
    pub home_dir: Option<PathBuf>,
    /// `APPDATA`, only consulted on Windows
    pub app_data: Option<PathBuf>,
    /// Raw `SIYUAN_MCP_TOOLS` JSON
    pub tools_json: Option<String>,
    pub windows: bool,
}

impl ConfigEnv {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            data_dir: non_empty_var(DATA_DIR_ENV_VAR).map(PathBuf::from),
            home_dir: non_empty_var("HOME")
                .or_else(|| non_empty_var("USERPROFILE"))
                .map(PathBuf::from),
            app_data: non_empty_var("APPDATA").map(PathBuf::from),
            tools_json: non_empty_var(TOOLS_ENV_VAR),
            windows: cfg!(windows),
        }
    }

    /// File locations where the host may have persisted the tool config, most specific first.
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(data_dir) = &self.data_dir {
            paths.push(plugin_file(data_dir.join("data")));
            paths.push(plugin_file(data_dir.clone()));
        }

        if let Some(home) = &self.home_dir {
            paths.push(plugin_file(home.join("SiYuan").join("data")));
            paths.push(plugin_file(home.join(".siyuan").join("data")));
            if let (true, Some(app_data)) = (self.windows, &self.app_data) {
                paths.push(plugin_file(app_data.join("SiYuan").join("data")));
            }
        }

        paths
    }
}

/// `<data>/storage/petal/<plugin>/mcpToolsConfig`
fn plugin_file(data: PathBuf) -> PathBuf {
    data.join("storage")
        .join("petal")
        .join(PLUGIN_NAME)
        .join(TOOLS_CONFIG_KEY)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
