//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: run the MCP server on stdin/stdout (default)
//! - tools: list the tools enabled right now
//! - config: show, seed or clear the tool configuration
//! - supervise: run a command under the lifecycle supervisor

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// siyuan-mcp - MCP tool gateway for the SiYuan note store
#[derive(Parser, Debug)]
#[command(name = "siyuan-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional settings file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve MCP over stdin/stdout
    Serve,

    /// List the currently enabled tools
    Tools {
        /// Also list disabled tools
        #[arg(short, long)]
        all: bool,
    },

    /// Tool configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run a command under the lifecycle supervisor until it exits or Ctrl-C
    Supervise {
        /// Command and arguments to run
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
}

/// Tool configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Show the resolved tool configuration and where it came from
    Show,

    /// Store the default per-tool switches in host storage if none exist
    Init,

    /// Remove the stored per-tool switches from host storage
    Reset,
}
