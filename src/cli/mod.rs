//! CLI module for siyuan-mcp - command-line interface and subcommands.
//!
//! Serving over stdio is the default; the other subcommands inspect and seed the tool
//! configuration or run a child under the supervisor.

pub mod commands;

pub use commands::Cli;
