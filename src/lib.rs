//! siyuan-mcp - MCP tool gateway for the SiYuan note store
//!
//! Exposes SiYuan notebook, document, block and file operations as MCP tools over stdio.
//! Which tools are visible is decided per request from the highest-ranked config source, and a
//! lifecycle supervisor lets a parent application run the gateway as a child process.

pub mod api;
pub mod config;
pub mod error;
pub mod protocol;
pub mod supervisor;
pub mod tools;

pub use error::{GatewayError, Result};
