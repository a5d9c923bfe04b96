//! MCP transport - JSON-RPC 2.0 over newline-delimited stdio
//!
//! This module provides:
//! - Message types for requests, responses and errors
//! - The session server that delegates tool methods to the router

pub mod messages;
mod server;

pub use messages::{CallToolParams, ErrorCode, Methods, Request, Response, RpcError};
pub use server::{McpServer, SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS, panic_message};
