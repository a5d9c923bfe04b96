//! Error types for the gateway
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur inside the gateway and the supervisor
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The note store answered with a non-zero `code`
    #[error("SiYuan API error: {code} - {msg}")]
    Api { code: i64, msg: String },

    /// Transport-level HTTP failure (connection refused, bad status, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Outbound request exceeded the client timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Tool arguments did not match the declared input schema
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Operation not allowed in the current process state
    #[error("Invalid state: {0}")]
    StateConflict(String),

    /// Child process could not be spawned
    #[error("Spawn failed: {0}")]
    Spawn(String),

    /// Other supervisor failure
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    /// Protocol framing or message error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Diagnostic detail suitable for an error result payload, if any.
    pub fn details(&self) -> Option<String> {
        match self {
            GatewayError::Api { code, .. } => {
                Some(format!("code {}: {}", code, describe_api_code(*code)))
            }
            _ => None,
        }
    }
}

/// Human-readable description of a note-store response code.
pub fn describe_api_code(code: i64) -> &'static str {
    match code {
        0 => "Success",
        1 => "Invalid parameter",
        2 => "Unsupported operation",
        3 => "Data not found",
        4 => "Permission denied",
        5 => "Data conflict",
        6 => "Data validation failed",
        7 => "Internal server error",
        8 => "Database error",
        9 => "Network error",
        10 => "Timeout",
        11 => "Service unavailable",
        12 => "Authentication failed",
        13 => "Token expired",
        14 => "Rate limit exceeded",
        15 => "Resource not found",
        16 => "Resource already exists",
        17 => "Operation cancelled",
        18 => "Invalid data format",
        19 => "File system error",
        20 => "Storage quota exceeded",
        _ => "Unknown error",
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
