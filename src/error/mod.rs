//! Error types for the MCP runtime.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` conversions.
//! Two tiers matter here: [`ProtocolError`] becomes a JSON-RPC error message on the
//! wire, while [`ToolError::Domain`] stays in-band as a tool result with `isError`.

use crate::protocol::types::JsonRpcError;
use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;

/// Main error type for the MCP runtime.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session failed: {reason}")]
    SessionFailed { reason: Cow<'static, str> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: Cow<'static, str> },
}

/// JSON-RPC 2.0 and MCP protocol errors.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("Parse error: invalid JSON")]
    ParseError,

    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(Cow<'static, str>),

    #[error("Internal error: {0}")]
    InternalError(Cow<'static, str>),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
}

impl ProtocolError {
    /// Returns the JSON-RPC 2.0 error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::InternalError(_) => -32603,
            Self::ResourceNotFound(_) => -32002,
        }
    }

    /// Structured details attached to the wire error, if any.
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::ResourceNotFound(uri) => Some(serde_json::json!({ "uri": uri })),
            _ => None,
        }
    }

    /// Convert to a JSON-RPC error object.
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        let error = JsonRpcError::new(self.code(), self.to_string());
        match self.data() {
            Some(data) => error.with_data(data),
            None => error,
        }
    }
}

/// Capability registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input schema for tool {name}: {message}")]
    InvalidSchema { name: String, message: String },
}

/// Tool execution errors.
///
/// `Domain` failures are meant for the calling model and are reported as a normal
/// result with `isError: true`. Everything else becomes a protocol error.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Domain(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Internal failure: {0}")]
    Internal(String),
}

/// Resource read errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Read failed: {0}")]
    Internal(String),
}

/// Transport-level errors. Frame errors drop one frame; the rest end the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    Closed,

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Frame is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
}

impl TransportError {
    /// Whether only the current frame was lost and the stream is still usable.
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::InvalidUtf8 { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(Cow<'static, str>),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },
}

/// Result type alias for McpError.
pub type Result<T> = std::result::Result<T, McpError>;

/// Result type alias for ProtocolError.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
