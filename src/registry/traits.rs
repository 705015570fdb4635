//! Handler set interfaces.
//!
//! Implementations never see the transport or the handshake; everything they
//! return flows back through the dispatcher.

use crate::error::{ResourceError, ToolError};
use crate::protocol::{CallToolResult, ResourceContents, Tool};
use async_trait::async_trait;
use serde_json::Value;

/// Executes one named tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Name, description and input schema. Called once at registration.
    fn definition(&self) -> Tool;

    /// Run the tool with arguments that already passed schema validation.
    ///
    /// Return [`ToolError::Domain`] for failures the calling model should read
    /// (bad city, upstream API down). Other variants become protocol errors.
    async fn call(&self, arguments: Value) -> Result<CallToolResult, ToolError>;
}

/// Reads resource contents by uri.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read(&self, uri: &str) -> Result<ResourceContents, ResourceError>;
}
