//! Model Context Protocol server runtime.
//!
//! Frames JSON-RPC 2.0 messages over stdio or TCP, drives the MCP
//! initialization handshake per session, and dispatches resource and tool
//! requests to handlers registered in a [`CapabilityRegistry`].
//!
//! # Example
//!
//! ```no_run
//! use mcp_runtime::{
//!     config::ServerConfig,
//!     handlers,
//!     protocol::McpServerBuilder,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Register the demo weather tools and resources
//!     let registry = handlers::create_registry()?;
//!
//!     let server = McpServerBuilder::new()
//!         .registry(registry)
//!         .config(ServerConfig::default())
//!         .build()?;
//!
//!     // One session over stdin/stdout
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod server;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{McpError, ProtocolError, ResourceError, Result, ToolError};
pub use protocol::{Dispatcher, HandshakeCoordinator, McpServer, McpServerBuilder, SessionState};
pub use registry::{CapabilityRegistry, ResourceReader, ToolExecutor};
pub use server::Session;
