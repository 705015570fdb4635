//! MCP protocol implementation over JSON-RPC 2.0.

pub mod codec;
pub mod handler;
pub mod handshake;
pub mod server;
pub mod transport;
pub mod types;

pub use codec::{DecodeError, decode, encode};
pub use handler::Dispatcher;
pub use handshake::{HandshakeCoordinator, Negotiated, SessionState};
pub use server::{McpServer, McpServerBuilder};
pub use transport::{StdioTransport, StreamTransport, TcpTransport, Transport};
pub use types::*;
