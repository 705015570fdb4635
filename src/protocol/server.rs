//! MCP server with session lifecycle management.

use crate::config::ServerConfig;
use crate::error::{McpError, Result};
use crate::protocol::codec;
use crate::protocol::handler::Dispatcher;
use crate::protocol::handshake::SessionState;
use crate::protocol::transport::{StdioTransport, TcpTransport, Transport};
use crate::protocol::types::*;
use crate::registry::CapabilityRegistry;
use crate::server::Session;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// MCP Server. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct McpServer {
    info: ServerInfo,
    config: ServerConfig,
    registry: Arc<CapabilityRegistry>,
}

impl McpServer {
    pub fn new(registry: CapabilityRegistry, config: ServerConfig) -> Self {
        Self {
            info: ServerInfo {
                name: config.name.to_string(),
                version: config.version.to_string(),
            },
            config,
            registry: Arc::new(registry),
        }
    }

    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Create a fresh session bound to this server's registry.
    pub fn session(&self) -> Arc<Session> {
        Arc::new(Session::new(
            self.registry.capabilities(),
            self.config.max_concurrent_requests,
        ))
    }

    /// Run one session over stdio.
    #[instrument(skip(self), fields(server = %self.info.name))]
    pub async fn run(&self) -> Result<()> {
        let transport =
            Arc::new(StdioTransport::stdio().with_max_frame_bytes(self.config.max_frame_bytes));
        self.run_with_transport(transport).await
    }

    /// Run one session over a custom transport.
    pub async fn run_with_transport<T>(&self, transport: Arc<T>) -> Result<()>
    where
        T: Transport + 'static,
    {
        self.run_session(self.session(), transport).await
    }

    /// Accept TCP connections, one independent session each.
    pub async fn serve_tcp(&self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);
        self.serve_listener(listener).await
    }

    pub async fn serve_listener(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let transport = Arc::new(
                TcpTransport::tcp(stream).with_max_frame_bytes(self.config.max_frame_bytes),
            );
            let server = self.clone();
            let session = self.session();
            let span = info_span!("session", id = session.id(), %peer);

            tokio::spawn(
                async move {
                    info!("Host connected");
                    match server.run_session(session, transport).await {
                        Ok(()) => info!("Host disconnected"),
                        Err(e) => warn!("Session ended with error: {}", e),
                    }
                }
                .instrument(span),
            );
        }
    }

    /// Drive `session` until the transport closes, the session is closed from
    /// outside, or the handshake fails.
    pub async fn run_session<T: Transport + 'static>(
        &self,
        session: Arc<Session>,
        transport: Arc<T>,
    ) -> Result<()> {
        info!(
            "Starting MCP session {}: {} v{}",
            session.id(),
            self.info.name,
            self.info.version
        );
        session.handshake().open();

        let dispatcher = Arc::new(
            Dispatcher::new(
                Arc::clone(&self.registry),
                Arc::clone(session.handshake()),
                self.info.clone(),
            )
            .with_instructions(self.config.instructions.clone())
            .with_handler_timeout(self.config.handler_timeout),
        );

        let mut closed = session.closed_signal();
        let outcome = loop {
            if session.is_closed() {
                debug!("Session closed from outside");
                break Ok(());
            }

            let frame = tokio::select! {
                frame = transport.read_frame() => frame,
                _ = closed.changed() => continue,
            };

            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("EOF received, closing session");
                    break Ok(());
                }
                Err(e) if e.is_frame_error() => continue,
                Err(e) => {
                    error!("Transport error: {}", e);
                    break Err(McpError::from(e));
                }
            };

            let message = match codec::decode(&frame) {
                Ok(message) => message,
                Err(e) => {
                    match e.to_reply() {
                        Some(reply) => {
                            warn!("Rejected frame: {}", e);
                            if let Err(e) = transport.write_message(&Message::Error(reply)).await {
                                error!("Failed to send error response: {}", e);
                                break Err(e.into());
                            }
                        }
                        None => warn!("Dropping frame without recoverable id: {}", e),
                    }
                    continue;
                }
            };

            match message {
                Message::Request(request) => {
                    let inline =
                        request.method == "initialize" || session.state() != SessionState::Ready;

                    if inline {
                        if let Err(e) = self
                            .handle_inline(&session, &dispatcher, transport.as_ref(), request)
                            .await
                        {
                            break Err(e);
                        }
                        if session.state() == SessionState::Failed {
                            break Err(McpError::SessionFailed {
                                reason: "handshake violated".into(),
                            });
                        }
                    } else if let Err(e) =
                        Self::spawn_request(&session, &dispatcher, &transport, request).await
                    {
                        break Err(e);
                    }
                }
                Message::Notification(notification) => handle_notification(&notification),
                Message::Response(_) | Message::Error(_) => {
                    warn!("Unexpected response received: {:?}", message.id());
                }
            }
        };

        let outcome = match (outcome, session.take_transport_failure()) {
            (Ok(()), Some(e)) => Err(McpError::from(e)),
            (outcome, _) => outcome,
        };

        session.close();
        if let Err(e) = transport.close().await {
            debug!("Transport close failed: {}", e);
        }
        info!("Session {} stopped", session.id());
        outcome
    }

    /// Handshake-phase requests run on the read loop so `Ready` is reached
    /// before the next frame is read.
    async fn handle_inline<T: Transport + ?Sized>(
        &self,
        session: &Session,
        dispatcher: &Dispatcher,
        transport: &T,
        request: JsonRpcRequest,
    ) -> Result<()> {
        let is_initialize = request.method == "initialize";
        let reply = dispatcher.dispatch(request).await;
        let negotiated = is_initialize && reply.is_ok();

        if let Err(e) = transport.write_message(&Message::from(reply)).await {
            error!("Failed to send response: {}", e);
            if negotiated {
                session.handshake().fail();
            }
            return Err(e.into());
        }

        if negotiated {
            session.handshake().complete()?;
        }
        Ok(())
    }

    /// Ready-phase requests run concurrently; replies go out in completion order.
    async fn spawn_request<T: Transport + 'static>(
        session: &Arc<Session>,
        dispatcher: &Arc<Dispatcher>,
        transport: &Arc<T>,
        request: JsonRpcRequest,
    ) -> Result<()> {
        let id = request.id.clone();

        if !session.reserve(&id) {
            warn!("Duplicate in-flight request id {}", id);
            let reply = JsonRpcErrorResponse::new(
                Some(id),
                crate::error::ProtocolError::InvalidRequest("duplicate request id".into())
                    .to_jsonrpc(),
            );
            transport.write_message(&Message::Error(reply)).await?;
            return Ok(());
        }

        let task_session = Arc::clone(session);
        let dispatcher = Arc::clone(dispatcher);
        let transport = Arc::clone(transport);
        let task_id = id.clone();

        let handle = tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(task_session.limiter()).acquire_owned().await else {
                return;
            };
            let reply = dispatcher.dispatch(request).await;
            task_session.release(&task_id);

            if let Err(e) = transport.write_message(&Message::from(reply)).await {
                error!("Failed to send response for {}: {}", task_id, e);
                task_session.fail_transport(e);
            }
        });
        session.attach(&id, handle.abort_handle());
        Ok(())
    }
}

fn handle_notification(notification: &JsonRpcNotification) {
    match notification.method.as_str() {
        "notifications/initialized" => debug!("Client reported initialized"),
        "notifications/cancelled" => {
            debug!("Cancellation notice ignored: {:?}", notification.params)
        }
        method => debug!("Ignoring notification: {}", method),
    }
}

/// Builder for MCP Server.
pub struct McpServerBuilder {
    registry: CapabilityRegistry,
    config: ServerConfig,
}

impl McpServerBuilder {
    pub fn new() -> Self {
        Self {
            registry: CapabilityRegistry::new(),
            config: ServerConfig::default(),
        }
    }

    pub fn registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into().into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into().into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    pub fn build(self) -> Result<McpServer> {
        if self.registry.is_empty() {
            return Err(McpError::Internal {
                message: "Registry has no tools or resources".into(),
            });
        }
        Ok(McpServer::new(self.registry, self.config))
    }
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
