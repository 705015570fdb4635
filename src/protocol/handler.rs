//! Request dispatcher: routes requests to the registry's handlers.

use crate::error::{ProtocolError, ProtocolResult, RegistryError, ResourceError, ToolError};
use crate::protocol::handshake::HandshakeCoordinator;
use crate::protocol::types::*;
use crate::registry::CapabilityRegistry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, error, instrument, warn};

/// Default bound on a single handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Method dispatcher for one session.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    handshake: Arc<HandshakeCoordinator>,
    info: ServerInfo,
    instructions: Option<String>,
    handler_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        handshake: Arc<HandshakeCoordinator>,
        info: ServerInfo,
    ) -> Self {
        Self {
            registry,
            handshake,
            info,
            instructions: None,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Dispatch a request. Always yields exactly one reply carrying the request id.
    #[instrument(skip(self, request), fields(method = %request.method, id = %request.id))]
    pub async fn dispatch(&self, request: JsonRpcRequest) -> Reply {
        debug!("Dispatching request: {}", request.method);

        let result = match self.handshake.gate(&request.method) {
            Ok(()) => self.route(&request.method, request.params).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => Ok(JsonRpcResponse::success(request.id, value)),
            Err(e) => {
                match &e {
                    ProtocolError::InternalError(_) => error!("Request failed: {}", e),
                    _ => warn!("Request rejected: {}", e),
                }
                Err(JsonRpcErrorResponse::new(Some(request.id), e.to_jsonrpc()))
            }
        }
    }

    async fn route(&self, method: &str, params: Option<Value>) -> ProtocolResult<Value> {
        match method {
            "initialize" => self.handle_initialize(params),
            "ping" => Ok(serde_json::json!({})),
            "resources/list" => self.handle_list_resources(),
            "resources/read" => self.handle_read_resource(params).await,
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(params).await,
            method => {
                warn!("Unknown method: {}", method);
                Err(ProtocolError::MethodNotFound(method.to_string()))
            }
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> ProtocolResult<Value> {
        let params: InitializeParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => {
                self.handshake.fail();
                return Err(e);
            }
        };

        let negotiated = self.handshake.begin(params)?;
        to_result(InitializeResult {
            protocol_version: negotiated.protocol_version,
            capabilities: negotiated.server_capabilities,
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        })
    }

    fn require(&self, category: Category, method: &str) -> ProtocolResult<()> {
        if self.handshake.advertises(category) {
            Ok(())
        } else {
            debug!("{} capability not advertised", category.as_str());
            Err(ProtocolError::MethodNotFound(method.to_string()))
        }
    }

    fn handle_list_resources(&self) -> ProtocolResult<Value> {
        self.require(Category::Resources, "resources/list")?;
        to_result(ListResourcesResult {
            resources: self.registry.list_resources(),
            next_cursor: None,
        })
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> ProtocolResult<Value> {
        self.require(Category::Resources, "resources/read")?;
        let ReadResourceParams { uri } = parse_params(params)?;

        let reader = match self.registry.get_resource(&uri) {
            Ok(registered) => Arc::clone(registered.reader()),
            Err(_) => return Err(ProtocolError::ResourceNotFound(uri)),
        };

        let target = uri.clone();
        let contents = self
            .contained(&uri, async move { reader.read(&target).await })
            .await?
            .map_err(|e| match e {
                ResourceError::NotFound(_) => ProtocolError::ResourceNotFound(uri.clone()),
                ResourceError::Internal(message) => ProtocolError::InternalError(message.into()),
            })?;

        to_result(ReadResourceResult {
            contents: vec![contents],
        })
    }

    fn handle_list_tools(&self) -> ProtocolResult<Value> {
        self.require(Category::Tools, "tools/list")?;
        let tools = self.registry.list_tools();
        debug!("Listing {} tools", tools.len());
        to_result(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> ProtocolResult<Value> {
        self.require(Category::Tools, "tools/call")?;
        let CallToolParams { name, arguments } = parse_params(params)?;

        let tool = self.registry.get_tool(&name).map_err(|e| match e {
            RegistryError::NotFound(name) => {
                ProtocolError::MethodNotFound(format!("tools/call {}", name))
            }
            other => ProtocolError::InternalError(other.to_string().into()),
        })?;

        tool.validate(&arguments)
            .map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))?;

        debug!("Tool call: {}", name);
        let executor = Arc::clone(tool.executor());
        let outcome = self
            .contained(&name, async move { executor.call(arguments).await })
            .await?;

        let result = match outcome {
            Ok(result) => result,
            Err(ToolError::Domain(message)) => {
                debug!("Tool {} reported a domain error: {}", name, message);
                CallToolResult::error(message)
            }
            Err(ToolError::InvalidArguments(message)) => {
                return Err(ProtocolError::InvalidParams(message.into()));
            }
            Err(ToolError::Internal(message)) => {
                return Err(ProtocolError::InternalError(
                    format!("tool {} failed: {}", name, message).into(),
                ));
            }
        };

        to_result(result)
    }

    /// Run handler code on its own task, bounded by the handler timeout.
    ///
    /// Panics and timeouts come back as `InternalError`.
    async fn contained<F, T>(&self, target: &str, work: F) -> ProtocolResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = tokio::spawn(work);
        let _abort = AbortOnDrop(task.abort_handle());

        match tokio::time::timeout(self.handler_timeout, &mut task).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(join_error)) if join_error.is_panic() => {
                error!("Handler for {} panicked", target);
                Err(ProtocolError::InternalError(
                    format!("handler for {} panicked", target).into(),
                ))
            }
            Ok(Err(_)) => Err(ProtocolError::InternalError(
                format!("handler for {} was cancelled", target).into(),
            )),
            Err(_) => {
                error!(
                    "Handler for {} timed out after {:?}",
                    target, self.handler_timeout
                );
                Err(ProtocolError::InternalError(
                    format!(
                        "handler for {} timed out after {}ms",
                        target,
                        self.handler_timeout.as_millis()
                    )
                    .into(),
                ))
            }
        }
    }
}

/// Aborts the handler task once the request awaiting it is dropped or returns.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> ProtocolResult<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))?
        .ok_or_else(|| ProtocolError::InvalidParams("Missing params".into()))
}

fn to_result<T: Serialize>(result: T) -> ProtocolResult<Value> {
    serde_json::to_value(result).map_err(|e| ProtocolError::InternalError(e.to_string().into()))
}
