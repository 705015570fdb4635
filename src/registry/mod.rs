//! Capability registry: the resources and tools a server exposes.
//!
//! Registration takes `&mut self` and happens before serving. The registry is
//! then frozen behind an `Arc` and shared read-only by every session.

pub mod traits;

pub use traits::{ResourceReader, ToolExecutor};

use crate::error::{RegistryError, ToolError};
use crate::protocol::{Resource, ResourcesCapability, ServerCapabilities, Tool, ToolsCapability};
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on schema violations reported back to the caller.
const MAX_REPORTED_VIOLATIONS: usize = 5;

/// A tool with its compiled input schema.
pub struct RegisteredTool {
    definition: Tool,
    validator: Validator,
    executor: Arc<dyn ToolExecutor>,
}

impl RegisteredTool {
    pub fn definition(&self) -> &Tool {
        &self.definition
    }

    pub fn executor(&self) -> &Arc<dyn ToolExecutor> {
        &self.executor
    }

    /// Validate call arguments against the tool's input schema.
    pub fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        if self.validator.is_valid(arguments) {
            return Ok(());
        }

        let message = self
            .validator
            .iter_errors(arguments)
            .take(MAX_REPORTED_VIOLATIONS)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");

        Err(ToolError::InvalidArguments(if message.is_empty() {
            "arguments do not match input schema".into()
        } else {
            message
        }))
    }
}

/// A resource and the reader that serves it.
pub struct RegisteredResource {
    resource: Resource,
    reader: Arc<dyn ResourceReader>,
}

impl RegisteredResource {
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn reader(&self) -> &Arc<dyn ResourceReader> {
        &self.reader
    }
}

#[derive(Default)]
pub struct CapabilityRegistry {
    tools: Vec<RegisteredTool>,
    tool_index: HashMap<String, usize>,
    resources: Vec<RegisteredResource>,
    resource_index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool<T>(&mut self, tool: T) -> Result<(), RegistryError>
    where
        T: ToolExecutor + 'static,
    {
        self.register_tool_arc(Arc::new(tool))
    }

    pub fn register_tool_arc(
        &mut self,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<(), RegistryError> {
        let definition = executor.definition();
        if self.tool_index.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateName(definition.name));
        }

        let validator = jsonschema::validator_for(&definition.input_schema).map_err(|e| {
            RegistryError::InvalidSchema {
                name: definition.name.clone(),
                message: e.to_string(),
            }
        })?;

        debug!("Registering tool: {}", definition.name);
        self.tool_index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            validator,
            executor,
        });
        Ok(())
    }

    pub fn register_resource(
        &mut self,
        resource: Resource,
        reader: Arc<dyn ResourceReader>,
    ) -> Result<(), RegistryError> {
        if self.resource_index.contains_key(&resource.uri) {
            return Err(RegistryError::DuplicateName(resource.uri));
        }

        debug!("Registering resource: {}", resource.uri);
        self.resource_index.insert(resource.uri.clone(), self.resources.len());
        self.resources.push(RegisteredResource { resource, reader });
        Ok(())
    }

    /// Tool definitions in registration order.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Resources in registration order.
    pub fn list_resources(&self) -> Vec<Resource> {
        self.resources.iter().map(|r| r.resource.clone()).collect()
    }

    pub fn get_tool(&self, name: &str) -> Result<&RegisteredTool, RegistryError> {
        self.tool_index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn get_resource(&self, uri: &str) -> Result<&RegisteredResource, RegistryError> {
        self.resource_index
            .get(uri)
            .map(|&i| &self.resources[i])
            .ok_or_else(|| RegistryError::NotFound(uri.to_string()))
    }

    /// Capability declaration derived from what is registered.
    ///
    /// The registry is frozen while serving, so `listChanged` is never offered.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(|| ToolsCapability {
                list_changed: Some(false),
            }),
            resources: (!self.resources.is_empty()).then(|| ResourcesCapability {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
        }
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.resources.is_empty()
    }
}

#[macro_export]
macro_rules! define_tool {
    (
        name: $name:expr,
        description: $desc:expr,
        schema: $schema:tt
    ) => {
        $crate::protocol::Tool {
            name: $name.into(),
            description: Some($desc.into()),
            input_schema: serde_json::json!($schema),
        }
    };
}
