//! Configuration types and builders.

use crate::error::{ConfigError, Result};
use crate::protocol::handler::DEFAULT_HANDLER_TIMEOUT;
use crate::protocol::transport::DEFAULT_MAX_FRAME_BYTES;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: Cow<'static, str>,
    pub version: Cow<'static, str>,
    pub instructions: Option<String>,
    /// Upper bound on one handler invocation.
    pub handler_timeout: Duration,
    /// In-flight handler limit per session.
    pub max_concurrent_requests: usize,
    pub max_frame_bytes: usize,
    /// Serve TCP connections instead of stdio when set.
    pub listen_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            instructions: None,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            max_concurrent_requests: 16,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            listen_addr: None,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig.
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.config.version = version.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.handler_timeout = timeout;
        self
    }

    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    pub fn max_frame_bytes(mut self, limit: usize) -> Self {
        self.config.max_frame_bytes = limit;
        self
    }

    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.config.listen_addr = Some(addr);
        self
    }

    /// Build from environment variables.
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(name) = env::var("MCP_SERVER_NAME") {
            self.config.name = name.into();
        }

        if let Ok(instructions) = env::var("MCP_INSTRUCTIONS") {
            self.config.instructions = Some(instructions);
        }

        if let Ok(timeout) = env::var("MCP_HANDLER_TIMEOUT_MS") {
            let millis: u64 = parse_var("MCP_HANDLER_TIMEOUT_MS", &timeout)?;
            self.config.handler_timeout = Duration::from_millis(millis);
        }

        if let Ok(limit) = env::var("MCP_MAX_CONCURRENT_REQUESTS") {
            self.config.max_concurrent_requests = parse_var("MCP_MAX_CONCURRENT_REQUESTS", &limit)?;
        }

        if let Ok(limit) = env::var("MCP_MAX_FRAME_BYTES") {
            self.config.max_frame_bytes = parse_var("MCP_MAX_FRAME_BYTES", &limit)?;
        }

        if let Ok(addr) = env::var("MCP_LISTEN_ADDR") {
            self.config.listen_addr = Some(parse_var("MCP_LISTEN_ADDR", &addr)?);
        }

        Ok(self)
    }

    pub fn build(self) -> Result<ServerConfig> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> Result<()> {
        if self.config.name.is_empty() {
            return Err(ConfigError::MissingField("name".into()).into());
        }
        if self.config.handler_timeout.is_zero() {
            return Err(invalid("handler_timeout", "timeout must be greater than 0"));
        }
        if self.config.max_concurrent_requests == 0 {
            return Err(invalid(
                "max_concurrent_requests",
                "concurrency limit must be greater than 0",
            ));
        }
        if self.config.max_frame_bytes == 0 {
            return Err(invalid("max_frame_bytes", "frame limit must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: &'static str) -> crate::error::McpError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
    .into()
}

fn parse_var<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.into(),
            message: format!("cannot parse '{}'", value).into(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::McpError;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.name, env!("CARGO_PKG_NAME"));
        assert_eq!(config.handler_timeout, Duration::from_secs(30));
        assert!(config.listen_addr.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::builder()
            .name("weather")
            .instructions("Ask for forecasts by city name.")
            .max_concurrent_requests(2)
            .handler_timeout(Duration::from_millis(500))
            .listen_addr("127.0.0.1:7000".parse().unwrap())
            .build()
            .unwrap();

        assert_eq!(config.name, "weather");
        assert_eq!(config.max_concurrent_requests, 2);
        assert_eq!(config.listen_addr.unwrap().port(), 7000);
    }

    #[test]
    fn test_validation() {
        let err = ServerConfig::builder()
            .max_concurrent_requests(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, McpError::Config(ConfigError::InvalidValue { .. })));

        assert!(ServerConfig::builder()
            .handler_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(ServerConfig::builder().name("").build().is_err());
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var::<usize>("X", " 42 ").unwrap(), 42);
        assert!(parse_var::<SocketAddr>("X", "not-an-addr").is_err());
    }
}
