//! Handshake coordinator: the once-per-session initialize exchange.
//!
//! ```text
//! Unstarted -> AwaitingInitialize -> Negotiating -> Ready -> Closed
//!                        \________________\___________\____> Failed
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::types::{
    Category, ClientCapabilities, ClientInfo, InitializeParams, SUPPORTED_PROTOCOL_VERSIONS,
    ServerCapabilities,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created, no messages processed yet.
    Unstarted,
    /// Transport open; only `initialize` is accepted.
    AwaitingInitialize,
    /// Initialize received, response not yet delivered.
    Negotiating,
    /// Steady state.
    Ready,
    /// Transport closed or explicit shutdown.
    Closed,
    /// Handshake violated; the transport must be restarted.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiated {
    pub protocol_version: String,
    pub client_info: ClientInfo,
    pub client_capabilities: ClientCapabilities,
    pub server_capabilities: ServerCapabilities,
}

pub struct HandshakeCoordinator {
    supported: ServerCapabilities,
    state: RwLock<SessionState>,
    negotiated: RwLock<Option<Negotiated>>,
}

impl HandshakeCoordinator {
    pub fn new(supported: ServerCapabilities) -> Self {
        Self {
            supported,
            state: RwLock::new(SessionState::Unstarted),
            negotiated: RwLock::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn negotiated(&self) -> Option<Negotiated> {
        self.negotiated.read().clone()
    }

    /// Whether the category was advertised to the client in this session.
    pub fn advertises(&self, category: Category) -> bool {
        self.negotiated
            .read()
            .as_ref()
            .is_some_and(|n| n.server_capabilities.supports(category))
    }

    /// Transport is open; start waiting for `initialize`.
    pub fn open(&self) {
        let mut state = self.state.write();
        if *state == SessionState::Unstarted {
            *state = SessionState::AwaitingInitialize;
        } else {
            warn!("open() in state {:?} ignored", *state);
        }
    }

    /// Check whether `method` may be processed in the current state.
    ///
    /// A second `initialize` moves the session to `Failed`.
    pub fn gate(&self, method: &str) -> ProtocolResult<()> {
        let mut state = self.state.write();
        let is_initialize = method == "initialize";

        match (*state, is_initialize) {
            (SessionState::Ready, false) => Ok(()),
            (SessionState::AwaitingInitialize, true) => Ok(()),
            (SessionState::AwaitingInitialize, false) => {
                debug!("Rejecting {} before handshake", method);
                Err(ProtocolError::InvalidRequest("handshake required".into()))
            }
            (SessionState::Ready | SessionState::Negotiating, true) => {
                warn!("Repeated initialize, session failed");
                *state = SessionState::Failed;
                Err(ProtocolError::InvalidRequest(
                    "session already initialized".into(),
                ))
            }
            (SessionState::Negotiating, false) => {
                Err(ProtocolError::InvalidRequest("handshake required".into()))
            }
            (SessionState::Unstarted, _) => {
                Err(ProtocolError::InvalidRequest("session not open".into()))
            }
            (SessionState::Closed, _) => {
                Err(ProtocolError::InvalidRequest("session closed".into()))
            }
            (SessionState::Failed, _) => {
                Err(ProtocolError::InvalidRequest("session failed".into()))
            }
        }
    }

    /// Negotiate against the client's initialize params.
    ///
    /// The client's protocol version is echoed when supported, otherwise the
    /// latest supported version is offered and the client decides.
    pub fn begin(&self, params: InitializeParams) -> ProtocolResult<Negotiated> {
        let mut state = self.state.write();
        if *state != SessionState::AwaitingInitialize {
            return Err(ProtocolError::InvalidRequest(
                format!("initialize not expected in state {:?}", *state).into(),
            ));
        }
        *state = SessionState::Negotiating;

        let requested = params.protocol_version.as_str();
        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
            params.protocol_version
        } else {
            warn!(
                "Client requested unsupported protocol version {}, offering {}",
                params.protocol_version, SUPPORTED_PROTOCOL_VERSIONS[0]
            );
            SUPPORTED_PROTOCOL_VERSIONS[0].to_string()
        };

        let negotiated = Negotiated {
            protocol_version,
            client_info: params.client_info,
            client_capabilities: params.capabilities,
            server_capabilities: self.supported.clone(),
        };
        *self.negotiated.write() = Some(negotiated.clone());
        Ok(negotiated)
    }

    /// The initialize response was delivered.
    pub fn complete(&self) -> ProtocolResult<()> {
        let mut state = self.state.write();
        if *state != SessionState::Negotiating {
            return Err(ProtocolError::InvalidRequest(
                format!("cannot complete handshake in state {:?}", *state).into(),
            ));
        }
        *state = SessionState::Ready;

        if let Some(negotiated) = self.negotiated.read().as_ref() {
            info!(
                "Session ready: {} v{} (protocol {})",
                negotiated.client_info.name,
                negotiated.client_info.version,
                negotiated.protocol_version
            );
        }
        Ok(())
    }

    pub fn fail(&self) {
        let mut state = self.state.write();
        if !state.is_terminal() {
            warn!("Handshake failed in state {:?}", *state);
            *state = SessionState::Failed;
        }
    }

    pub fn close(&self) {
        let mut state = self.state.write();
        if !state.is_terminal() {
            *state = SessionState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Implementation, ToolsCapability};

    fn params(version: &str) -> InitializeParams {
        InitializeParams {
            protocol_version: version.into(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "test-client".into(),
                version: "1.0".into(),
            },
        }
    }

    fn coordinator() -> HandshakeCoordinator {
        HandshakeCoordinator::new(ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            resources: None,
        })
    }

    #[test]
    fn test_full_handshake() {
        let handshake = coordinator();
        assert_eq!(handshake.state(), SessionState::Unstarted);

        handshake.open();
        assert_eq!(handshake.state(), SessionState::AwaitingInitialize);

        handshake.gate("initialize").unwrap();
        let negotiated = handshake.begin(params("2024-11-05")).unwrap();
        assert_eq!(negotiated.protocol_version, "2024-11-05");
        assert_eq!(handshake.state(), SessionState::Negotiating);

        handshake.complete().unwrap();
        assert_eq!(handshake.state(), SessionState::Ready);
        assert!(handshake.advertises(Category::Tools));
        assert!(!handshake.advertises(Category::Resources));
        handshake.gate("tools/list").unwrap();
    }

    #[test]
    fn test_requests_before_initialize_are_not_fatal() {
        let handshake = coordinator();
        handshake.open();

        let err = handshake.gate("tools/list").unwrap_err();
        assert_eq!(err.code(), -32600);
        assert!(err.to_string().contains("handshake required"));
        assert_eq!(handshake.state(), SessionState::AwaitingInitialize);

        assert!(handshake.gate("ping").is_err());
        handshake.gate("initialize").unwrap();
    }

    #[test]
    fn test_second_initialize_fails_session() {
        let handshake = coordinator();
        handshake.open();
        handshake.begin(params("2024-11-05")).unwrap();
        handshake.complete().unwrap();
        let before = handshake.negotiated();

        let err = handshake.gate("initialize").unwrap_err();
        assert_eq!(err.code(), -32600);
        assert_eq!(handshake.state(), SessionState::Failed);
        assert_eq!(handshake.negotiated(), before);
        assert!(handshake.gate("tools/list").is_err());
    }

    #[test]
    fn test_unsupported_version_offers_latest() {
        let handshake = coordinator();
        handshake.open();
        let negotiated = handshake.begin(params("1999-01-01")).unwrap();
        assert_eq!(negotiated.protocol_version, SUPPORTED_PROTOCOL_VERSIONS[0]);
    }

    #[test]
    fn test_close_and_fail_are_terminal() {
        let handshake = coordinator();
        handshake.open();
        handshake.fail();
        handshake.close();
        assert_eq!(handshake.state(), SessionState::Failed);

        let handshake = coordinator();
        handshake.open();
        handshake.close();
        assert_eq!(handshake.state(), SessionState::Closed);
        assert!(handshake.begin(params("2024-11-05")).is_err());
    }
}
