//! Per-connection session state.

use crate::error::TransportError;
use crate::protocol::handshake::{HandshakeCoordinator, Negotiated, SessionState};
use crate::protocol::types::{RequestId, ServerCapabilities};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tokio::sync::{Semaphore, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// State scoped to one transport connection.
///
/// Sessions share nothing mutable with each other; the registry they serve is
/// read-only.
pub struct Session {
    id: u64,
    handshake: Arc<HandshakeCoordinator>,
    in_flight: DashMap<RequestId, Option<AbortHandle>>,
    next_request_id: AtomicI64,
    limiter: Arc<Semaphore>,
    closed: watch::Sender<bool>,
    transport_failure: Mutex<Option<TransportError>>,
}

impl Session {
    pub fn new(capabilities: ServerCapabilities, max_concurrent_requests: usize) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            handshake: Arc::new(HandshakeCoordinator::new(capabilities)),
            in_flight: DashMap::new(),
            next_request_id: AtomicI64::new(1),
            limiter: Arc::new(Semaphore::new(max_concurrent_requests)),
            closed,
            transport_failure: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn handshake(&self) -> &Arc<HandshakeCoordinator> {
        &self.handshake
    }

    pub fn state(&self) -> SessionState {
        self.handshake.state()
    }

    pub fn negotiated(&self) -> Option<Negotiated> {
        self.handshake.negotiated()
    }

    pub fn limiter(&self) -> &Arc<Semaphore> {
        &self.limiter
    }

    /// Allocate an id for a server-originated request.
    pub fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Claim a correlation id for an incoming request.
    ///
    /// Returns `false` when a request with the same id is still in flight.
    pub fn reserve(&self, id: &RequestId) -> bool {
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(None);
                true
            }
        }
    }

    /// Attach the task serving a reserved id, so `close` can abort it.
    ///
    /// No-op if the task already finished and released its id.
    pub fn attach(&self, id: &RequestId, handle: AbortHandle) {
        if let Some(mut slot) = self.in_flight.get_mut(id) {
            *slot = Some(handle);
        }
    }

    pub fn release(&self, id: &RequestId) {
        self.in_flight.remove(id);
    }

    pub fn is_in_flight(&self, id: &RequestId) -> bool {
        self.in_flight.contains_key(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Resolves once the session has been closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Close the session because its transport failed. The first error is kept.
    pub fn fail_transport(&self, error: TransportError) {
        {
            let mut failure = self.transport_failure.lock();
            if failure.is_none() {
                *failure = Some(error);
            }
        }
        self.close();
    }

    pub fn take_transport_failure(&self) -> Option<TransportError> {
        self.transport_failure.lock().take()
    }

    /// Close the session and abandon all in-flight work.
    pub fn close(&self) {
        self.handshake.close();

        let abandoned = self.in_flight.len();
        self.in_flight.retain(|_, handle| {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
            false
        });

        if !self.closed.send_replace(true) {
            if abandoned > 0 {
                info!(session = self.id, "Session closed, abandoned {} requests", abandoned);
            } else {
                debug!(session = self.id, "Session closed");
            }
        }
    }
}
