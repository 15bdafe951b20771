//! Event fan-out to application handlers
//!
//! Applications observe the server through [`EventHandler`] implementations
//! registered before or after start. The dispatcher owns the handler list and
//! decides, per event kind, whether delivery blocks the caller.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use wharf_core::{ClientId, IncomingMessage};

use crate::connection::ClientInfo;
use crate::handshake::UpgradeRequest;

/// Application-side observer for server events
///
/// All methods default to no-ops, so implementors only override the events
/// they care about. Handlers are shared across every connection and may be
/// invoked concurrently; keep shared state behind its own synchronization.
///
/// Delivery guarantees differ per event:
///
/// * `on_client_connected` completes before the server reads anything from
///   that connection.
/// * `on_message_received` and `on_client_disconnected` are dispatched on
///   their own tasks so a slow handler never stalls a receive loop. No
///   ordering is guaranteed between messages of the same connection.
/// * `on_server_stopped` fires exactly once per run, after every accept loop
///   has exited.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// A connection completed its upgrade and was registered
    async fn on_client_connected(&self, client: ClientInfo, request: &UpgradeRequest) {
        let _ = (client, request);
    }

    /// A registered connection was torn down
    async fn on_client_disconnected(&self, client_id: ClientId) {
        let _ = client_id;
    }

    /// A data message arrived from a registered connection
    async fn on_message_received(&self, message: IncomingMessage) {
        let _ = message;
    }

    /// The current run ended and no accept loop remains
    async fn on_server_stopped(&self) {}
}

/// Fans events out to every registered [`EventHandler`]
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    /// Create a dispatcher with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler
    ///
    /// Handlers are invoked in registration order wherever delivery is
    /// sequential.
    pub async fn add(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    async fn handlers(&self) -> Vec<Arc<dyn EventHandler>> {
        self.handlers.read().await.clone()
    }

    /// Deliver the connect notification, awaiting every handler in order
    pub(crate) async fn client_connected(&self, client: ClientInfo, request: &UpgradeRequest) {
        for handler in self.handlers().await {
            handler.on_client_connected(client, request).await;
        }
    }

    /// Dispatch a disconnect notification without blocking teardown
    pub(crate) async fn client_disconnected(&self, client_id: ClientId) {
        for handler in self.handlers().await {
            tokio::spawn(async move { handler.on_client_disconnected(client_id).await });
        }
    }

    /// Dispatch an inbound message without blocking the receive loop
    pub(crate) async fn message_received(&self, message: IncomingMessage) {
        for handler in self.handlers().await {
            let message = message.clone();
            tokio::spawn(async move { handler.on_message_received(message).await });
        }
    }

    /// Deliver the end-of-run notification, awaiting every handler in order
    pub(crate) async fn server_stopped(&self) {
        for handler in self.handlers().await {
            handler.on_server_stopped().await;
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}
