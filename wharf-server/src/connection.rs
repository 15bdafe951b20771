//! Per-connection state and the serialized send path
//!
//! Each accepted peer gets one [`ClientConnection`]: its server-generated
//! identity, the write half of its message channel behind the send guard,
//! and its cancellation scope. The channel forbids overlapping writes, so
//! application payloads and close frames go through the guard; keepalive
//! replies are serialized against it by the channel itself.

use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use wharf_core::ClientId;

use crate::transport::ServerStream;

/// Write half of one connection's message channel
pub(crate) type MessageSink = SplitSink<WebSocketStream<ServerStream>, Message>;

/// Server-side state for one active peer session
///
/// Records are shared through the registry behind `Arc`; the identity,
/// address, and timestamp are immutable for the record's lifetime.
pub struct ClientConnection {
    id: ClientId,
    remote_addr: SocketAddr,
    connected_at: SystemTime,
    sender: Mutex<MessageSink>,
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Create a record for a channel that just completed its upgrade
    pub(crate) fn new(
        id: ClientId,
        remote_addr: SocketAddr,
        sender: MessageSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: SystemTime::now(),
            sender: Mutex::new(sender),
            cancel,
        }
    }

    /// Identity assigned at accept time
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Peer address captured at accept time
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// When the upgrade for this connection completed
    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Read-only view of this connection
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            remote_addr: self.remote_addr,
            connected_at: self.connected_at,
        }
    }

    /// This connection's cancellation scope
    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Trigger this connection's cancellation scope
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Send one complete message through the channel
    ///
    /// Waits for the send guard, then performs a single write. Returns
    /// `false` when any governing scope cancels first (the connection's
    /// scope already folds in the server-wide one) or when the transport
    /// fails; failures are logged, never raised. The guard is released on
    /// every path.
    pub(crate) async fn send_message(
        &self,
        message: Message,
        call_cancel: Option<&CancellationToken>,
    ) -> bool {
        let call_cancelled = async {
            match call_cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(call_cancelled);

        // biased: cancellation wins over an available guard
        let mut sink = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                crate::log_debug!("send to {} dropped: connection scope cancelled", self.id);
                return false;
            }
            _ = &mut call_cancelled => {
                crate::log_debug!("send to {} dropped: caller cancelled", self.id);
                return false;
            }
            guard = self.sender.lock() => guard,
        };

        let written = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                crate::log_debug!("send to {} abandoned: connection scope cancelled", self.id);
                return false;
            }
            _ = &mut call_cancelled => {
                crate::log_debug!("send to {} abandoned: caller cancelled", self.id);
                return false;
            }
            result = sink.send(message) => result,
        };

        match written {
            Ok(()) => true,
            Err(e) => {
                crate::log_debug!("send to {} failed: {}", self.id, e);
                false
            }
        }
    }

    /// Close the channel politely, waiting for the send guard
    pub(crate) async fn close_channel(&self, code: CloseCode, reason: &str) {
        let mut sink = self.sender.lock().await;
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            crate::log_trace!("close frame to {} not delivered: {}", self.id, e);
        }
        let _ = sink.close().await;
    }

    /// Best-effort close that skips a busy send guard
    ///
    /// Used by the shutdown walk; a connection holding its guard for an
    /// in-flight send is torn down by scope cancellation instead.
    pub(crate) async fn try_close_channel(&self, code: CloseCode, reason: &str) {
        if let Ok(mut sink) = self.sender.try_lock() {
            let frame = CloseFrame {
                code,
                reason: reason.into(),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
            let _ = sink.close().await;
        }
    }

    /// Release the write half after the receive loop has exited
    pub(crate) async fn release_channel(&self) {
        if let Ok(mut sink) = self.sender.try_lock() {
            let _ = sink.close().await;
        }
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Read-only view of one connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    /// Identity assigned at accept time
    pub id: ClientId,
    /// Peer address
    pub remote_addr: SocketAddr,
    /// When the connection was established
    pub connected_at: SystemTime,
}

/// Why a receive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Peer completed the close handshake
    PeerClosed,
    /// Stream ended without a close handshake
    ChannelNotOpen,
    /// Read failed at the transport level
    TransportFailure,
    /// The connection's cancellation scope fired
    Cancelled,
}

impl fmt::Display for ReceiveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiveOutcome::PeerClosed => write!(f, "peer closed"),
            ReceiveOutcome::ChannelNotOpen => write!(f, "channel not open"),
            ReceiveOutcome::TransportFailure => write!(f, "transport failure"),
            ReceiveOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}
