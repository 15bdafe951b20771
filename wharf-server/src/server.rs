//! Connection engine
//!
//! This module provides the server: listener setup, the accept loops, the
//! per-connection receive loops, and the public send and lifecycle surface.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wharf_core::error::ConfigError;
use wharf_core::{
    ClientId, Error, IncomingMessage, MessageKind, Result, ServerStatistics, StatisticsSnapshot,
};

use crate::admission::AdmissionFilter;
use crate::config::ServerConfig;
use crate::connection::{ClientConnection, ClientInfo, ReceiveOutcome};
use crate::events::{EventDispatcher, EventHandler};
use crate::handshake::{self, HandshakeError, HttpRequest, HttpResponse};
use crate::logging::LogLevel;
use crate::registry::ConnectionRegistry;
use crate::transport::{bind_all, ServerStream, StreamAcceptor};

/// Handle to the connection engine
///
/// Handles are cheap to clone and clones share one engine, so event handlers
/// can hold a clone and call back into the server from notifications.
/// Dropping the last handle cancels the running scope; prefer
/// [`Server::stop`] or [`Server::shutdown`] for a graceful close.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    shared: Arc<ServerShared>,
    run: Mutex<Option<ServerRun>>,
}

/// State reachable from the engine tasks of a run
///
/// Tasks hold this and never the outer handle, so dropping every handle can
/// still tear a run down.
struct ServerShared {
    config: ServerConfig,
    registry: ConnectionRegistry,
    admission: AdmissionFilter,
    stats: ServerStatistics,
    events: EventDispatcher,
    listening: AtomicBool,
}

/// One start-to-stop listening interval
struct ServerRun {
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
    local_addrs: Vec<SocketAddr>,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.inner.shared.config)
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Create a server from a configuration
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let admission = AdmissionFilter::with_permitted(config.permitted_addresses.iter().copied());
        Ok(Self {
            inner: Arc::new(ServerInner {
                shared: Arc::new(ServerShared {
                    config,
                    registry: ConnectionRegistry::new(),
                    admission,
                    stats: ServerStatistics::new(),
                    events: EventDispatcher::new(),
                    listening: AtomicBool::new(false),
                }),
                run: Mutex::new(None),
            }),
        })
    }

    /// Create a server from a `ws://` or `wss://` listen URI
    pub fn from_uri(uri: &str) -> Result<Self> {
        Self::new(ServerConfig::from_uri(uri)?)
    }

    /// Create a server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    fn shared(&self) -> &Arc<ServerShared> {
        &self.inner.shared
    }

    /// Register an application event handler
    ///
    /// Handlers added while running see only events raised after registration.
    pub async fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.shared().events.add(handler).await;
    }

    /// Configuration the server was built with
    pub fn config(&self) -> &ServerConfig {
        &self.shared().config
    }

    /// Runtime view of the peer admission allow-list
    pub fn admission(&self) -> &AdmissionFilter {
        &self.shared().admission
    }

    /// True while any accept loop of the current run is alive
    pub fn is_listening(&self) -> bool {
        self.shared().listening.load(Ordering::SeqCst)
    }

    /// Addresses the current run is bound to
    ///
    /// Useful with port 0, where each listener gets an ephemeral port.
    pub async fn local_addresses(&self) -> Vec<SocketAddr> {
        if !self.is_listening() {
            return Vec::new();
        }
        match self.inner.run.lock().await.as_ref() {
            Some(run) => run.local_addrs.clone(),
            None => Vec::new(),
        }
    }

    /// Begin accepting connections
    ///
    /// Opens one listener per configured address and returns once all of them
    /// accept in the background. Fails with [`Error::InvalidState`] when the
    /// server is already listening.
    pub async fn start(&self) -> Result<()> {
        self.start_with_cancellation(CancellationToken::new()).await
    }

    /// Begin accepting connections under an externally owned token
    ///
    /// Cancelling the token ends the run the same way [`Server::stop`] does,
    /// except that close frames are not sent first.
    pub async fn start_with_cancellation(&self, cancellation: CancellationToken) -> Result<()> {
        let mut slot = self.inner.run.lock().await;
        if self.is_listening() {
            return Err(Error::invalid_state("server is already listening"));
        }

        let shared = Arc::clone(self.shared());
        let acceptor = self.build_acceptor()?;
        let listeners = bind_all(&shared.config.listen_addresses, shared.config.port).await?;

        let cancel = cancellation.child_token();
        let scheme = if shared.config.secure { "wss" } else { "ws" };

        let mut local_addrs = Vec::with_capacity(listeners.len());
        let mut accept_loops = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let local = listener.local_addr()?;
            shared.log(LogLevel::Info, &format!("Listening on {scheme}://{local}"));
            local_addrs.push(local);

            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            let acceptor = acceptor.clone();
            accept_loops.push(tokio::spawn(async move {
                shared.accept_loop(listener, cancel, acceptor).await;
            }));
        }

        shared.listening.store(true, Ordering::SeqCst);

        let supervisor = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                for task in accept_loops {
                    let _ = task.await;
                }
                shared.listening.store(false, Ordering::SeqCst);
                shared.log(LogLevel::Info, "Server stopped");
                shared.events.server_stopped().await;
            })
        };

        *slot = Some(ServerRun {
            cancel,
            supervisor,
            local_addrs,
        });
        Ok(())
    }

    fn build_acceptor(&self) -> Result<StreamAcceptor> {
        #[cfg(feature = "tls-transport")]
        if self.shared().config.secure {
            let tls = self.shared().config.tls.as_ref().ok_or_else(|| {
                Error::Config(ConfigError::MissingField {
                    field: "tls".to_string(),
                })
            })?;
            let rustls_config = crate::config::build_rustls_server_config(
                tls,
                !self.shared().config.accept_invalid_certificates,
            )?;
            return Ok(StreamAcceptor::Tls(tokio_rustls::TlsAcceptor::from(
                Arc::new(rustls_config),
            )));
        }

        #[cfg(not(feature = "tls-transport"))]
        if self.shared().config.secure {
            return Err(Error::Config(ConfigError::Validation(
                "TLS support requires the tls-transport feature".to_string(),
            )));
        }

        Ok(StreamAcceptor::Plain)
    }

    /// Stop the current run
    ///
    /// Sends a best-effort close to every registered connection, cancels the
    /// run scope (which cascades to every connection scope), and waits for
    /// the accept loops to exit and the stopped notification to be delivered.
    /// Fails with [`Error::InvalidState`] when not listening.
    pub async fn stop(&self) -> Result<()> {
        let run = {
            let mut slot = self.inner.run.lock().await;
            if !self.is_listening() {
                return Err(Error::invalid_state("server is not listening"));
            }
            match slot.take() {
                Some(run) => run,
                None => return Err(Error::invalid_state("server is already stopping")),
            }
        };

        let shared = self.shared();
        shared.log(LogLevel::Info, "Stopping server");
        for connection in shared.registry.records().await {
            connection
                .try_close_channel(CloseCode::Away, "server is shutting down")
                .await;
            connection.cancel();
        }
        run.cancel.cancel();
        let _ = run.supervisor.await;
        Ok(())
    }

    /// Stop when running; safe to call at any time, any number of times
    pub async fn shutdown(&self) {
        if self.stop().await.is_err() {
            // A run cancelled through an external token leaves its finished
            // supervisor in the slot
            let mut slot = self.inner.run.lock().await;
            if let Some(run) = slot.take() {
                run.cancel.cancel();
                let _ = run.supervisor.await;
            }
        }
    }

    /// Whether a client with this identity is currently registered
    pub async fn is_client_connected(&self, client_id: ClientId) -> bool {
        self.shared().registry.contains(client_id).await
    }

    /// Point-in-time list of connected clients
    pub async fn list_clients(&self) -> Vec<ClientInfo> {
        self.shared()
            .registry
            .records()
            .await
            .iter()
            .map(|connection| connection.info())
            .collect()
    }

    /// Number of currently registered connections
    pub async fn client_count(&self) -> usize {
        self.shared().registry.count().await
    }

    /// Send a message to a client
    ///
    /// Returns `true` only when the complete payload was handed to the
    /// transport. Empty payloads fail before any lookup; unknown identities,
    /// cancellation, and transport failures all fail without raising an
    /// error.
    pub async fn send(
        &self,
        client_id: ClientId,
        payload: impl Into<Bytes>,
        kind: MessageKind,
    ) -> bool {
        self.send_inner(client_id, payload.into(), kind, None).await
    }

    /// Send a message, abandoning the attempt when the token fires
    ///
    /// The token is merged with the server-wide and connection scopes;
    /// whichever fires first abandons the send.
    pub async fn send_with_cancellation(
        &self,
        client_id: ClientId,
        payload: impl Into<Bytes>,
        kind: MessageKind,
        cancellation: &CancellationToken,
    ) -> bool {
        self.send_inner(client_id, payload.into(), kind, Some(cancellation))
            .await
    }

    /// Send a text message
    pub async fn send_text(&self, client_id: ClientId, text: impl Into<String>) -> bool {
        self.send_inner(client_id, Bytes::from(text.into()), MessageKind::Text, None)
            .await
    }

    /// Send a binary message
    pub async fn send_binary(&self, client_id: ClientId, payload: impl Into<Bytes>) -> bool {
        self.send_inner(client_id, payload.into(), MessageKind::Binary, None)
            .await
    }

    async fn send_inner(
        &self,
        client_id: ClientId,
        payload: Bytes,
        kind: MessageKind,
        cancellation: Option<&CancellationToken>,
    ) -> bool {
        if payload.is_empty() {
            return false;
        }
        let shared = self.shared();
        let Some(connection) = shared.registry.lookup(client_id).await else {
            shared.log(
                LogLevel::Debug,
                &format!("Dropping send to unknown client {client_id}"),
            );
            return false;
        };
        let len = payload.len() as u64;
        let Some(message) = build_message(kind, payload) else {
            shared.log(
                LogLevel::Warn,
                &format!("Dropping non-UTF-8 text payload for client {client_id}"),
            );
            return false;
        };
        let sent = connection.send_message(message, cancellation).await;
        if sent && shared.config.enable_statistics {
            shared.stats.record_sent(len);
        }
        sent
    }

    /// Send the same payload to every connected client
    ///
    /// Deliveries go through each connection's own send guard. Returns the
    /// number of clients that accepted the message.
    pub async fn broadcast(&self, payload: impl Into<Bytes>, kind: MessageKind) -> usize {
        let payload = payload.into();
        if payload.is_empty() {
            return 0;
        }
        let shared = self.shared();
        let len = payload.len() as u64;
        let Some(message) = build_message(kind, payload) else {
            shared.log(LogLevel::Warn, "Dropping non-UTF-8 text broadcast");
            return 0;
        };

        let mut delivered = 0;
        for connection in shared.registry.records().await {
            if connection.send_message(message.clone(), None).await {
                delivered += 1;
                if shared.config.enable_statistics {
                    shared.stats.record_sent(len);
                }
            }
        }
        delivered
    }

    /// Disconnect a client
    ///
    /// Waits for the connection's send guard so an in-flight send completes
    /// its write, requests a protocol-level close, then cancels the
    /// connection scope. Unknown identities are a silent no-op, so calling
    /// this twice is safe.
    pub async fn disconnect_client(&self, client_id: ClientId) {
        let shared = self.shared();
        let Some(connection) = shared.registry.unregister(client_id).await else {
            return;
        };
        shared.log(
            LogLevel::Debug,
            &format!("Disconnecting client {client_id}"),
        );
        connection
            .close_channel(CloseCode::Normal, "disconnected by server")
            .await;
        connection.cancel();
    }

    /// Message and byte counters since the server was created
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.shared().stats.snapshot()
    }

    /// Zero the traffic counters, keeping the start time
    pub fn reset_statistics(&self) {
        self.shared().stats.reset();
    }
}

impl ServerShared {
    /// Engine diagnostics go to the log macros and the optional sink
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => {
                crate::log_error!("{message}");
            }
            LogLevel::Warn => {
                crate::log_warn!("{message}");
            }
            LogLevel::Info => {
                crate::log_info!("{message}");
            }
            LogLevel::Debug => {
                crate::log_debug!("{message}");
            }
            LogLevel::Trace => {
                crate::log_trace!("{message}");
            }
        }
        if let Some(logger) = &self.config.logger {
            logger.emit(level, message);
        }
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        cancel: CancellationToken,
        acceptor: StreamAcceptor,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.dispatch_accept(stream, peer, &cancel, &acceptor).await;
                    }
                    Err(e) => {
                        self.log(LogLevel::Error, &format!("Accept error: {e}"));
                        // Brief pause; accept errors like EMFILE otherwise spin hot
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
    }

    /// Screen a raw connection, then hand it to its own task
    ///
    /// Screening happens before any per-connection allocation so denied and
    /// over-limit peers cost a refusal write and nothing else.
    async fn dispatch_accept(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: &CancellationToken,
        acceptor: &StreamAcceptor,
    ) {
        if !self.admission.is_permitted(peer.ip()).await {
            self.log(
                LogLevel::Debug,
                &format!("Rejecting connection from {peer}: address not permitted"),
            );
            self.spawn_reject(stream, acceptor.clone(), 403, "Forbidden");
            return;
        }

        if self.registry.count().await >= self.config.max_connections {
            self.log(
                LogLevel::Warn,
                &format!("Connection limit reached, rejecting connection from {peer}"),
            );
            self.spawn_reject(stream, acceptor.clone(), 503, "Service Unavailable");
            return;
        }

        let shared = Arc::clone(self);
        let cancel = cancel.child_token();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            shared.handle_connection(stream, peer, acceptor, cancel).await;
        });
    }

    /// Refuse a connection off the accept loop's back
    fn spawn_reject(
        self: &Arc<Self>,
        stream: TcpStream,
        acceptor: StreamAcceptor,
        status: u16,
        reason: &'static str,
    ) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            // The refusal must be readable, so TLS still completes first
            let Ok(mut stream) = acceptor.accept(stream).await else {
                return;
            };
            // Drain the head first; closing with unread data can reset the
            // refusal away before the peer reads it
            let _ = handshake::read_request_head(&mut stream, shared.config.handshake_timeout).await;
            let response = handshake::simple_response(status, reason);
            let _ = handshake::write_response(&mut stream, response.as_bytes()).await;
        });
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        acceptor: StreamAcceptor,
        cancel: CancellationToken,
    ) {
        let mut stream = match acceptor.accept(stream).await {
            Ok(stream) => stream,
            Err(e) => {
                self.log(
                    LogLevel::Debug,
                    &format!("TLS accept failed for {peer}: {e}"),
                );
                return;
            }
        };

        let head = match handshake::read_request_head(&mut stream, self.config.handshake_timeout)
            .await
        {
            Ok(head) => head,
            Err(e) => {
                self.log(
                    LogLevel::Debug,
                    &format!("Failed to read request head from {peer}: {e}"),
                );
                if matches!(e, HandshakeError::HeadTooLarge) {
                    let response = handshake::simple_response(400, "Bad Request");
                    let _ = handshake::write_response(&mut stream, response.as_bytes()).await;
                }
                return;
            }
        };

        let (request, head_len) = match handshake::parse_request(&head, peer) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.log(
                    LogLevel::Debug,
                    &format!("Malformed request from {peer}: {e}"),
                );
                let response = handshake::simple_response(400, "Bad Request");
                let _ = handshake::write_response(&mut stream, response.as_bytes()).await;
                return;
            }
        };

        if handshake::is_upgrade_request(&request) {
            self.upgrade_connection(stream, request, &head[head_len..], cancel)
                .await;
        } else {
            self.serve_http(stream, request).await;
        }
    }

    /// Complete the upgrade, register the connection, and run its receive
    /// loop to the end
    async fn upgrade_connection(
        self: Arc<Self>,
        mut stream: ServerStream,
        request: HttpRequest,
        trailing: &[u8],
        cancel: CancellationToken,
    ) {
        let peer = request.remote_addr;

        let key = match handshake::validate_upgrade(&request) {
            Ok(key) => key,
            Err(e) => {
                self.log(
                    LogLevel::Debug,
                    &format!("Rejecting upgrade from {peer}: {e}"),
                );
                let response = handshake::simple_response(400, "Bad Request");
                let _ = handshake::write_response(&mut stream, response.as_bytes()).await;
                return;
            }
        };

        // A conforming peer sends nothing more until it has the 101
        if !trailing.is_empty() {
            self.log(
                LogLevel::Debug,
                &format!("Rejecting upgrade from {peer}: data before the handshake completed"),
            );
            let response = handshake::simple_response(400, "Bad Request");
            let _ = handshake::write_response(&mut stream, response.as_bytes()).await;
            return;
        }

        let accept_key = handshake::compute_accept_key(key);
        let response = handshake::upgrade_response(&accept_key);
        if let Err(e) = handshake::write_response(&mut stream, response.as_bytes()).await {
            self.log(
                LogLevel::Debug,
                &format!("Failed to complete upgrade with {peer}: {e}"),
            );
            return;
        }

        let ws_config = WebSocketConfig::default()
            .max_message_size(Some(self.config.max_message_size))
            .max_frame_size(Some(self.config.max_frame_size));
        let ws = WebSocketStream::from_raw_socket(stream, Role::Server, Some(ws_config)).await;
        let (sink, mut ws_stream) = ws.split();

        let id = Uuid::new_v4();
        let connection = Arc::new(ClientConnection::new(id, peer, sink, cancel));

        if let Err(e) = self.registry.register(Arc::clone(&connection)).await {
            self.log(
                LogLevel::Error,
                &format!("Failed to register connection from {peer}: {e}"),
            );
            connection
                .close_channel(CloseCode::Error, "identity collision")
                .await;
            return;
        }

        self.log(
            LogLevel::Info,
            &format!("Client {id} connected from {peer}"),
        );

        // Nothing is read from this connection until every connect handler
        // has returned
        self.events.client_connected(connection.info(), &request).await;

        let outcome = self.receive_loop(&connection, &mut ws_stream).await;
        self.teardown(&connection, outcome).await;
    }

    /// Read messages until the channel ends, the transport fails, or the
    /// connection scope cancels
    async fn receive_loop(
        &self,
        connection: &Arc<ClientConnection>,
        stream: &mut SplitStream<WebSocketStream<ServerStream>>,
    ) -> ReceiveOutcome {
        let id = connection.id();
        loop {
            tokio::select! {
                biased;
                _ = connection.cancel_token().cancelled() => return ReceiveOutcome::Cancelled,
                frame = stream.next() => match frame {
                    None => return ReceiveOutcome::ChannelNotOpen,
                    Some(Ok(Message::Text(text))) => {
                        self.accept_message(id, MessageKind::Text, Bytes::from(text)).await;
                    }
                    Some(Ok(Message::Binary(payload))) => {
                        self.accept_message(id, MessageKind::Binary, payload).await;
                    }
                    // The protocol layer answers pings on this read path;
                    // neither control frame counts as a received message
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) => return ReceiveOutcome::PeerClosed,
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                        return ReceiveOutcome::ChannelNotOpen;
                    }
                    Some(Err(e)) => {
                        self.log(
                            LogLevel::Debug,
                            &format!("Receive failure on client {id}: {e}"),
                        );
                        return ReceiveOutcome::TransportFailure;
                    }
                },
            }
        }
    }

    async fn accept_message(&self, id: ClientId, kind: MessageKind, payload: Bytes) {
        if self.config.enable_statistics {
            self.stats.record_received(payload.len() as u64);
        }
        self.events
            .message_received(IncomingMessage::new(id, kind, payload))
            .await;
    }

    /// Runs exactly once per registered connection, whichever way its
    /// receive loop ended
    async fn teardown(&self, connection: &Arc<ClientConnection>, outcome: ReceiveOutcome) {
        let id = connection.id();
        self.registry.unregister(id).await;
        connection.cancel();
        connection.release_channel().await;
        self.events.client_disconnected(id).await;
        self.log(
            LogLevel::Info,
            &format!("Client {id} disconnected: {outcome}"),
        );
    }

    /// Route a non-upgrade request to the raw handler, or refuse it
    async fn serve_http(&self, mut stream: ServerStream, request: HttpRequest) {
        let response = match &self.config.http_handler {
            Some(handler) => handler.handle(request).await,
            None => {
                self.log(
                    LogLevel::Debug,
                    &format!(
                        "Rejecting non-upgrade request {} {} from {}",
                        request.method, request.path, request.remote_addr
                    ),
                );
                HttpResponse::new(400, "Bad Request")
            }
        };
        let _ = handshake::write_response(&mut stream, &response.render()).await;
    }
}

fn build_message(kind: MessageKind, payload: Bytes) -> Option<Message> {
    match kind {
        MessageKind::Text => match Utf8Bytes::try_from(payload) {
            Ok(text) => Some(Message::Text(text)),
            Err(_) => None,
        },
        MessageKind::Binary => Some(Message::Binary(payload)),
    }
}

/// Builder for [`Server`]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Listen on a single address
    pub fn listen_address(mut self, address: IpAddr) -> Self {
        self.config.listen_addresses = vec![address];
        self
    }

    /// Listen on every given address
    pub fn listen_addresses(mut self, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        self.config.listen_addresses = addresses.into_iter().collect();
        self
    }

    /// Set the listen port shared by every listener
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set maximum concurrent connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Set maximum message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Admit only this address (adds to the allow-list)
    pub fn permit_address(mut self, address: IpAddr) -> Self {
        self.config.permitted_addresses.push(address);
        self
    }

    /// Replace the admission allow-list; an empty list admits everyone
    pub fn permitted_addresses(mut self, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        self.config.permitted_addresses = addresses.into_iter().collect();
        self
    }

    /// Enable or disable the statistics counters
    pub fn enable_statistics(mut self, enabled: bool) -> Self {
        self.config.enable_statistics = enabled;
        self
    }

    /// Receive every engine diagnostic line through a callback
    pub fn logger(mut self, sink: crate::logging::LogSink) -> Self {
        self.config.logger = Some(sink);
        self
    }

    /// Route non-upgrade HTTP requests to a handler
    pub fn http_handler(mut self, handler: Arc<dyn crate::handshake::HttpRequestHandler>) -> Self {
        self.config.http_handler = Some(handler);
        self
    }

    /// Serve TLS with the given certificate and key files
    #[cfg(feature = "tls-transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tls-transport")))]
    pub fn tls(mut self, cert_file: impl Into<String>, key_file: impl Into<String>) -> Self {
        self.config.tls = Some(crate::config::TlsConfig::new(cert_file, key_file));
        self.config.secure = true;
        self
    }

    /// Serve TLS and require client certificates signed by the CA bundle
    #[cfg(feature = "tls-transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tls-transport")))]
    pub fn mutual_tls(
        mut self,
        cert_file: impl Into<String>,
        key_file: impl Into<String>,
        ca_file: impl Into<String>,
    ) -> Self {
        self.config.tls = Some(crate::config::TlsConfig::new(cert_file, key_file).ca_file(ca_file));
        self.config.secure = true;
        self.config.accept_invalid_certificates = false;
        self
    }

    /// Build the server
    pub fn build(self) -> Result<Server> {
        Server::new(self.config)
    }
}
