//! Transport streams for the Wharf server
//!
//! This module unifies plain TCP and TLS connections under one duplex stream
//! type so the handshake path and the framing collaborator stay
//! transport-agnostic. Listener binding for all configured addresses lives
//! here as well.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use wharf_core::Result;

/// Duplex byte stream for one accepted connection
#[derive(Debug)]
pub enum ServerStream {
    /// Unencrypted TCP
    Plain(TcpStream),
    /// TLS over TCP
    #[cfg(feature = "tls-transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "tls-transport")))]
    Tls(Box<tokio_rustls::server::TlsStream<TcpStream>>),
}

impl ServerStream {
    /// Peer address of the underlying socket
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            ServerStream::Plain(stream) => stream.peer_addr(),
            #[cfg(feature = "tls-transport")]
            ServerStream::Tls(stream) => stream.get_ref().0.peer_addr(),
        }
    }

    /// Local address of the underlying socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            ServerStream::Plain(stream) => stream.local_addr(),
            #[cfg(feature = "tls-transport")]
            ServerStream::Tls(stream) => stream.get_ref().0.local_addr(),
        }
    }
}

impl AsyncRead for ServerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls-transport")]
            ServerStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ServerStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ServerStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls-transport")]
            ServerStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls-transport")]
            ServerStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls-transport")]
            ServerStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Turns accepted TCP sockets into [`ServerStream`]s for one server run
///
/// The TLS variant shares a single rustls acceptor across every listener of
/// the run.
#[derive(Clone)]
pub(crate) enum StreamAcceptor {
    /// Pass the socket through unencrypted
    Plain,
    /// Terminate TLS before anything is read
    #[cfg(feature = "tls-transport")]
    Tls(tokio_rustls::TlsAcceptor),
}

impl StreamAcceptor {
    pub(crate) async fn accept(&self, stream: TcpStream) -> io::Result<ServerStream> {
        match self {
            StreamAcceptor::Plain => Ok(ServerStream::Plain(stream)),
            #[cfg(feature = "tls-transport")]
            StreamAcceptor::Tls(acceptor) => {
                let stream = acceptor.accept(stream).await?;
                Ok(ServerStream::Tls(Box::new(stream)))
            }
        }
    }
}

/// Bind one listener per configured address on the shared port
///
/// With port 0 each listener receives its own ephemeral port; callers query
/// the bound addresses from the returned listeners.
pub async fn bind_all(addresses: &[IpAddr], port: u16) -> Result<Vec<TcpListener>> {
    let mut listeners = Vec::with_capacity(addresses.len());
    for address in addresses {
        let listener = TcpListener::bind(SocketAddr::new(*address, port)).await?;
        listeners.push(listener);
    }
    Ok(listeners)
}
