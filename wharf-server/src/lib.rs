//! Wharf Server
//!
//! Connection lifecycle and message engine for long-lived WebSocket services.
//!
//! The server accepts many concurrent bidirectional connections, assigns each
//! a unique identity, pumps complete messages to the application through
//! event subscribers, serializes outbound writes per connection, and tears
//! everything down through a hierarchical cancellation scope.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wharf_server::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> wharf_core::Result<()> {
//!     let server = Server::builder()
//!         .listen_address([127, 0, 0, 1].into())
//!         .port(9000)
//!         .build()?;
//!
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     server.shutdown().await;
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wharf-server/")]

// Public modules
pub mod admission;
pub mod config;
pub mod connection;
pub mod events;
pub mod handshake;
pub mod logging;
pub mod registry;
pub mod server;
pub mod transport;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use admission::AdmissionFilter;
pub use config::{ServerConfig, TlsConfig};
pub use connection::{ClientConnection, ClientInfo, ReceiveOutcome};
pub use events::{EventHandler, EventDispatcher};
pub use handshake::{HttpRequest, HttpRequestHandler, HttpResponse, UpgradeRequest};
pub use logging::{LogLevel, LogSink};
pub use registry::ConnectionRegistry;
pub use server::{Server, ServerBuilder};
