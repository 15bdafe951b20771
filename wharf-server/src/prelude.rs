//! Prelude module with common imports
//!
//! This module re-exports the most commonly used types and traits
//! from the wharf-server crate for ergonomic imports.

// Server types
pub use crate::server::{Server, ServerBuilder};
pub use crate::config::{ServerConfig, TlsConfig};
pub use crate::connection::{ClientInfo, ReceiveOutcome};
pub use crate::events::EventHandler;
pub use crate::handshake::{HttpRequest, HttpRequestHandler, HttpResponse, UpgradeRequest};
pub use crate::logging::{LogLevel, LogSink};

// Re-export core types
pub use wharf_core::prelude::*;

// Cancellation scopes are part of the public surface
pub use tokio_util::sync::CancellationToken;
