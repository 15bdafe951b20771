//! # Wharf Core
//!
//! Foundation types for the Wharf connection engine.
//!
//! This crate holds the protocol-agnostic pieces shared by the server engine
//! and by applications embedding it:
//!
//! - Error handling and types
//! - Message kinds and the received-message value
//! - The traffic statistics aggregator

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wharf-core/")]

// Core modules
pub mod error;
pub mod message;
pub mod stats;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use error::{ConfigError, Error, Result};
pub use message::{ClientId, IncomingMessage, MessageKind};
pub use stats::{ServerStatistics, StatisticsSnapshot};
