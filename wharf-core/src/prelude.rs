//! Prelude module for Wharf Core
//!
//! This module re-exports commonly used types and traits to make them
//! easily accessible for users of the library.

pub use crate::error::{ConfigError, Error, Result};
pub use crate::message::{ClientId, IncomingMessage, MessageKind};
pub use crate::stats::{ServerStatistics, StatisticsSnapshot};

// Re-export commonly used external dependencies
pub use bytes::{Bytes, BytesMut};
pub use uuid::Uuid;

// Feature-gated re-exports
#[cfg(feature = "serde")]
pub use serde::{Deserialize, Serialize};
