//! Concurrent connection registry
//!
//! The registry is the single source of truth for which connections are
//! currently active. Insert, remove, lookup, and enumeration are all safe
//! under concurrency; enumeration copies the membership out so callers never
//! iterate while holding the lock.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use wharf_core::ClientId;

use crate::connection::ClientConnection;

/// A record with this identity is already registered
///
/// Identities are random per accept, so this indicates identity reuse and is
/// treated as an accept-path failure, not a recoverable condition.
#[derive(Debug, Error)]
#[error("connection {0} is already registered")]
pub struct DuplicateIdentity(pub ClientId);

/// Mapping from connection identity to live connection record
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ClientId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly accepted record
    pub async fn register(&self, record: Arc<ClientConnection>) -> Result<(), DuplicateIdentity> {
        let mut connections = self.connections.write().await;
        match connections.entry(record.id()) {
            Entry::Occupied(_) => Err(DuplicateIdentity(record.id())),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Atomically remove and return a record
    ///
    /// Safe to call again for the same identity; the second call observes
    /// `None`. The two teardown paths race through here, so whichever loses
    /// simply skips its cleanup.
    pub async fn unregister(&self, id: ClientId) -> Option<Arc<ClientConnection>> {
        self.connections.write().await.remove(&id)
    }

    /// Fetch a record without removing it
    pub async fn lookup(&self, id: ClientId) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Check membership
    pub async fn contains(&self, id: ClientId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Copy of the current membership identities
    pub async fn snapshot(&self) -> Vec<ClientId> {
        self.connections.read().await.keys().copied().collect()
    }

    /// Copy of the current records
    pub async fn records(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of registered connections
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}
