//! Peer admission filtering for the Wharf server
//!
//! This module provides the allow-list of permitted source addresses. The
//! accept loops consult it once per inbound connection, before any protocol
//! work happens; established connections are never re-checked.

use std::collections::HashSet;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Allow-list of permitted peer addresses
///
/// An empty filter admits every peer. A non-empty filter admits only the
/// listed addresses; everyone else is rejected at accept time with a
/// rejection status. The list is mutable while the server runs; changes
/// apply to subsequent accepts only.
#[derive(Debug, Default)]
pub struct AdmissionFilter {
    permitted: RwLock<HashSet<IpAddr>>,
}

impl AdmissionFilter {
    /// Create an unrestricted filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter seeded with permitted addresses
    pub fn with_permitted(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            permitted: RwLock::new(addresses.into_iter().collect()),
        }
    }

    /// Check whether a peer address is admitted
    pub async fn is_permitted(&self, peer: IpAddr) -> bool {
        let permitted = self.permitted.read().await;
        permitted.is_empty() || permitted.contains(&peer)
    }

    /// Add an address to the allow-list, returning `false` if already present
    pub async fn permit(&self, address: IpAddr) -> bool {
        self.permitted.write().await.insert(address)
    }

    /// Remove an address from the allow-list, returning `false` if absent
    pub async fn revoke(&self, address: IpAddr) -> bool {
        self.permitted.write().await.remove(&address)
    }

    /// Replace the allow-list wholesale
    pub async fn set_permitted(&self, addresses: impl IntoIterator<Item = IpAddr>) {
        let mut permitted = self.permitted.write().await;
        permitted.clear();
        permitted.extend(addresses);
    }

    /// Empty the allow-list, admitting every peer again
    pub async fn clear(&self) {
        self.permitted.write().await.clear();
    }

    /// Check whether the filter currently admits everyone
    pub async fn is_unrestricted(&self) -> bool {
        self.permitted.read().await.is_empty()
    }

    /// Snapshot of the currently permitted addresses
    pub async fn permitted(&self) -> Vec<IpAddr> {
        self.permitted.read().await.iter().copied().collect()
    }
}
