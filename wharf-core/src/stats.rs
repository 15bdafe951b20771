//! Traffic statistics for Wharf
//!
//! This module provides the lock-free statistics aggregator shared by the
//! receive loops and the send path. Counters are plain atomics updated with
//! relaxed ordering; readers never block writers and individual counters are
//! exact even under heavy concurrency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Aggregate traffic statistics for a running server
///
/// The start time is fixed at construction and survives [`reset`]; the four
/// traffic counters increase monotonically between resets.
///
/// [`reset`]: ServerStatistics::reset
#[derive(Debug)]
pub struct ServerStatistics {
    started_at: SystemTime,
    start_instant: Instant,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ServerStatistics {
    /// Create a new statistics aggregator with all counters at zero
    pub fn new() -> Self {
        Self {
            started_at: SystemTime::now(),
            start_instant: Instant::now(),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Record one complete received message of the given size
    pub fn record_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one successfully sent message of the given size
    pub fn record_sent(&self, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Wall-clock time this aggregator was created
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time elapsed since this aggregator was created
    pub fn uptime(&self) -> Duration {
        self.start_instant.elapsed()
    }

    /// Total complete messages received
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Total payload bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Total messages sent successfully
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Total payload bytes sent successfully
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Average received message size in bytes, zero when nothing was received
    pub fn average_received_size(&self) -> u64 {
        let count = self.messages_received();
        if count == 0 {
            0
        } else {
            self.bytes_received() / count
        }
    }

    /// Average sent message size in bytes, zero when nothing was sent
    pub fn average_sent_size(&self) -> u64 {
        let count = self.messages_sent();
        if count == 0 {
            0
        } else {
            self.bytes_sent() / count
        }
    }

    /// Zero the traffic counters, preserving the start time
    pub fn reset(&self) {
        self.messages_received.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.messages_sent.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters and derived values
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            started_at: self.started_at,
            uptime: self.uptime(),
            messages_received: self.messages_received(),
            bytes_received: self.bytes_received(),
            messages_sent: self.messages_sent(),
            bytes_sent: self.bytes_sent(),
            average_received_size: self.average_received_size(),
            average_sent_size: self.average_sent_size(),
        }
    }
}

impl Default for ServerStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the traffic statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatisticsSnapshot {
    /// Wall-clock time the aggregator was created
    pub started_at: SystemTime,
    /// Time elapsed since the aggregator was created
    pub uptime: Duration,
    /// Total complete messages received
    pub messages_received: u64,
    /// Total payload bytes received
    pub bytes_received: u64,
    /// Total messages sent successfully
    pub messages_sent: u64,
    /// Total payload bytes sent successfully
    pub bytes_sent: u64,
    /// Average received message size in bytes
    pub average_received_size: u64,
    /// Average sent message size in bytes
    pub average_sent_size: u64,
}
