//! Relay counters
//!
//! Plain atomics, bumped from the lifecycle and routing paths and read as a
//! point-in-time snapshot for periodic logging.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RelayStats {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    identified: AtomicU64,
    delivered_direct: AtomicU64,
    push_delivered: AtomicU64,
    push_failed: AtomicU64,
    unreachable: AtomicU64,
    unidentified: AtomicU64,
    signals_dropped: AtomicU64,
    queue_overflow: AtomicU64,
}

/// Copy of the counters at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub identified: u64,
    pub delivered_direct: u64,
    pub push_delivered: u64,
    pub push_failed: u64,
    pub unreachable: u64,
    pub unidentified: u64,
    pub signals_dropped: u64,
    pub queue_overflow: u64,
}

impl StatsSnapshot {
    /// Connections currently open
    pub fn active_connections(&self) -> u64 {
        self.connections_opened
            .saturating_sub(self.connections_closed)
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connections={} (opened {}, closed {}), identified={}, direct={}, push ok={} failed={}, \
             unreachable={}, unidentified={}, signals dropped={}, queue overflow={}",
            self.active_connections(),
            self.connections_opened,
            self.connections_closed,
            self.identified,
            self.delivered_direct,
            self.push_delivered,
            self.push_failed,
            self.unreachable,
            self.unidentified,
            self.signals_dropped,
            self.queue_overflow
        )
    }
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn identified(&self) {
        self.identified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered_direct(&self) {
        self.delivered_direct.fetch_add(1, Ordering::Relaxed);
    }

    pub fn push_delivered(&self) {
        self.push_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn push_failed(&self) {
        self.push_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unreachable(&self) {
        self.unreachable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unidentified(&self) {
        self.unidentified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn signal_dropped(&self) {
        self.signals_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_overflow(&self) {
        self.queue_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            identified: self.identified.load(Ordering::Relaxed),
            delivered_direct: self.delivered_direct.load(Ordering::Relaxed),
            push_delivered: self.push_delivered.load(Ordering::Relaxed),
            push_failed: self.push_failed.load(Ordering::Relaxed),
            unreachable: self.unreachable.load(Ordering::Relaxed),
            unidentified: self.unidentified.load(Ordering::Relaxed),
            signals_dropped: self.signals_dropped.load(Ordering::Relaxed),
            queue_overflow: self.queue_overflow.load(Ordering::Relaxed),
        }
    }
}
