//! # Server Metrics
//!
//! Counters for connection lifecycle and command traffic. Tests read them
//! through [`ServerMetrics::snapshot`] to check that clients close what they
//! open.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Connections accepted.
    pub connections_opened: u64,
    /// Connections whose handler has returned.
    pub connections_closed: u64,
    /// Requests dispatched.
    pub commands_total: u64,
    /// Error replies written.
    pub errors_total: u64,
}

impl MetricsSnapshot {
    /// Connections still open at snapshot time.
    pub fn connections_active(&self) -> u64 {
        self.connections_opened
            .saturating_sub(self.connections_closed)
    }
}

/// Thread-safe counters shared by every connection task.
///
/// `Ordering::Relaxed` is enough: no reader relies on ordering between
/// fields.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    commands_total: AtomicU64,
    errors_total: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_open(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            commands_total: self.commands_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_connections_follow_counters() {
        let metrics = ServerMetrics::new();
        metrics.record_open();
        metrics.record_open();
        metrics.record_close();
        metrics.record_command();
        metrics.record_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_active(), 1);
        assert_eq!(snapshot.commands_total, 1);
        assert_eq!(snapshot.errors_total, 1);
    }
}
