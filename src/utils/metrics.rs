//! Observability and Metrics
//!
//! Counters for framing activity. Sockets record into a shared
//! `Arc<Metrics>`; by default that is the process-wide instance returned by
//! [`global_metrics`].
//!
//! Uses atomic counters so snapshots can be taken from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Metrics collector for packet socket operations
#[derive(Debug)]
pub struct Metrics {
    /// Packets accepted by `send`
    pub packets_sent: AtomicU64,
    /// Payload bytes accepted by `send`
    pub bytes_sent: AtomicU64,
    /// Packets shed because a frame was still draining
    pub packets_dropped: AtomicU64,
    /// Bytes queued through `send_raw`
    pub raw_bytes_queued: AtomicU64,
    /// Packets delivered to consumers
    pub packets_received: AtomicU64,
    /// Payload bytes delivered to consumers
    pub bytes_received: AtomicU64,
    /// Input buffer overflows
    pub buffer_overflows: AtomicU64,
    /// Receive failures other than would-block
    pub read_errors: AtomicU64,
    /// Inbound connections accepted by listeners
    pub connections_accepted: AtomicU64,
    /// Failed accept attempts
    pub accept_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            raw_bytes_queued: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            buffer_overflows: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn raw_queued(&self, byte_count: u64) {
        self.raw_bytes_queued.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn packet_received(&self, byte_count: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn buffer_overflow(&self) {
        self.buffer_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            raw_bytes_queued: self.raw_bytes_queued.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_sent = snapshot.packets_sent,
            bytes_sent = snapshot.bytes_sent,
            packets_dropped = snapshot.packets_dropped,
            raw_bytes_queued = snapshot.raw_bytes_queued,
            packets_received = snapshot.packets_received,
            bytes_received = snapshot.bytes_received,
            buffer_overflows = snapshot.buffer_overflows,
            read_errors = snapshot.read_errors,
            connections_accepted = snapshot.connections_accepted,
            accept_errors = snapshot.accept_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Packet socket metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_dropped: u64,
    pub raw_bytes_queued: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub buffer_overflows: u64,
    pub read_errors: u64,
    pub connections_accepted: u64,
    pub accept_errors: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::new()));

/// Get the global metrics instance
pub fn global_metrics() -> Arc<Metrics> {
    METRICS.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.packet_sent(10);
        metrics.packet_sent(5);
        metrics.packet_dropped();
        metrics.packet_received(7);

        let snap = metrics.snapshot();
        assert_eq!(snap.packets_sent, 2);
        assert_eq!(snap.bytes_sent, 15);
        assert_eq!(snap.packets_dropped, 1);
        assert_eq!(snap.packets_received, 1);
        assert_eq!(snap.bytes_received, 7);
        assert_eq!(snap.buffer_overflows, 0);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&global_metrics(), &global_metrics()));
    }
}
