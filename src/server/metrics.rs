//! Hop metrics collection.
//!
//! Aggregate counters only; nothing here identifies a session or a target.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::proxy::RelayReport;

/// Hop metrics collector.
pub struct HopMetrics {
    /// Hop start time
    start_time: Instant,
    /// Total connections accepted
    total_connections: AtomicU64,
    /// Current active sessions
    active_sessions: AtomicU64,
    /// Sessions that reached the relay phase
    relayed_sessions: AtomicU64,
    /// Greeting or request rejected, or timed out
    handshake_failures: AtomicU64,
    /// Upstream/target connect failures
    dial_failures: AtomicU64,
    /// Relays that ended on an I/O error
    relay_errors: AtomicU64,
    /// Bytes from the accepted side towards the dialed side
    bytes_upstream: AtomicU64,
    /// Bytes from the dialed side back to the accepted side
    bytes_downstream: AtomicU64,
}

impl HopMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            relayed_sessions: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            dial_failures: AtomicU64::new(0),
            relay_errors: AtomicU64::new(0),
            bytes_upstream: AtomicU64::new(0),
            bytes_downstream: AtomicU64::new(0),
        }
    }

    /// Increment total connections and active sessions.
    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active sessions.
    pub fn decrement_sessions(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment handshake failure count.
    pub fn increment_handshake_failures(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment dial failure count.
    pub fn increment_dial_failures(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Account a finished relay.
    pub fn record_relay(&self, report: &RelayReport) {
        self.relayed_sessions.fetch_add(1, Ordering::Relaxed);
        self.bytes_upstream
            .fetch_add(report.forward.bytes, Ordering::Relaxed);
        self.bytes_downstream
            .fetch_add(report.backward.bytes, Ordering::Relaxed);
        if report.error().is_some() {
            self.relay_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get total connections.
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Get active sessions.
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            total_connections: self.total_connections(),
            active_sessions: self.active_sessions(),
            relayed_sessions: self.relayed_sessions.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            relay_errors: self.relay_errors.load(Ordering::Relaxed),
            bytes_upstream: self.bytes_upstream.load(Ordering::Relaxed),
            bytes_downstream: self.bytes_downstream.load(Ordering::Relaxed),
        }
    }

    /// Format metrics as a simple text report.
    pub fn format_report(&self) -> String {
        let snapshot = self.snapshot();

        format!(
            r#"Hop Metrics
===========
Uptime: {} seconds

Sessions:
  Total:   {}
  Active:  {}
  Relayed: {} ({:.1}%)

Traffic:
  Upstream:   {} bytes
  Downstream: {} bytes
  Average:    {:.0} B/s

Errors:
  Handshake: {}
  Dial:      {}
  Relay:     {}
"#,
            snapshot.uptime_secs,
            snapshot.total_connections,
            snapshot.active_sessions,
            snapshot.relayed_sessions,
            snapshot.relay_rate() * 100.0,
            snapshot.bytes_upstream,
            snapshot.bytes_downstream,
            snapshot.throughput_bps(),
            snapshot.handshake_failures,
            snapshot.dial_failures,
            snapshot.relay_errors,
        )
    }
}

impl Default for HopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Seconds since the hop started
    pub uptime_secs: u64,
    /// Connections accepted
    pub total_connections: u64,
    /// Sessions still running
    pub active_sessions: u64,
    /// Sessions that reached the relay phase
    pub relayed_sessions: u64,
    /// Greetings or requests rejected or timed out
    pub handshake_failures: u64,
    /// Failed or timed-out dials
    pub dial_failures: u64,
    /// Relays that ended on an I/O error
    pub relay_errors: u64,
    /// Bytes relayed from the accepted side outwards
    pub bytes_upstream: u64,
    /// Bytes relayed back to the accepted side
    pub bytes_downstream: u64,
}

impl MetricsSnapshot {
    /// Fraction of accepted connections that reached the relay phase.
    pub fn relay_rate(&self) -> f64 {
        if self.total_connections == 0 {
            0.0
        } else {
            self.relayed_sessions as f64 / self.total_connections as f64
        }
    }

    /// Calculate throughput in bytes per second.
    pub fn throughput_bps(&self) -> f64 {
        if self.uptime_secs == 0 {
            0.0
        } else {
            (self.bytes_upstream + self.bytes_downstream) as f64 / self.uptime_secs as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::relay::DirectionReport;

    #[test]
    fn test_session_counting() {
        let metrics = HopMetrics::new();

        metrics.increment_connections();
        metrics.increment_connections();
        assert_eq!(metrics.total_connections(), 2);
        assert_eq!(metrics.active_sessions(), 2);

        metrics.decrement_sessions();
        assert_eq!(metrics.total_connections(), 2);
        assert_eq!(metrics.active_sessions(), 1);
    }

    #[test]
    fn test_record_relay() {
        let metrics = HopMetrics::new();

        let report = RelayReport {
            forward: DirectionReport {
                bytes: 100,
                ..Default::default()
            },
            backward: DirectionReport {
                bytes: 250,
                error: Some(std::io::ErrorKind::ConnectionReset.into()),
                aborted: false,
            },
        };
        metrics.record_relay(&report);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.relayed_sessions, 1);
        assert_eq!(snapshot.bytes_upstream, 100);
        assert_eq!(snapshot.bytes_downstream, 250);
        assert_eq!(snapshot.relay_errors, 1);
    }

    #[test]
    fn test_snapshot_rates() {
        let snapshot = MetricsSnapshot {
            uptime_secs: 10,
            total_connections: 4,
            relayed_sessions: 3,
            bytes_upstream: 600,
            bytes_downstream: 400,
            ..Default::default()
        };

        assert!((snapshot.relay_rate() - 0.75).abs() < 0.01);
        assert!((snapshot.throughput_bps() - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_format_report() {
        let metrics = HopMetrics::new();
        metrics.increment_connections();
        metrics.increment_dial_failures();

        let report = metrics.format_report();
        assert!(report.contains("Hop Metrics"));
        assert!(report.contains("Total:   1"));
        assert!(report.contains("Dial:      1"));
        assert!(report.contains("Relayed: 0 (0.0%)"));
        assert!(report.contains("Average:"));
    }
}
