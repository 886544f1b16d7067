//! RAII-based timing utilities for measuring and logging probe durations.
//!
//! # Example
//!
//! ```rust,ignore
//! use mcpscout_util::timing::TimingGuard;
//!
//! async fn verify(name: &str) {
//!     let _timing = TimingGuard::probe("stdio", name);
//!     // ... handshake ...
//!     // Duration is logged when _timing is dropped
//! }
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, info};

/// RAII guard that measures and logs the duration of an operation.
///
/// Fast operations are logged at debug level, slow ones at info level.
pub struct TimingGuard {
    /// Kind of operation (e.g. "verify", "tools").
    operation: &'static str,
    /// Transport label (e.g. "stdio", "sse").
    transport: &'static str,
    /// Server the operation targets.
    server: String,
    start: Instant,
    info_threshold: Duration,
}

impl TimingGuard {
    /// Create a new timing guard.
    pub fn new(
        operation: &'static str,
        transport: &'static str,
        server: impl Into<String>,
    ) -> Self {
        let server = server.into();
        debug!(operation, transport, server = %server, "Starting operation");
        Self {
            operation,
            transport,
            server,
            start: Instant::now(),
            info_threshold: Duration::from_secs(2),
        }
    }

    /// Create a timing guard for a status verification.
    pub fn probe(transport: &'static str, server: impl Into<String>) -> Self {
        Self::new("verify", transport, server)
    }

    /// Create a timing guard for a tool listing.
    pub fn tools(transport: &'static str, server: impl Into<String>) -> Self {
        Self::new("tools", transport, server)
    }

    /// Set the threshold above which completion is logged at info level.
    pub fn with_info_threshold(mut self, threshold: Duration) -> Self {
        self.info_threshold = threshold;
        self
    }

    /// Get the elapsed time so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        if elapsed >= self.info_threshold {
            info!(
                operation = self.operation,
                transport = self.transport,
                server = %self.server,
                elapsed_ms,
                "Slow operation completed"
            );
        } else {
            debug!(
                operation = self.operation,
                transport = self.transport,
                server = %self.server,
                elapsed_ms,
                "Operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_guard_elapsed() {
        let guard = TimingGuard::probe("stdio", "test");
        std::thread::sleep(Duration::from_millis(10));
        assert!(guard.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timing_guard_threshold() {
        let guard = TimingGuard::tools("sse", "test").with_info_threshold(Duration::ZERO);
        assert_eq!(guard.info_threshold, Duration::ZERO);
        assert_eq!(guard.operation, "tools");
        assert_eq!(guard.transport, "sse");
    }
}
