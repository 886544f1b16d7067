//! Per-call handshake bookkeeping.

use crate::error::McpError;
use crate::protocol::RequestIds;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

/// Where a handshake currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Idle,
    Connecting,
    /// SSE only: stream open, no `endpoint` event yet.
    AwaitingEndpoint,
    AwaitingInitialize,
    /// Tool getters only: `tools/list` sent.
    AwaitingTools,
    Verified,
    Failed,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakePhase::Idle => "before connecting",
            HandshakePhase::Connecting => "connecting",
            HandshakePhase::AwaitingEndpoint => "awaiting endpoint event",
            HandshakePhase::AwaitingInitialize => "awaiting initialize response",
            HandshakePhase::AwaitingTools => "awaiting tools/list response",
            HandshakePhase::Verified => "after verification",
            HandshakePhase::Failed => "after failure",
        };
        write!(f, "{s}")
    }
}

/// State of one verifier or getter invocation.
///
/// The phase lives behind a shared handle so the caller can still read it
/// after the timed future has been dropped at the deadline.
#[derive(Debug, Clone)]
pub struct HandshakeSession {
    server: String,
    transport: &'static str,
    budget: Duration,
    started: Instant,
    phase: Arc<Mutex<HandshakePhase>>,
    ids: Arc<Mutex<RequestIds>>,
}

impl HandshakeSession {
    pub fn new(server: impl Into<String>, transport: &'static str, budget: Duration) -> Self {
        Self {
            server: server.into(),
            transport,
            budget,
            started: Instant::now(),
            phase: Arc::new(Mutex::new(HandshakePhase::Idle)),
            ids: Arc::new(Mutex::new(RequestIds::new())),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn transport(&self) -> &'static str {
        self.transport
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn next_id(&self) -> u64 {
        match self.ids.lock() {
            Ok(mut ids) => ids.next_id(),
            Err(poisoned) => poisoned.into_inner().next_id(),
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        match self.phase.lock() {
            Ok(phase) => *phase,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Move to `phase`.
    pub fn enter(&self, phase: HandshakePhase) {
        trace!(
            server = %self.server,
            transport = self.transport,
            ?phase,
            "Handshake phase"
        );
        match self.phase.lock() {
            Ok(mut current) => *current = phase,
            Err(poisoned) => *poisoned.into_inner() = phase,
        }
    }

    /// The error for a budget that ran out in the current phase.
    pub fn timed_out(&self) -> McpError {
        let phase = self.phase();
        self.enter(HandshakePhase::Failed);
        McpError::timeout(phase, self.budget)
    }

    /// Record the final outcome of the call.
    pub fn finish<T>(&self, result: &Result<T, McpError>) {
        self.enter(if result.is_ok() {
            HandshakePhase::Verified
        } else {
            HandshakePhase::Failed
        });
    }
}
