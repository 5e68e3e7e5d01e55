//! Per-connection session state.
//!
//! A session is owned by the task serving its connection; nothing here is
//! shared with other sessions.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::server::config::HopMode;

/// Unique session identifier.
pub type SessionId = u64;

/// Session lifecycle.
///
/// ```text
/// AwaitGreeting -> Greeted -> AwaitRequest -> RequestResolved -> Relaying -> Closed
/// ```
///
/// The entry hop goes straight from `Greeted` to `Relaying`; the terminal
/// hop starts at `AwaitRequest`. `Closed` is reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the client greeting
    AwaitGreeting,
    /// Negotiation reply sent
    Greeted,
    /// Waiting for the destination request
    AwaitRequest,
    /// Request parsed, dial target known
    RequestResolved,
    /// Bytes are being relayed
    Relaying,
    /// Terminal state
    Closed,
}

impl SessionState {
    /// Initial state for a hop running in `mode`.
    pub fn initial(mode: HopMode) -> Self {
        match mode {
            HopMode::Entry | HopMode::Standalone => SessionState::AwaitGreeting,
            HopMode::Terminal => SessionState::AwaitRequest,
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_advance(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (AwaitGreeting, Greeted)
                | (Greeted, AwaitRequest)
                | (Greeted, Relaying)
                | (AwaitRequest, RequestResolved)
                | (RequestResolved, Relaying)
        ) || (next == Closed && self != Closed)
    }
}

/// A single proxied connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer_addr: SocketAddr,
    mode: HopMode,
    state: SessionState,
    created_at: Instant,
}

impl Session {
    /// Create a session for a freshly accepted connection.
    pub fn new(id: SessionId, peer_addr: SocketAddr, mode: HopMode) -> Self {
        Self {
            id,
            peer_addr,
            mode,
            state: SessionState::initial(mode),
            created_at: Instant::now(),
        }
    }

    /// Get session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the hop mode this session runs under.
    pub fn mode(&self) -> HopMode {
        self.mode
    }

    /// Get session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_advance(next) {
            tracing::debug!(
                "session {}: ignoring transition {:?} -> {:?}",
                self.id,
                self.state,
                next
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Mark the session closed.
    pub fn close(&mut self) {
        self.advance(SessionState::Closed);
    }
}
