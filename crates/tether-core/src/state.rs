//! Connection lifecycle state tracking.
//!
//! Provides [`ConnectionState`] and [`ConnectionHandle`] for observing the
//! lifecycle of a remote session. The handle is cheap to clone and broadcasts
//! every transition to all subscribers, so UI layers and supervisors can
//! react to the link going up or down without polling.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::{Error, Result};

// ============================================================================
// ConnectionState
// ============================================================================

/// State of a remote session in its lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionState {
    /// No session is open.
    Inactive,
    /// The SSH connection or the worker server is being brought up.
    Connecting,
    /// The session is open, the server is running, and the port is forwarded.
    Active,
    /// The session is being torn down.
    Stopping,
    /// The session failed or the link was lost.
    Error(String),
}

impl ConnectionState {
    /// Returns `true` if the session is fully usable.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if the session is settled (Inactive or Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Inactive | Self::Error(_))
    }

    /// Returns `true` if the session is in the Error state.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// A single observed state transition, with a human-readable message.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionEvent {
    /// The state entered.
    pub state: ConnectionState,
    /// Why the transition happened.
    pub message: String,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

impl ConnectionEvent {
    fn new(state: ConnectionState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

// ============================================================================
// ConnectionHandle
// ============================================================================

/// Thread-safe handle for observing and updating session state.
///
/// Cheap to clone (Arc internals). State changes are broadcast
/// to all subscribers via a watch channel.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionHandleInner>,
}

struct ConnectionHandleInner {
    name: String,
    tx: watch::Sender<ConnectionEvent>,
    created_at: Instant,
}

impl ConnectionHandle {
    /// Create a new handle for the named session.
    ///
    /// Initial state is [`ConnectionState::Inactive`].
    pub fn new(name: impl Into<String>) -> Self {
        let initial = ConnectionEvent::new(ConnectionState::Inactive, "session created");
        let (tx, _rx) = watch::channel(initial);
        Self {
            inner: Arc::new(ConnectionHandleInner {
                name: name.into(),
                tx,
                created_at: Instant::now(),
            }),
        }
    }

    /// Get the session name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the current session state.
    pub fn state(&self) -> ConnectionState {
        self.inner.tx.borrow().state.clone()
    }

    /// Get the most recent transition event.
    pub fn last_event(&self) -> ConnectionEvent {
        self.inner.tx.borrow().clone()
    }

    /// Update the session state with an explanatory message.
    ///
    /// All subscribers are notified of the change.
    pub fn set_state(&self, state: ConnectionState, message: impl Into<String>) {
        let event = ConnectionEvent::new(state, message);
        tracing::info!(
            session = %self.inner.name,
            state = %event.state,
            message = %event.message,
            "connection state changed"
        );
        self.inner.tx.send_replace(event);
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionEvent> {
        self.inner.tx.subscribe()
    }

    /// Wait until the session reaches Active, enters Error, or times out.
    pub async fn wait_active(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.subscribe();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        // Check current state first
        {
            let state = rx.borrow_and_update().state.clone();
            match state {
                ConnectionState::Active => return Ok(()),
                ConnectionState::Error(reason) => return Err(Error::ssh(reason)),
                _ => {}
            }
        }

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(Error::Timeout {
                        seconds: timeout.as_secs(),
                    });
                }
                result = rx.changed() => {
                    if result.is_err() {
                        return Err(Error::ssh(format!(
                            "session '{}' handle closed",
                            self.inner.name
                        )));
                    }
                    let state = rx.borrow().state.clone();
                    match state {
                        ConnectionState::Active => return Ok(()),
                        ConnectionState::Error(reason) => return Err(Error::ssh(reason)),
                        _ => continue,
                    }
                }
            }
        }
    }

    /// Elapsed time since the handle was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.created_at.elapsed()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
