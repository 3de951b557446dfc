//! Per-session lifecycle.
//!
//! Provides a `SessionPhase` enum that models a server-side session,
//! with validated transitions that return `Result` instead of panicking.

use std::time::Instant;

use crate::error::ShelfError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of a server-side session.
///
/// ```text
///  AwaitHandshake ──► Active ──► Terminated
///        │                            ▲
///        └────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// `hello` sent (or about to be); waiting for `start`.
    #[default]
    AwaitHandshake,

    /// Handshake complete; dispatching one command per message.
    Active {
        /// When the session entered the `Active` phase.
        since: Instant,
    },

    /// Connection closed. Terminal.
    Terminated,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitHandshake => write!(f, "AwaitHandshake"),
            Self::Active { .. } => write!(f, "Active"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// How long the session has been active. `None` outside `Active`.
    pub fn active_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Active { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Active`.
    ///
    /// Valid from: `AwaitHandshake`.
    pub fn complete_handshake(&mut self) -> Result<(), ShelfError> {
        match self {
            Self::AwaitHandshake => {
                *self = Self::Active {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(ShelfError::Other(format!(
                "cannot complete handshake in phase {self}"
            ))),
        }
    }

    /// Transition to `Terminated`. Valid from any phase; idempotent.
    pub fn terminate(&mut self) {
        *self = Self::Terminated;
    }
}

// ── Tests ────────────────────────────────────────────────────────
