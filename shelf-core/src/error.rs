//! Domain-specific error types for the shelf protocol.
//!
//! All fallible operations return `Result<T, ShelfError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the shelf protocol.
#[derive(Debug, Error)]
pub enum ShelfError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The peer answered the handshake with something other than the
    /// expected token.
    #[error("handshake failed: expected {expected:?}, received {received:?}")]
    Handshake {
        expected: &'static str,
        received: String,
    },

    /// The peer sent a reply that does not fit the current exchange.
    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(String),

    /// An incoming line exceeded the codec limit without a newline.
    #[error("line too long: more than {max} bytes without a newline")]
    LineTooLong { max: usize },

    /// A command line could not be parsed.
    #[error("invalid command: {0}")]
    Command(#[from] CommandError),

    // ── Channel Errors ───────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// A previous send failed; the writer can no longer be used.
    #[error("channel broken by an earlier failed send")]
    ChannelBroken,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Store Errors ─────────────────────────────────────────────
    /// The file store could not complete an operation on `path`.
    #[error("store error on {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory argument escapes the store root.
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl ShelfError {
    /// `true` when a send or receive exceeded the message timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ShelfError::Timeout(_))
    }

    /// `true` when the peer went away (orderly close or a reset/broken pipe).
    pub fn is_disconnect(&self) -> bool {
        match self {
            ShelfError::Closed => true,
            ShelfError::Connection(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ShelfError::Store {
            path: path.into(),
            source,
        }
    }
}

// ── CommandError ─────────────────────────────────────────────────

/// Typed error for command lines that do not map to a known command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The line held no tokens at all.
    #[error("empty command")]
    Empty,

    /// The first token is not a known verb.
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),

    /// The verb is known but the number of arguments is wrong.
    #[error("{verb} takes {expected} argument(s), received {received}")]
    Arity {
        verb: &'static str,
        expected: usize,
        received: usize,
    },
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ShelfError {
    fn from(s: String) -> Self {
        ShelfError::Other(s)
    }
}

impl From<&str> for ShelfError {
    fn from(s: &str) -> Self {
        ShelfError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = ShelfError::Handshake {
            expected: "start",
            received: "bonjour".into(),
        };
        assert!(e.to_string().contains("start"));
        assert!(e.to_string().contains("bonjour"));

        let e = ShelfError::Command(CommandError::Arity {
            verb: "GET",
            expected: 2,
            received: 1,
        });
        assert!(e.to_string().contains("GET takes 2"));
    }

    #[test]
    fn from_string() {
        let e: ShelfError = "something broke".into();
        assert!(matches!(e, ShelfError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: ShelfError = io_err.into();
        assert!(matches!(e, ShelfError::Connection(_)));
        assert!(e.is_disconnect());
        assert!(!e.is_timeout());
    }

    #[test]
    fn classify_timeout_and_close() {
        assert!(ShelfError::Timeout(Duration::from_secs(20)).is_timeout());
        assert!(ShelfError::Closed.is_disconnect());
        assert!(!ShelfError::ChannelBroken.is_disconnect());
    }
}
