use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{DEFAULT_MAX_LINE_LENGTH, ShelfCodec};
use crate::error::ShelfError;
use crate::network::history::{Direction, MessageHistory};

type BoxedRead = Box<dyn AsyncRead + Send + Sync + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Default bound on a single send or receive.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Per-channel framing and timeout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Applied to each individual send or receive, never to a whole exchange.
    pub message_timeout: Duration,
    /// Longest accepted incoming line, terminator included.
    pub max_line_length: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// A byte stream seen as a sequence of newline-terminated messages.
///
/// The stream is split so that the write half can be handed out as a
/// [`MessageWriter`] (for instance to the shutdown drain) while the
/// session keeps reading.
pub struct FramedChannel {
    reader: MessageReader,
    writer: MessageWriter,
}

impl FramedChannel {
    pub fn new<S>(stream: S, settings: ChannelSettings) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Sync + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let read_half: BoxedRead = Box::new(read_half);
        let write_half: BoxedWrite = Box::new(write_half);

        Self {
            reader: MessageReader {
                inner: FramedRead::new(
                    read_half,
                    ShelfCodec::with_max_length(settings.max_line_length),
                ),
                timeout: settings.message_timeout,
                history: None,
            },
            writer: MessageWriter {
                inner: Arc::new(Mutex::new(FramedWrite::new(write_half, ShelfCodec::new()))),
                timeout: settings.message_timeout,
                broken: Arc::new(AtomicBool::new(false)),
                history: None,
            },
        }
    }

    /// Mirror every message of this channel into `history`.
    pub fn with_history(mut self, history: Arc<MessageHistory>) -> Self {
        self.reader.history = Some(Arc::clone(&history));
        self.writer.history = Some(history);
        self
    }

    pub async fn send(&self, message: &str) -> Result<(), ShelfError> {
        self.writer.send(message).await
    }

    pub async fn receive(&mut self) -> Result<String, ShelfError> {
        self.reader.receive().await
    }

    /// Receive one message and strip surrounding whitespace.
    pub async fn receive_trimmed(&mut self) -> Result<String, ShelfError> {
        let line = self.reader.receive().await?;
        Ok(line.trim().to_string())
    }

    /// A cloneable handle on the write half.
    pub fn writer(&self) -> MessageWriter {
        self.writer.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.reader.timeout
    }

    /// Flush and shut down the write half.
    pub async fn close(&self) {
        self.writer.close().await;
    }
}

// ── MessageReader ────────────────────────────────────────────────

/// Read half of a [`FramedChannel`].
pub struct MessageReader {
    inner: FramedRead<BoxedRead, ShelfCodec>,
    timeout: Duration,
    history: Option<Arc<MessageHistory>>,
}

impl MessageReader {
    /// Read up to and including the next `\n`.
    ///
    /// Distinguishes a timeout ([`ShelfError::Timeout`]) from the peer
    /// closing the stream ([`ShelfError::Closed`]) and other I/O errors.
    pub async fn receive(&mut self) -> Result<String, ShelfError> {
        match tokio::time::timeout(self.timeout, self.inner.next()).await {
            Err(_) => Err(ShelfError::Timeout(self.timeout)),
            Ok(None) => Err(ShelfError::Closed),
            Ok(Some(Err(e))) => Err(e),
            Ok(Some(Ok(line))) => {
                if let Some(history) = &self.history {
                    history.record(Direction::Received, &line);
                }
                Ok(line)
            }
        }
    }
}

// ── MessageWriter ────────────────────────────────────────────────

/// Cloneable write half of a [`FramedChannel`].
///
/// A failed or timed-out send marks the writer broken; every later send
/// through any clone returns [`ShelfError::ChannelBroken`].
#[derive(Clone)]
pub struct MessageWriter {
    inner: Arc<Mutex<FramedWrite<BoxedWrite, ShelfCodec>>>,
    timeout: Duration,
    broken: Arc<AtomicBool>,
    history: Option<Arc<MessageHistory>>,
}

impl MessageWriter {
    /// Append `\n` if absent, write, flush, all within the message timeout.
    pub async fn send(&self, message: &str) -> Result<(), ShelfError> {
        if self.broken.load(Ordering::Acquire) {
            return Err(ShelfError::ChannelBroken);
        }

        let attempt = tokio::time::timeout(self.timeout, async {
            let mut sink = self.inner.lock().await;
            sink.send(message).await
        })
        .await;

        let result = match attempt {
            Err(_) => Err(ShelfError::Timeout(self.timeout)),
            Ok(result) => result,
        };

        match result {
            Ok(()) => {
                if let Some(history) = &self.history {
                    history.record(Direction::Sent, message);
                }
                Ok(())
            }
            Err(e) => {
                self.broken.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Best-effort flush and shutdown of the underlying write half.
    pub async fn close(&self) {
        let closing = tokio::time::timeout(self.timeout, async {
            let mut sink = self.inner.lock().await;
            SinkExt::<&str>::close(&mut *sink).await
        })
        .await;
        if let Ok(Err(e)) = closing {
            tracing::debug!("closing channel: {e}");
        }
        self.broken.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for MessageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWriter")
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn settings(timeout_ms: u64) -> ChannelSettings {
        ChannelSettings {
            message_timeout: Duration::from_millis(timeout_ms),
            ..ChannelSettings::default()
        }
    }

    #[tokio::test]
    async fn scripted_exchange() {
        let stream = tokio_test::io::Builder::new()
            .write(b"hello\n")
            .read(b"start\n")
            .write(b"ok\n")
            .build();
        let mut channel = FramedChannel::new(stream, ChannelSettings::default());

        channel.send("hello").await.unwrap();
        assert_eq!(channel.receive().await.unwrap(), "start\n");
        channel.send("ok\n").await.unwrap();
    }

    #[tokio::test]
    async fn receive_reports_closed_stream() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut channel = FramedChannel::new(server, settings(500));
        assert!(matches!(channel.receive().await, Err(ShelfError::Closed)));
    }

    #[tokio::test]
    async fn receive_times_out_on_silent_peer() {
        let (_client, server) = tokio::io::duplex(64);
        let mut channel = FramedChannel::new(server, settings(50));
        let err = channel.receive().await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn stalled_send_breaks_the_writer() {
        // A 4-byte pipe nobody drains: the second write cannot complete.
        let (_client, server) = tokio::io::duplex(4);
        let channel = FramedChannel::new(server, settings(50));

        let err = channel.send("far too long for the pipe").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            channel.send("again").await,
            Err(ShelfError::ChannelBroken)
        ));
        assert!(channel.writer().is_broken());
    }

    #[tokio::test]
    async fn history_mirrors_both_directions() {
        let (mut client, server) = tokio::io::duplex(256);
        let history = Arc::new(MessageHistory::new(8));
        let mut channel =
            FramedChannel::new(server, settings(500)).with_history(Arc::clone(&history));

        channel.send("hello").await.unwrap();
        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");

        client.write_all(b"start\n").await.unwrap();
        assert_eq!(channel.receive_trimmed().await.unwrap(), "start");

        let entries = history.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, Direction::Sent);
        assert_eq!(entries[1].message, "start");
    }

    #[tokio::test]
    async fn cloned_writer_shares_the_stream() {
        let (mut client, server) = tokio::io::duplex(256);
        let channel = FramedChannel::new(server, settings(500));
        let writer = channel.writer();

        channel.send("one").await.unwrap();
        writer.send("two").await.unwrap();

        let mut buf = [0u8; 8];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"one\ntwo\n");
    }

    #[tokio::test]
    async fn close_ends_the_peer_stream() {
        let (mut client, server) = tokio::io::duplex(256);
        let channel = FramedChannel::new(server, settings(500));

        channel.send("bye").await.unwrap();
        channel.close().await;
        assert!(channel.writer().is_broken());

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"bye\n");
    }

    #[tokio::test]
    async fn channel_is_usable_from_spawned_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FramedChannel>();
        assert_send_sync::<MessageWriter>();

        let (mut client, server) = tokio::io::duplex(256);
        let channel = Arc::new(FramedChannel::new(server, settings(500)));
        let task = tokio::spawn({
            let channel = Arc::clone(&channel);
            async move {
                channel.send("from a task").await.unwrap();
                channel.close().await;
            }
        });
        task.await.unwrap();

        let mut rest = String::new();
        client.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "from a task\n");
    }
}
