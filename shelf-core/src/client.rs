//! Protocol client.
//!
//! Performs the `hello → start → ok` handshake, then offers one typed
//! method per command. The client keeps its own navigation cursor, the
//! way the server expects: `GOTO` carries the current directory and a
//! `back` reply is resolved locally.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::ShelfError;
use crate::message::Command;
use crate::network::{ChannelSettings, FramedChannel};
use crate::protocol::{self, Listing};
use crate::server::DEFAULT_ROOT;
use crate::store;

/// Result of a `GOTO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoOutcome {
    /// Moved into a subdirectory; carries the new path.
    Entered(String),
    /// Moved up; carries the parent path computed locally.
    Back(String),
    AlreadyThere,
    NotFound,
}

/// Everything a control client received after `Terminate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Drain progress lines, in order.
    pub status: Vec<String>,
    /// The last message: completion, forced shutdown, or a rejection
    /// because another drain is already running.
    pub notice: String,
}

impl ShutdownReport {
    pub fn completed(&self) -> bool {
        self.notice == protocol::SHUTDOWN_COMPLETE
    }
}

pub struct Client {
    channel: FramedChannel,
    cwd: String,
}

impl Client {
    /// Open a TCP connection (bounded by the message timeout) and shake hands.
    pub async fn connect(addr: impl ToSocketAddrs, settings: ChannelSettings) -> Result<Self, ShelfError> {
        let stream = tokio::time::timeout(settings.message_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ShelfError::Timeout(settings.message_timeout))??;
        stream.set_nodelay(true)?;
        Self::handshake(FramedChannel::new(stream, settings)).await
    }

    /// Shake hands over an already connected stream.
    pub async fn over<S>(stream: S, settings: ChannelSettings) -> Result<Self, ShelfError>
    where
        S: AsyncRead + AsyncWrite + Send + Sync + 'static,
    {
        Self::handshake(FramedChannel::new(stream, settings)).await
    }

    async fn handshake(mut channel: FramedChannel) -> Result<Self, ShelfError> {
        let greeting = channel.receive_trimmed().await?;
        if greeting != protocol::HELLO {
            return Err(ShelfError::Handshake {
                expected: protocol::HELLO,
                received: greeting,
            });
        }

        channel.send(protocol::START).await?;
        let reply = channel.receive_trimmed().await?;
        if reply != protocol::OK_LOWER {
            return Err(ShelfError::Handshake {
                expected: protocol::OK_LOWER,
                received: reply,
            });
        }

        debug!("handshake complete");
        Ok(Self {
            channel,
            cwd: DEFAULT_ROOT.to_string(),
        })
    }

    pub fn current_dir(&self) -> &str {
        &self.cwd
    }

    pub fn set_current_dir(&mut self, dir: impl Into<String>) {
        self.cwd = dir.into();
    }

    pub fn timeout(&self) -> Duration {
        self.channel.timeout()
    }

    async fn request(&mut self, command: &Command) -> Result<String, ShelfError> {
        self.channel.send(&command.to_string()).await?;
        self.channel.receive_trimmed().await
    }

    /// `List <dir>`: visible entries of `dir`.
    pub async fn list(&mut self, dir: &str) -> Result<Listing, ShelfError> {
        let command = Command::List { dir: dir.to_string() };
        self.fetch_listing(&command).await
    }

    /// `tree <dir>`: recursive listing of `dir`.
    pub async fn tree(&mut self, dir: &str) -> Result<Listing, ShelfError> {
        let command = Command::Tree { dir: dir.to_string() };
        self.fetch_listing(&command).await
    }

    async fn fetch_listing(&mut self, command: &Command) -> Result<Listing, ShelfError> {
        let reply = self.request(command).await?;
        if reply != protocol::TRANSFER_START {
            return Err(ShelfError::UnexpectedReply(reply));
        }
        self.channel.send(protocol::OK).await?;
        let payload = self.channel.receive_trimmed().await?;
        Listing::parse(&payload)
    }

    /// `GET <file> <dir>`: the decoded content, or `None` when the server
    /// does not know the file. The acknowledgement is sent either way.
    pub async fn get(&mut self, file: &str, dir: &str) -> Result<Option<String>, ShelfError> {
        let command = Command::Get {
            file: file.to_string(),
            dir: dir.to_string(),
        };
        let reply = self.request(&command).await?;

        let content = match reply.as_str() {
            protocol::TRANSFER_START => {
                let payload = self.channel.receive().await?;
                Some(protocol::decode_payload(&payload))
            }
            protocol::FILE_UNKNOWN => None,
            _ => return Err(ShelfError::UnexpectedReply(reply)),
        };

        self.channel.send(protocol::OK).await?;
        Ok(content)
    }

    /// `GOTO <target> <cwd>`, updating the local cursor.
    pub async fn goto(&mut self, target: &str) -> Result<GotoOutcome, ShelfError> {
        let command = Command::Goto {
            target: target.to_string(),
            current: self.cwd.clone(),
        };
        let reply = self.request(&command).await?;

        let outcome = match reply.as_str() {
            protocol::TRANSFER_START => {
                self.cwd = store::join(&self.cwd, target);
                GotoOutcome::Entered(self.cwd.clone())
            }
            protocol::GOTO_BACK => {
                self.cwd = store::parent(&self.cwd).to_string();
                GotoOutcome::Back(self.cwd.clone())
            }
            protocol::GOTO_ALREADY_THERE => GotoOutcome::AlreadyThere,
            protocol::GOTO_NOT_FOUND => GotoOutcome::NotFound,
            _ => return Err(ShelfError::UnexpectedReply(reply)),
        };
        Ok(outcome)
    }

    /// `HIDE <file> <dir>`. `Ok(false)` when the file does not exist.
    pub async fn hide(&mut self, file: &str, dir: &str) -> Result<bool, ShelfError> {
        let command = Command::Hide {
            file: file.to_string(),
            dir: dir.to_string(),
        };
        self.rename(&command).await
    }

    /// `REVEAL <file> <dir>`. `Ok(false)` when the file does not exist.
    pub async fn reveal(&mut self, file: &str, dir: &str) -> Result<bool, ShelfError> {
        let command = Command::Reveal {
            file: file.to_string(),
            dir: dir.to_string(),
        };
        self.rename(&command).await
    }

    async fn rename(&mut self, command: &Command) -> Result<bool, ShelfError> {
        let reply = self.request(command).await?;
        match reply.as_str() {
            protocol::OK => Ok(true),
            protocol::FILE_UNKNOWN => Ok(false),
            _ => Err(ShelfError::UnexpectedReply(reply)),
        }
    }

    pub async fn help(&mut self) -> Result<String, ShelfError> {
        self.request(&Command::Help).await
    }

    /// Ask the server to dump its message history to its log. No reply.
    pub async fn messages(&mut self) -> Result<(), ShelfError> {
        self.channel.send(&Command::Messages.to_string()).await
    }

    /// `Terminate`: collect drain progress until the final notice.
    pub async fn terminate(mut self) -> Result<ShutdownReport, ShelfError> {
        self.channel.send(&Command::Terminate.to_string()).await?;

        let mut status = Vec::new();
        loop {
            let line = self.channel.receive_trimmed().await?;
            if protocol::is_final_shutdown_notice(&line) || line == protocol::SERVER_TERMINATING {
                self.channel.close().await;
                return Ok(ShutdownReport { status, notice: line });
            }
            if line == protocol::UNKNOWN_COMMAND {
                return Err(ShelfError::UnexpectedReply(line));
            }
            debug!(status = %line, "drain in progress");
            status.push(line);
        }
    }

    /// `end`, then close the connection.
    pub async fn end(mut self) -> Result<(), ShelfError> {
        let reply = self.request(&Command::End).await?;
        self.channel.close().await;
        if reply == protocol::OK_LOWER {
            Ok(())
        } else {
            Err(ShelfError::UnexpectedReply(reply))
        }
    }
}
