//! Server-side session state machine.
//!
//! One [`Session`] runs per accepted connection:
//!
//! ```text
//!  AwaitHandshake ──hello/start/ok──► Active ──end / error / shutdown──► Terminated
//! ```
//!
//! While active, each incoming message is parsed into a [`Command`] and
//! dispatched against the [`FileStore`]. Commands are processed strictly
//! one at a time. `List`, `GET`, `tree`, `HIDE` and `REVEAL` hold an
//! [`OperationGuard`](crate::state::OperationGuard) for the duration of
//! their exchange, so the in-flight count drops even when the exchange
//! fails halfway.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ShelfError;
use crate::message::{Command, Role};
use crate::network::{FramedChannel, MessageHistory};
use crate::protocol::{self, Listing, ListingEntry};
use crate::state::{Coordinator, DrainSettings, SessionPhase, drain_and_shutdown};
use crate::store::{self, FileStore};

/// Process-wide collaborators handed to every session.
#[derive(Clone)]
pub struct SessionContext {
    pub coordinator: Arc<Coordinator>,
    pub store: Arc<dyn FileStore>,
    /// Shared diagnostic history, dumped by the `messages` command.
    pub history: Option<Arc<MessageHistory>>,
    pub drain: DrainSettings,
}

impl SessionContext {
    pub fn new(coordinator: Arc<Coordinator>, store: Arc<dyn FileStore>) -> Self {
        Self {
            coordinator,
            store,
            history: None,
            drain: DrainSettings::default(),
        }
    }

    pub fn with_history(mut self, history: Arc<MessageHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_drain(mut self, drain: DrainSettings) -> Self {
        self.drain = drain;
        self
    }
}

/// What the dispatch loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

pub struct Session {
    channel: FramedChannel,
    role: Role,
    cwd: String,
    phase: SessionPhase,
    ctx: SessionContext,
}

impl Session {
    /// `root` is the directory name the navigation cursor starts at.
    pub fn new(channel: FramedChannel, role: Role, root: impl Into<String>, ctx: SessionContext) -> Self {
        Self {
            channel,
            role,
            cwd: root.into(),
            phase: SessionPhase::default(),
            ctx,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Directory the peer last navigated to.
    pub fn current_dir(&self) -> &str {
        &self.cwd
    }

    /// Drive the session to completion and close the connection.
    ///
    /// Returns `Ok(())` when the peer said `end` or the server shut the
    /// session down, and the abort reason otherwise.
    pub async fn run(mut self) -> Result<(), ShelfError> {
        let result = match self.handshake().await {
            Ok(()) => self.serve().await,
            Err(e) => Err(e),
        };

        self.phase.terminate();
        self.channel.close().await;
        result
    }

    async fn handshake(&mut self) -> Result<(), ShelfError> {
        self.channel.send(protocol::HELLO).await?;

        let reply = self.channel.receive_trimmed().await?;
        if reply != protocol::START {
            return Err(ShelfError::Handshake {
                expected: protocol::START,
                received: reply,
            });
        }

        self.channel.send(protocol::OK_LOWER).await?;
        self.phase.complete_handshake()?;
        debug!(role = %self.role, "handshake complete");
        Ok(())
    }

    async fn serve(&mut self) -> Result<(), ShelfError> {
        loop {
            let line = tokio::select! {
                biased;
                _ = self.ctx.coordinator.shutdown_signalled() => {
                    debug!("shutdown signalled while idle");
                    if let Err(e) = self.channel.send(protocol::SERVER_TERMINATING).await {
                        debug!("cannot deliver shutdown notice: {e}");
                    }
                    return Ok(());
                }
                received = self.channel.receive() => received?,
            };

            let flow = self.dispatch(line.trim()).await?;

            let status = self.ctx.coordinator.snapshot();
            debug!(
                clients = status.live_connections,
                operations = status.in_flight_operations,
                uptime = ?status.uptime,
                cwd = %self.cwd,
                "server status"
            );

            if flow == Flow::Close {
                return Ok(());
            }
        }
    }

    async fn dispatch(&mut self, line: &str) -> Result<Flow, ShelfError> {
        if self.ctx.coordinator.is_shutting_down() {
            debug!(received = line, "rejecting command during shutdown");
            self.channel.send(protocol::SERVER_TERMINATING).await?;
            return Ok(Flow::Close);
        }

        let command = match Command::parse(line) {
            Ok(command) if command.allowed_for(self.role) => command,
            Ok(command) => {
                warn!(role = %self.role, verb = command.verb(), "command not allowed on this endpoint");
                self.channel.send(protocol::UNKNOWN_COMMAND).await?;
                return Ok(Flow::Continue);
            }
            Err(e) => {
                debug!(received = line, "unrecognised command: {e}");
                self.channel.send(protocol::UNKNOWN_COMMAND).await?;
                return Ok(Flow::Continue);
            }
        };

        let _operation = command
            .is_counted()
            .then(|| self.ctx.coordinator.operation_guard());
        debug!(
            command = %command,
            operations = self.ctx.coordinator.in_flight_operations(),
            "dispatching"
        );

        match command {
            Command::Start => {
                self.channel.send(protocol::OK_LOWER).await?;
                Ok(Flow::Continue)
            }
            Command::List { dir } => self.list(&dir).await,
            Command::Get { file, dir } => self.get(&file, &dir).await,
            Command::Tree { dir } => self.tree(&dir).await,
            Command::Goto { target, current } => self.goto(&target, &current).await,
            Command::Hide { file, dir } => self.hide(&file, &dir).await,
            Command::Reveal { file, dir } => self.reveal(&file, &dir).await,
            Command::Terminate => self.terminate().await,
            Command::Help => {
                self.channel.send(protocol::help_text(self.role)).await?;
                Ok(Flow::Continue)
            }
            Command::End => {
                self.channel.send(protocol::OK_LOWER).await?;
                info!(role = %self.role, "client ended the session");
                Ok(Flow::Close)
            }
            Command::Messages => {
                self.dump_history();
                Ok(Flow::Continue)
            }
        }
    }

    // ── Listings ─────────────────────────────────────────────────

    /// `Start`, wait for the peer's `OK`, then the listing.
    async fn list(&mut self, dir: &str) -> Result<Flow, ShelfError> {
        if !self.await_ready().await? {
            self.channel.send(&Listing::default().to_message()).await?;
            return Ok(Flow::Continue);
        }

        let entries = self
            .ctx
            .store
            .visible_entries(dir)
            .await?
            .into_iter()
            .map(|e| ListingEntry::file(e.name, e.size))
            .collect();
        let listing = Listing::new(entries);
        debug!(dir, count = listing.count(), "sending listing");
        self.channel.send(&listing.to_message()).await?;
        Ok(Flow::Continue)
    }

    async fn tree(&mut self, dir: &str) -> Result<Flow, ShelfError> {
        if !self.await_ready().await? {
            self.channel.send(&Listing::default().to_message()).await?;
            return Ok(Flow::Continue);
        }

        let entries = store::walk_tree(self.ctx.store.as_ref(), dir.to_string()).await?;
        let listing = Listing::new(entries);
        debug!(dir, count = listing.count(), "sending tree");
        self.channel.send(&listing.to_message()).await?;
        Ok(Flow::Continue)
    }

    /// Announce a transfer and wait for the acknowledgement.
    /// Returns whether the peer answered `OK`.
    async fn await_ready(&mut self) -> Result<bool, ShelfError> {
        self.channel.send(protocol::TRANSFER_START).await?;
        let ack = self.channel.receive_trimmed().await?;
        if ack == protocol::OK {
            Ok(true)
        } else {
            warn!(received = %ack, "peer did not acknowledge the transfer");
            Ok(false)
        }
    }

    // ── Files ────────────────────────────────────────────────────

    async fn get(&mut self, file: &str, dir: &str) -> Result<Flow, ShelfError> {
        match self.ctx.store.find_entry(dir, file).await? {
            Some(entry) if !entry.is_dir => {
                let bytes = self.ctx.store.read_file(&store::join(dir, &entry.name)).await?;
                info!(file, dir, size = bytes.len(), "sending file");
                self.channel.send(protocol::TRANSFER_START).await?;
                self.channel.send(&protocol::encode_payload(&bytes)).await?;
            }
            _ => {
                info!(file, dir, "file not found");
                self.channel.send(protocol::FILE_UNKNOWN).await?;
            }
        }

        let ack = self.channel.receive_trimmed().await?;
        debug!(ack = %ack, "transfer acknowledged");
        Ok(Flow::Continue)
    }

    async fn hide(&mut self, file: &str, dir: &str) -> Result<Flow, ShelfError> {
        let found = self
            .ctx
            .store
            .find_entry(dir, file)
            .await?
            .filter(|e| !e.is_hidden());

        match found {
            Some(entry) => {
                let from = store::join(dir, &entry.name);
                let to = store::join(dir, &format!(".{}", entry.name));
                self.ctx.store.rename_entry(&from, &to).await?;
                info!(file = %entry.name, dir, "entry hidden");
                self.channel.send(protocol::OK).await?;
            }
            None => {
                info!(file, dir, "cannot hide: not found");
                self.channel.send(protocol::FILE_UNKNOWN).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn reveal(&mut self, file: &str, dir: &str) -> Result<Flow, ShelfError> {
        let hidden_name = if file.starts_with('.') {
            file.to_string()
        } else {
            format!(".{file}")
        };

        let found = self.ctx.store.find_entry(dir, &hidden_name).await?;
        let target = found.and_then(|entry| {
            let visible = entry.name.strip_prefix('.').unwrap_or(&entry.name);
            // `.` alone or `...` has no usable visible name.
            let nameable = !matches!(visible, "" | "." | "..");
            nameable.then(|| (entry.name.clone(), visible.to_string()))
        });

        match target {
            Some((hidden, visible)) => {
                let from = store::join(dir, &hidden);
                let to = store::join(dir, &visible);
                self.ctx.store.rename_entry(&from, &to).await?;
                info!(file = %visible, dir, "entry revealed");
                self.channel.send(protocol::OK).await?;
            }
            None => {
                info!(file, dir, "cannot reveal: not found");
                self.channel.send(protocol::FILE_UNKNOWN).await?;
            }
        }
        Ok(Flow::Continue)
    }

    // ── Navigation ───────────────────────────────────────────────

    async fn goto(&mut self, target: &str, current: &str) -> Result<Flow, ShelfError> {
        if target == ".." {
            self.cwd = store::parent(current).to_string();
            self.channel.send(protocol::GOTO_BACK).await?;
            return Ok(Flow::Continue);
        }

        let is_subdir = match self.ctx.store.find_entry(current, target).await {
            Ok(entry) => entry.is_some_and(|e| e.is_dir),
            Err(e) => {
                debug!(dir = current, "cannot read directory for GOTO: {e}");
                false
            }
        };

        let reply = if is_subdir {
            self.cwd = store::join(current, target);
            protocol::TRANSFER_START
        } else if target == current {
            protocol::GOTO_ALREADY_THERE
        } else {
            protocol::GOTO_NOT_FOUND
        };
        self.channel.send(reply).await?;
        Ok(Flow::Continue)
    }

    // ── Control ──────────────────────────────────────────────────

    /// Hand the drain this session's writer, then wait for the signal.
    async fn terminate(&mut self) -> Result<Flow, ShelfError> {
        let coordinator = Arc::clone(&self.ctx.coordinator);
        if !coordinator.begin_shutdown() {
            info!("shutdown already in progress");
            self.channel.send(protocol::SERVER_TERMINATING).await?;
            return Ok(Flow::Close);
        }

        info!("terminate requested by control client");
        coordinator.set_control_writer(self.channel.writer());
        tokio::spawn(drain_and_shutdown(Arc::clone(&coordinator), self.ctx.drain));

        coordinator.shutdown_signalled().await;
        Ok(Flow::Close)
    }

    fn dump_history(&self) {
        let Some(history) = &self.ctx.history else {
            info!("no message history recorded");
            return;
        };
        info!(
            entries = history.len(),
            dropped = history.dropped(),
            "message history"
        );
        for entry in history.snapshot() {
            info!("{} message : {}", entry.direction, entry.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::network::ChannelSettings;
    use crate::store::LocalStore;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("Docs");
        std::fs::create_dir_all(docs.join("sub")).unwrap();
        std::fs::write(docs.join("a.txt"), b"0123456789").unwrap();
        std::fs::write(docs.join(".secret"), b"x").unwrap();
        std::fs::write(docs.join("sub").join("b.txt"), b"bbbbb").unwrap();
        dir
    }

    fn settings() -> ChannelSettings {
        ChannelSettings {
            message_timeout: Duration::from_secs(2),
            ..ChannelSettings::default()
        }
    }

    fn context(base: &std::path::Path) -> SessionContext {
        SessionContext::new(Arc::new(Coordinator::new()), Arc::new(LocalStore::new(base)))
    }

    /// Spawn a session on one end of a pipe and return the other end,
    /// already past the handshake.
    async fn connect(
        role: Role,
        ctx: SessionContext,
    ) -> (FramedChannel, tokio::task::JoinHandle<Result<(), ShelfError>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = Session::new(FramedChannel::new(server, settings()), role, "Docs", ctx);
        let handle = tokio::spawn(session.run());

        let mut peer = FramedChannel::new(client, settings());
        assert_eq!(peer.receive_trimmed().await.unwrap(), "hello");
        peer.send("start").await.unwrap();
        assert_eq!(peer.receive_trimmed().await.unwrap(), "ok");
        (peer, handle)
    }

    async fn request(peer: &mut FramedChannel, line: &str) -> String {
        peer.send(line).await.unwrap();
        peer.receive_trimmed().await.unwrap()
    }

    #[tokio::test]
    async fn scripted_help_exchange() {
        let dir = fixture();
        let help = format!("{}\n", protocol::help_text(Role::Normal));
        let stream = tokio_test::io::Builder::new()
            .write(b"hello\n")
            .read(b"start\n")
            .write(b"ok\n")
            .read(b"Help\n")
            .write(help.as_bytes())
            .read(b"end\n")
            .write(b"ok\n")
            .build();

        let session = Session::new(
            FramedChannel::new(stream, settings()),
            Role::Normal,
            "Docs",
            context(dir.path()),
        );
        session.run().await.unwrap();
    }

    #[tokio::test]
    async fn handshake_mismatch_aborts() {
        let dir = fixture();
        let (client, server) = tokio::io::duplex(1024);
        let session = Session::new(
            FramedChannel::new(server, settings()),
            Role::Normal,
            "Docs",
            context(dir.path()),
        );
        let handle = tokio::spawn(session.run());

        let mut peer = FramedChannel::new(client, settings());
        assert_eq!(peer.receive_trimmed().await.unwrap(), "hello");
        peer.send("List Docs").await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ShelfError::Handshake { expected: "start", .. }));
        assert!(matches!(peer.receive().await, Err(ShelfError::Closed)));
    }

    #[tokio::test]
    async fn list_omits_hidden_entries() {
        let dir = fixture();
        let (mut peer, _handle) = connect(Role::Normal, context(dir.path())).await;

        assert_eq!(request(&mut peer, "List Docs").await, "Start");
        let reply = request(&mut peer, "OK").await;
        let listing = Listing::parse(&reply).unwrap();
        assert_eq!(listing.count(), 2);
        assert_eq!(listing.names().collect::<Vec<_>>(), vec!["a.txt", "sub"]);
        assert!(!reply.contains(".secret"));
    }

    #[tokio::test]
    async fn list_without_ok_gets_an_empty_listing() {
        let dir = fixture();
        let (mut peer, _handle) = connect(Role::Normal, context(dir.path())).await;

        assert_eq!(request(&mut peer, "List Docs").await, "Start");
        assert_eq!(request(&mut peer, "nope").await, "FileCnt : 0");
    }

    #[tokio::test]
    async fn get_sends_file_then_waits_for_ack() {
        let dir = fixture();
        let ctx = context(dir.path());
        let coordinator = Arc::clone(&ctx.coordinator);
        let (mut peer, _handle) = connect(Role::Normal, ctx).await;

        assert_eq!(request(&mut peer, "GET a.txt Docs").await, "Start");
        assert_eq!(peer.receive().await.unwrap(), "0123456789\n");
        assert_eq!(coordinator.in_flight_operations(), 1);

        peer.send("bien reçu").await.unwrap();
        assert_eq!(request(&mut peer, "Help").await, protocol::help_text(Role::Normal));
        assert_eq!(coordinator.in_flight_operations(), 0);
    }

    #[tokio::test]
    async fn get_missing_file_waits_for_ack() {
        let dir = fixture();
        let (mut peer, _handle) = connect(Role::Normal, context(dir.path())).await;

        assert_eq!(request(&mut peer, "GET missing.txt Docs").await, "FileUnknown");
        peer.send("OK").await.unwrap();
        assert_eq!(request(&mut peer, "end").await, "ok");
    }

    #[tokio::test]
    async fn hide_then_reveal() {
        let dir = fixture();
        let (mut peer, _handle) = connect(Role::Control, context(dir.path())).await;

        assert_eq!(request(&mut peer, "HIDE a.txt Docs").await, "OK");
        assert!(dir.path().join("Docs/.a.txt").exists());
        assert_eq!(request(&mut peer, "HIDE a.txt Docs").await, "FileUnknown");

        assert_eq!(request(&mut peer, "List Docs").await, "Start");
        let listing = Listing::parse(&request(&mut peer, "OK").await).unwrap();
        assert_eq!(listing.names().collect::<Vec<_>>(), vec!["sub"]);

        assert_eq!(request(&mut peer, "REVEAL a.txt Docs").await, "OK");
        assert!(dir.path().join("Docs/a.txt").exists());
        assert_eq!(request(&mut peer, "REVEAL .a.txt Docs").await, "FileUnknown");
    }

    #[tokio::test]
    async fn reveal_strips_a_single_dot() {
        let dir = fixture();
        let docs = dir.path().join("Docs");
        std::fs::write(docs.join("..x"), b"x").unwrap();
        std::fs::write(docs.join("..."), b"dots").unwrap();
        let (mut peer, _handle) = connect(Role::Control, context(dir.path())).await;

        assert_eq!(request(&mut peer, "REVEAL ..x Docs").await, "OK");
        assert!(docs.join(".x").exists());
        assert!(!docs.join("x").exists());

        assert_eq!(request(&mut peer, "REVEAL ... Docs").await, "FileUnknown");
        assert!(docs.join("...").exists());
        assert_eq!(request(&mut peer, "end").await, "ok");
    }

    #[tokio::test]
    async fn messages_sends_nothing_and_keeps_the_session() {
        let dir = fixture();
        let history = Arc::new(MessageHistory::new(16));
        let ctx = context(dir.path()).with_history(history);
        let (mut peer, handle) = connect(Role::Normal, ctx).await;

        peer.send("messages").await.unwrap();
        assert_eq!(
            request(&mut peer, "Help").await,
            protocol::help_text(Role::Normal)
        );
        assert_eq!(request(&mut peer, "end").await, "ok");
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn commands_outside_the_role_are_unknown() {
        let dir = fixture();
        let (mut normal, _h1) = connect(Role::Normal, context(dir.path())).await;
        assert_eq!(request(&mut normal, "HIDE a.txt Docs").await, protocol::UNKNOWN_COMMAND);
        assert_eq!(request(&mut normal, "Terminate").await, protocol::UNKNOWN_COMMAND);
        assert_eq!(request(&mut normal, "List").await, protocol::UNKNOWN_COMMAND);

        let (mut control, _h2) = connect(Role::Control, context(dir.path())).await;
        assert_eq!(request(&mut control, "GET a.txt Docs").await, protocol::UNKNOWN_COMMAND);
        assert_eq!(request(&mut control, "end").await, "ok");
    }

    #[tokio::test]
    async fn goto_outcomes() {
        let dir = fixture();
        let (mut peer, _handle) = connect(Role::Normal, context(dir.path())).await;

        assert_eq!(request(&mut peer, "GOTO sub Docs").await, "Start");
        assert_eq!(request(&mut peer, "GOTO .. Docs/sub").await, "back");
        assert_eq!(request(&mut peer, "GOTO Docs Docs").await, "NO!");
        assert_eq!(request(&mut peer, "GOTO nowhere Docs").await, "NotFound");
        assert_eq!(request(&mut peer, "GOTO a.txt Docs").await, "NotFound");
    }

    #[tokio::test]
    async fn tree_nests_subdirectories() {
        let dir = fixture();
        let (mut peer, _handle) = connect(Role::Normal, context(dir.path())).await;

        assert_eq!(request(&mut peer, "tree Docs").await, "Start");
        let listing = Listing::parse(&request(&mut peer, "OK").await).unwrap();
        assert_eq!(listing.count(), 3);
        let sub = listing.entries[1].children.as_ref().unwrap();
        assert_eq!(sub[0].name, "b.txt");
    }

    #[tokio::test]
    async fn store_failure_aborts_after_releasing_the_operation() {
        let dir = fixture();
        let ctx = context(dir.path());
        let coordinator = Arc::clone(&ctx.coordinator);
        let (mut peer, handle) = connect(Role::Normal, ctx).await;

        assert_eq!(request(&mut peer, "List Nope").await, "Start");
        peer.send("OK").await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ShelfError::Store { .. }));
        assert_eq!(coordinator.in_flight_operations(), 0);
    }

    #[tokio::test]
    async fn shutdown_in_progress_rejects_commands() {
        let dir = fixture();
        let ctx = context(dir.path());
        let coordinator = Arc::clone(&ctx.coordinator);
        let (mut peer, handle) = connect(Role::Normal, ctx).await;

        coordinator.begin_shutdown();
        assert_eq!(request(&mut peer, "List Docs").await, protocol::SERVER_TERMINATING);
        handle.await.unwrap().unwrap();
        assert_eq!(coordinator.in_flight_operations(), 0);
    }

    #[tokio::test]
    async fn idle_session_closes_on_shutdown_signal() {
        let dir = fixture();
        let ctx = context(dir.path());
        let coordinator = Arc::clone(&ctx.coordinator);
        let (mut peer, handle) = connect(Role::Normal, ctx).await;

        coordinator.signal_shutdown();
        assert_eq!(peer.receive_trimmed().await.unwrap(), protocol::SERVER_TERMINATING);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn terminate_drains_and_releases_the_control_session() {
        let dir = fixture();
        let ctx = context(dir.path()).with_drain(DrainSettings {
            poll_interval: Duration::from_millis(10),
            timeout: None,
        });
        let coordinator = Arc::clone(&ctx.coordinator);
        let _conn = coordinator.connection_guard();
        let (mut peer, handle) = connect(Role::Control, ctx).await;

        assert_eq!(request(&mut peer, "Terminate").await, protocol::SHUTDOWN_COMPLETE);
        handle.await.unwrap().unwrap();
        assert!(coordinator.is_shutdown_signalled());
    }

    #[tokio::test]
    async fn second_terminate_is_rejected() {
        let dir = fixture();
        let ctx = context(dir.path());
        let coordinator = Arc::clone(&ctx.coordinator);
        let (mut peer, handle) = connect(Role::Control, ctx).await;

        coordinator.begin_shutdown();
        assert_eq!(request(&mut peer, "Terminate").await, protocol::SERVER_TERMINATING);
        handle.await.unwrap().unwrap();
        assert!(!coordinator.is_shutdown_signalled());
    }
}
