//! Listener pair.
//!
//! A [`Server`] owns the normal and control listeners. Each accepted
//! connection is counted in the [`Coordinator`] and served by its own
//! [`Session`] task. Both accept loops stop once the shutdown signal
//! fires; [`Server::run`] then waits (bounded by the grace delay) for the
//! remaining sessions and returns.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::ShelfError;
use crate::message::Role;
use crate::network::{ChannelSettings, DEFAULT_HISTORY_CAPACITY, FramedChannel, MessageHistory};
use crate::session::{Session, SessionContext};
use crate::state::{Coordinator, DrainSettings};
use crate::store::FileStore;

pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_CONTROL_PORT: u16 = 3334;
pub const DEFAULT_ROOT: &str = "Docs";
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub normal_addr: SocketAddr,
    pub control_addr: SocketAddr,
    /// Directory name every session's cursor starts at.
    pub root: String,
    pub channel: ChannelSettings,
    pub drain: DrainSettings,
    /// Upper bound on the wait for sessions after the shutdown signal.
    pub grace: Duration,
    pub history_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            normal_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            control_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_CONTROL_PORT)),
            root: DEFAULT_ROOT.to_string(),
            channel: ChannelSettings::default(),
            drain: DrainSettings::default(),
            grace: DEFAULT_GRACE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

pub struct Server {
    normal: TcpListener,
    control: TcpListener,
    local_addrs: (SocketAddr, SocketAddr),
    settings: ServerSettings,
    context: SessionContext,
    history: Arc<MessageHistory>,
}

impl Server {
    /// Bind both listeners. Nothing is accepted until [`run`](Self::run).
    pub async fn bind(settings: ServerSettings, store: Arc<dyn FileStore>) -> Result<Self, ShelfError> {
        let normal = TcpListener::bind(settings.normal_addr).await?;
        let control = TcpListener::bind(settings.control_addr).await?;
        let local_addrs = (normal.local_addr()?, control.local_addr()?);

        let history = Arc::new(MessageHistory::new(settings.history_capacity));
        let context = SessionContext::new(Arc::new(Coordinator::new()), store)
            .with_history(Arc::clone(&history))
            .with_drain(settings.drain);

        info!(normal = %local_addrs.0, control = %local_addrs.1, "listeners bound");
        Ok(Self {
            normal,
            control,
            local_addrs,
            settings,
            context,
            history,
        })
    }

    pub fn normal_addr(&self) -> SocketAddr {
        self.local_addrs.0
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.local_addrs.1
    }

    /// Shared state; call [`Coordinator::signal_shutdown`] to stop the server
    /// from outside (e.g. on Ctrl-C).
    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.context.coordinator)
    }

    pub fn history(&self) -> Arc<MessageHistory> {
        Arc::clone(&self.history)
    }

    /// Serve until the shutdown signal fires.
    pub async fn run(self) -> Result<(), ShelfError> {
        let tracker = TaskTracker::new();

        tokio::join!(
            accept_loop(&self.normal, Role::Normal, &self, &tracker),
            accept_loop(&self.control, Role::Control, &self, &tracker),
        );
        info!("listeners stopped");

        tracker.close();
        if tokio::time::timeout(self.settings.grace, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                sessions = tracker.len(),
                "sessions still running after the grace delay"
            );
        }

        let status = self.context.coordinator.snapshot();
        info!(
            clients = status.live_connections,
            uptime = ?status.uptime,
            "server stopped"
        );
        Ok(())
    }
}

async fn accept_loop(listener: &TcpListener, role: Role, server: &Server, tracker: &TaskTracker) {
    let coordinator = &server.context.coordinator;
    let token = coordinator.shutdown_token();

    loop {
        let (stream, peer) = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(%role, "accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let guard = coordinator.connection_guard();
        info!(%peer, %role, clients = coordinator.live_connections(), "client connected");

        let channel =
            FramedChannel::new(stream, server.settings.channel).with_history(server.history());
        let session = Session::new(
            channel,
            role,
            server.settings.root.clone(),
            server.context.clone(),
        );
        let counters = Arc::clone(coordinator);

        tracker.spawn(
            async move {
                match session.run().await {
                    Ok(()) => debug!("session closed"),
                    Err(e) if e.is_timeout() => warn!("session timed out: {e}"),
                    Err(e) if e.is_disconnect() => info!("client went away: {e}"),
                    Err(e) => warn!("session aborted: {e}"),
                }
                drop(guard);
                info!(
                    clients = counters.live_connections(),
                    "client disconnected"
                );
            }
            .instrument(info_span!("session", %peer, %role)),
        );
    }

    debug!(%role, "accept loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;

    fn local_settings() -> ServerSettings {
        let any = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        ServerSettings {
            normal_addr: any,
            control_addr: any,
            grace: Duration::from_millis(100),
            ..ServerSettings::default()
        }
    }

    #[test]
    fn default_settings() {
        let settings = ServerSettings::default();
        assert_eq!(settings.normal_addr.port(), 3333);
        assert_eq!(settings.control_addr.port(), 3334);
        assert_eq!(settings.root, "Docs");
        assert_eq!(settings.channel.message_timeout, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn external_signal_stops_both_listeners() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::bind(local_settings(), Arc::new(LocalStore::new(dir.path())))
            .await
            .unwrap();
        assert_ne!(server.normal_addr(), server.control_addr());

        let coordinator = server.coordinator();
        let running = tokio::spawn(server.run());
        coordinator.signal_shutdown();

        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("run() did not return")
            .unwrap()
            .unwrap();
    }
}
