//! Drain-and-shutdown procedure started by a control `Terminate`.
//!
//! Polls the [`Coordinator`] until no operation is in flight and no
//! connection other than the requesting control session remains, then
//! fires the shutdown signal. Progress goes to the control writer stored
//! in the coordinator; failing to deliver it never stops the drain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::protocol;
use crate::state::coordinator::Coordinator;

/// Default delay between two polls of the counters.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    pub poll_interval: Duration,
    /// Upper bound on the wait. `None` waits for as long as it takes.
    pub timeout: Option<Duration>,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// How the drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every operation and every other client finished.
    Drained,
    /// The drain timeout elapsed first; shutdown was forced.
    TimedOut,
}

/// Wait for the server to go idle, then fire the shutdown signal.
///
/// The caller is expected to hold one live connection (the control
/// session that issued `Terminate`); it is excluded from the count.
pub async fn drain_and_shutdown(coordinator: Arc<Coordinator>, settings: DrainSettings) -> DrainOutcome {
    coordinator.begin_shutdown();
    info!("server shutdown initiated");
    let started = Instant::now();

    let outcome = loop {
        let operations = coordinator.in_flight_operations();
        let others = coordinator.live_connections().saturating_sub(1);

        if operations == 0 && others == 0 {
            break DrainOutcome::Drained;
        }
        if settings.timeout.is_some_and(|limit| started.elapsed() >= limit) {
            break DrainOutcome::TimedOut;
        }

        let status = protocol::drain_status(operations, others);
        info!(operations, clients = others, "waiting for server to drain");
        notify_control(&coordinator, &status).await;

        tokio::time::sleep(settings.poll_interval).await;
    };

    let notice = match outcome {
        DrainOutcome::Drained => {
            info!("drain complete, shutting down");
            protocol::SHUTDOWN_COMPLETE
        }
        DrainOutcome::TimedOut => {
            warn!(
                operations = coordinator.in_flight_operations(),
                clients = coordinator.live_connections().saturating_sub(1),
                "drain timed out, forcing shutdown"
            );
            protocol::SHUTDOWN_FORCED
        }
    };
    notify_control(&coordinator, notice).await;

    coordinator.signal_shutdown();
    outcome
}

async fn notify_control(coordinator: &Coordinator, message: &str) {
    let Some(writer) = coordinator.control_writer() else {
        return;
    };
    if let Err(e) = writer.send(message).await {
        warn!("cannot reach the terminating control client: {e}");
    }
}
