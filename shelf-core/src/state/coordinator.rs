//! Process-wide shared state.
//!
//! A [`Coordinator`] is created once per server and shared by `Arc`
//! with both listeners and every session. It owns the only
//! cross-session mutable state: the live-connection count, the
//! in-flight-operation count, the shutdown flag, the one-shot shutdown
//! signal and the writer of the control session that asked for shutdown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::network::MessageWriter;

/// Point-in-time view of the coordinator, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    pub live_connections: usize,
    pub in_flight_operations: usize,
    pub shutting_down: bool,
    pub uptime: Duration,
}

/// Shared counters plus the shutdown signal.
#[derive(Debug)]
pub struct Coordinator {
    live_connections: AtomicUsize,
    in_flight: AtomicUsize,
    shutting_down: AtomicBool,
    shutdown: CancellationToken,
    control: Mutex<Option<MessageWriter>>,
    started: Instant,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            live_connections: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            control: Mutex::new(None),
            started: Instant::now(),
        }
    }

    // ── Connections ──────────────────────────────────────────────

    /// Count a new connection. Returns the updated count.
    pub fn enter_connection(&self) -> usize {
        self.live_connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Release a connection. Returns the updated count.
    pub fn exit_connection(&self) -> usize {
        decrement(&self.live_connections, "live connections")
    }

    pub fn live_connections(&self) -> usize {
        self.live_connections.load(Ordering::SeqCst)
    }

    /// Count a connection for as long as the guard lives.
    pub fn connection_guard(self: &Arc<Self>) -> ConnectionGuard {
        self.enter_connection();
        ConnectionGuard {
            coordinator: Arc::clone(self),
        }
    }

    // ── Operations ───────────────────────────────────────────────

    /// Count a new in-flight operation. Returns the updated count.
    pub fn enter_operation(&self) -> usize {
        self.in_flight.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Release an operation. Returns the updated count.
    pub fn exit_operation(&self) -> usize {
        decrement(&self.in_flight, "in-flight operations")
    }

    pub fn in_flight_operations(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Count an operation for as long as the guard lives, whichever
    /// way the operation ends.
    pub fn operation_guard(self: &Arc<Self>) -> OperationGuard {
        self.enter_operation();
        OperationGuard {
            coordinator: Arc::clone(self),
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────

    /// Set the shutdown flag. Returns `true` only for the call that
    /// performed the `false → true` transition.
    pub fn begin_shutdown(&self) -> bool {
        self.shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Fire the one-shot shutdown signal. Idempotent.
    pub fn signal_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    pub fn is_shutdown_signalled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once [`signal_shutdown`](Self::signal_shutdown) has been called.
    pub async fn shutdown_signalled(&self) {
        self.shutdown.cancelled().await;
    }

    /// Clone of the shutdown token, for `select!` in accept loops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // ── Control writer ───────────────────────────────────────────

    /// Remember the writer of the control session that requested shutdown.
    pub fn set_control_writer(&self, writer: MessageWriter) {
        let mut slot = match self.control.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(writer);
    }

    pub fn control_writer(&self) -> Option<MessageWriter> {
        match self.control.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // ── Introspection ────────────────────────────────────────────

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            live_connections: self.live_connections(),
            in_flight_operations: self.in_flight_operations(),
            shutting_down: self.is_shutting_down(),
            uptime: self.uptime(),
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Saturating atomic decrement; an unpaired exit is logged and ignored.
fn decrement(counter: &AtomicUsize, name: &'static str) -> usize {
    match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
        Ok(previous) => previous - 1,
        Err(_) => {
            tracing::warn!("unpaired decrement of {name} ignored");
            0
        }
    }
}

// ── Guards ───────────────────────────────────────────────────────

/// Decrements the live-connection count on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    coordinator: Arc<Coordinator>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.coordinator.exit_connection();
    }
}

/// Decrements the in-flight-operation count on drop.
#[derive(Debug)]
pub struct OperationGuard {
    coordinator: Arc<Coordinator>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.coordinator.exit_operation();
    }
}

// ── Tests ────────────────────────────────────────────────────────
