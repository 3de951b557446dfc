pub mod coordinator;
pub mod drain;
pub mod phase;

pub use coordinator::{ConnectionGuard, Coordinator, CoordinatorSnapshot, OperationGuard};
pub use drain::{DEFAULT_POLL_INTERVAL, DrainOutcome, DrainSettings, drain_and_shutdown};
pub use phase::SessionPhase;
