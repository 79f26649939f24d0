pub mod backoff;
pub mod scheduler;
pub mod state;
pub mod worker;

pub use scheduler::TickerScheduler;
pub use state::{RuntimeState, StatusSnapshot, SurfaceKey, TickerPhase, TickerStatus};
pub use worker::{IdleReason, SurfaceWorker, TickContext, TickDecision, TickOutcome};
