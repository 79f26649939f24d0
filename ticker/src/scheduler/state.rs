use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::scheduler::backoff::{cadence, next_backoff};

/// Registry key for one tracked surface.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceKey {
    pub group_id: String,
    pub surface_id: String,
}

impl SurfaceKey {
    pub fn new(group_id: &str, surface_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            surface_id: surface_id.to_string(),
        }
    }
}

impl fmt::Display for SurfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_id, self.surface_id)
    }
}

/// Scheduler-owned state for one surface. Only that surface's worker reads or
/// writes it.
#[derive(Clone, Debug)]
pub struct RuntimeState {
    pub last_applied_name: Option<String>,
    pub last_success_at_ms: Option<i64>,
    pub base_interval: Duration,
    pub current_backoff: Duration,
    pub next_run_at: Option<Instant>,
    pub last_market_closed: bool,
}

impl RuntimeState {
    pub fn new(base_interval: Duration) -> Self {
        Self {
            last_applied_name: None,
            last_success_at_ms: None,
            base_interval,
            current_backoff: base_interval,
            next_run_at: None,
            last_market_closed: false,
        }
    }

    /// Picks up a changed poll interval; backoff restarts from the new base.
    pub fn set_base_interval(&mut self, base: Duration) {
        if base != self.base_interval {
            self.base_interval = base;
            self.current_backoff = base;
        }
    }

    /// Resets backoff and returns the delay until the next tick.
    pub fn record_success(&mut self, now_ms: i64, market_closed: bool) -> Duration {
        self.last_success_at_ms = Some(now_ms);
        self.last_market_closed = market_closed;
        self.current_backoff = self.base_interval;
        cadence(self.base_interval, market_closed)
    }

    /// Grows backoff and returns it as the delay until the next tick.
    pub fn record_failure(&mut self) -> Duration {
        self.current_backoff = next_backoff(self.current_backoff, self.base_interval);
        self.current_backoff
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TickerPhase {
    #[default]
    Scheduled,
    Running,
}

/// What a worker publishes after every transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickerStatus {
    pub phase: TickerPhase,
    pub last_applied_name: Option<String>,
    pub last_success_at_ms: Option<i64>,
    pub market_closed: bool,
    pub current_backoff: Duration,
    pub next_run_at: Option<Instant>,
}

impl TickerStatus {
    pub fn from_state(phase: TickerPhase, state: &RuntimeState) -> Self {
        Self {
            phase,
            last_applied_name: state.last_applied_name.clone(),
            last_success_at_ms: state.last_success_at_ms,
            market_closed: state.last_market_closed,
            current_backoff: state.current_backoff,
            next_run_at: state.next_run_at,
        }
    }
}

/// Read-side view of one surface, as returned by `TickerScheduler::statuses`.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub surface_id: String,
    pub phase: TickerPhase,
    pub last_applied_name: Option<String>,
    pub last_success_at_ms: Option<i64>,
    pub market_closed: bool,
    pub next_run_in: Option<Duration>,
}

impl StatusSnapshot {
    pub fn new(surface_id: &str, status: &TickerStatus, now: Instant) -> Self {
        Self {
            surface_id: surface_id.to_string(),
            phase: status.phase,
            last_applied_name: status.last_applied_name.clone(),
            last_success_at_ms: status.last_success_at_ms,
            market_closed: status.market_closed,
            next_run_in: status
                .next_run_at
                .map(|at| at.saturating_duration_since(now)),
        }
    }
}
