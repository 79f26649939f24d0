//! One polling task per surface.
//!
//! A worker owns its [`RuntimeState`] outright. Ticks run strictly one after
//! another: the next delay is only armed once the previous tick returned.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use common::logger::{TraceId, annotate_surface, tick_span, warn_if_slow};

use crate::display::formatter::{MAX_SEGMENTS, format_name};
use crate::error::{RenameError, TickError};
use crate::market::resolver::QuoteResolver;
use crate::metrics::counters::Counters;
use crate::scheduler::backoff::idle_delay;
use crate::scheduler::state::{RuntimeState, SurfaceKey, TickerPhase, TickerStatus};
use crate::store::repository::TickerConfigStore;
use crate::surface::SurfaceRenamer;
use crate::time::now_ms;

const SLOW_RENAME: Duration = Duration::from_secs(3);

/// Collaborators every worker shares.
#[derive(Clone)]
pub struct TickContext {
    pub store: Arc<dyn TickerConfigStore>,
    pub resolver: QuoteResolver,
    pub renamer: Arc<dyn SurfaceRenamer>,
    pub counters: Counters,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Renamed(String),
    /// Candidate already visible or already applied; no rename issued.
    Unchanged,
    NoSymbols,
    NothingToShow,
    SurfaceMissing,
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleReason {
    /// Ticker missing from the group or disabled.
    NotEnabled,
    /// Stopped while the tick was in progress.
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickDecision {
    Reschedule { delay: Duration, outcome: TickOutcome },
    Idle(IdleReason),
}

pub struct SurfaceWorker {
    key: SurfaceKey,
    ctx: TickContext,
    state: RuntimeState,
    status: watch::Sender<TickerStatus>,
}

impl SurfaceWorker {
    pub fn new(
        key: SurfaceKey,
        ctx: TickContext,
        base_interval: Duration,
    ) -> (Self, watch::Receiver<TickerStatus>) {
        let state = RuntimeState::new(base_interval);
        let (status, rx) = watch::channel(TickerStatus::from_state(TickerPhase::Scheduled, &state));
        (
            Self {
                key,
                ctx,
                state,
                status,
            },
            rx,
        )
    }

    pub fn key(&self) -> &SurfaceKey {
        &self.key
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// Drives ticks until cancelled or the surface goes idle.
    /// The first tick fires immediately; `wake` cuts a pending delay short.
    pub async fn run(mut self, cancel: CancellationToken, wake: Arc<Notify>) {
        let mut delay = Duration::ZERO;

        loop {
            let next = Instant::now() + delay;
            self.state.next_run_at = Some(next);
            self.publish(TickerPhase::Scheduled);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(next) => {}
                _ = wake.notified() => debug!(surface = %self.key, "woken before schedule"),
            }

            self.state.next_run_at = None;
            self.publish(TickerPhase::Running);

            match self.tick(&cancel).await {
                TickDecision::Reschedule { delay: d, .. } => delay = d,
                TickDecision::Idle(reason) => {
                    debug!(surface = %self.key, ?reason, "surface idle");
                    break;
                }
            }

            if cancel.is_cancelled() {
                break;
            }
        }
    }

    /// Runs exactly one tick inside its own trace span.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> TickDecision {
        let trace_id = TraceId::default();
        let span = tick_span(&self.key.group_id, &self.key.surface_id, &trace_id);
        self.tick_inner(cancel).instrument(span).await
    }

    async fn tick_inner(&mut self, cancel: &CancellationToken) -> TickDecision {
        let ctx = self.ctx.clone();
        let SurfaceKey {
            group_id,
            surface_id,
        } = self.key.clone();
        Counters::bump(&ctx.counters.ticks);

        // Config may have changed since this tick was scheduled.
        let group = match ctx.store.get_or_create(&group_id).await {
            Ok(g) => g,
            Err(e) => return self.fail(TickError::Store(e)),
        };
        let Some(ticker) = group.ticker(&surface_id).filter(|t| t.enabled) else {
            return TickDecision::Idle(IdleReason::NotEnabled);
        };

        self.state.set_base_interval(ticker.base_interval());
        let base = self.state.base_interval;

        let symbols = group.symbols_for(ticker);
        if symbols.is_empty() {
            debug!("no symbols configured");
            return TickDecision::Reschedule {
                delay: idle_delay(base),
                outcome: TickOutcome::NoSymbols,
            };
        }
        annotate_surface(&symbols);

        let observed = match ctx.renamer.current_name(&group_id, &surface_id).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                warn!("surface not found; will retry");
                return TickDecision::Reschedule {
                    delay: base,
                    outcome: TickOutcome::SurfaceMissing,
                };
            }
            Err(e) => return self.fail(e.into()),
        };

        let resolves = symbols
            .iter()
            .take(MAX_SEGMENTS)
            .map(|s| ctx.resolver.resolve(s, &group.default_interval));
        let quotes = match try_join_all(resolves).await {
            Ok(q) => q,
            Err(e) => return self.fail(e.into()),
        };

        let market_closed = !quotes.is_empty() && quotes.iter().all(|q| !q.market_open);

        let Some(name) = format_name(&quotes, &ticker.template, ticker.precision) else {
            return TickDecision::Reschedule {
                delay: base,
                outcome: TickOutcome::NothingToShow,
            };
        };

        if name == observed || self.state.last_applied_name.as_deref() == Some(name.as_str()) {
            Counters::bump(&ctx.counters.renames_skipped);
            let delay = self.state.record_success(now_ms(), market_closed);
            debug!(name = %name, "name unchanged; rename skipped");
            return TickDecision::Reschedule {
                delay,
                outcome: TickOutcome::Unchanged,
            };
        }

        if cancel.is_cancelled() {
            return TickDecision::Idle(IdleReason::Cancelled);
        }

        let renamed = warn_if_slow(
            "surface_rename",
            SLOW_RENAME,
            ctx.renamer.rename(&group_id, &surface_id, &name),
        )
        .await;

        match renamed {
            Ok(()) => {
                Counters::bump(&ctx.counters.renames_applied);
                self.state.last_applied_name = Some(name.clone());
                let delay = self.state.record_success(now_ms(), market_closed);
                info!(name = %name, market_closed, "surface renamed");
                TickDecision::Reschedule {
                    delay,
                    outcome: TickOutcome::Renamed(name),
                }
            }
            Err(e) => self.fail(e.into()),
        }
    }

    fn fail(&mut self, err: TickError) -> TickDecision {
        Counters::bump(&self.ctx.counters.tick_failures);

        let mut delay = self.state.record_failure();
        // Never retry sooner than the platform asked us to.
        if let TickError::Rename(RenameError::RateLimited {
            retry_after: Some(wait),
            ..
        }) = &err
        {
            delay = delay.max(*wait);
        }

        warn!(
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "tick failed; backing off"
        );

        TickDecision::Reschedule {
            delay,
            outcome: TickOutcome::Failed(err.to_string()),
        }
    }

    fn publish(&self, phase: TickerPhase) {
        self.status
            .send_replace(TickerStatus::from_state(phase, &self.state));
    }
}
