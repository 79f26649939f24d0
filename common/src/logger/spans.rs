use std::time::Duration;

use tracing::{Span, field};

use super::TraceId;

/// Root span for one scheduler tick of one surface.
pub fn tick_span(group_id: &str, surface_id: &str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "tick",
        trace_id = %trace_id.as_str(),
        group_id = %group_id,
        surface_id = %surface_id,
        symbols = field::Empty
    )
}

/// Records the symbols being resolved on the current span.
pub fn annotate_surface(symbols: &[String]) {
    let span = Span::current();
    span.record("symbols", field::display(symbols.join(",")));
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
