use std::time::Duration;

/// Backoff never exceeds this many base intervals.
pub const MAX_BACKOFF_MULTIPLIER: u32 = 5;

/// Doubles `current`, capped at `MAX_BACKOFF_MULTIPLIER × base`.
pub fn next_backoff(current: Duration, base: Duration) -> Duration {
    let cap = base.saturating_mul(MAX_BACKOFF_MULTIPLIER);
    current.saturating_mul(2).min(cap)
}

/// Delay after a successful tick; closed markets poll half as often.
pub fn cadence(base: Duration, market_closed: bool) -> Duration {
    if market_closed {
        base.saturating_mul(2)
    } else {
        base
    }
}

/// Delay when there is nothing to display yet.
pub fn idle_delay(base: Duration) -> Duration {
    base.saturating_mul(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn doubles_then_caps() {
        let base = Duration::from_millis(1_000);
        let mut current = base;
        let mut seen = Vec::new();
        for _ in 0..4 {
            current = next_backoff(current, base);
            seen.push(current.as_millis());
        }
        assert_eq!(seen, vec![2_000, 4_000, 5_000, 5_000]);
    }

    #[test]
    fn closed_market_and_idle_double_the_base() {
        let base = Duration::from_secs(30);
        assert_eq!(cadence(base, false), base);
        assert_eq!(cadence(base, true), Duration::from_secs(60));
        assert_eq!(idle_delay(base), Duration::from_secs(60));
    }

    proptest! {
        #[test]
        fn backoff_stays_within_bounds(base_ms in 1u64..10_000_000, steps in 1usize..40) {
            let base = Duration::from_millis(base_ms);
            let mut current = base;
            for _ in 0..steps {
                let next = next_backoff(current, base);
                prop_assert!(next >= current);
                prop_assert!(next <= base * MAX_BACKOFF_MULTIPLIER);
                current = next;
            }
        }
    }
}
