//! Share and cumulative-threshold construction shared by both strategies

use crate::models::{SplitTarget, FULL_COVERAGE};

const TOTAL: u32 = FULL_COVERAGE as u32;

/// Split 100 units across `n` replicas: the first `100 % n` get one extra
pub fn even_shares(n: usize) -> Vec<u32> {
    if n == 0 {
        return Vec::new();
    }
    let n32 = u32::try_from(n).unwrap_or(u32::MAX);
    let base = TOTAL / n32;
    let remainder = (TOTAL % n32) as usize;
    (0..n)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Integer shares proportional to `weights`, summing to exactly 100
///
/// The running cumulative fraction is rounded rather than each share, so
/// rounding error never accumulates. Returns an empty list when the weights
/// carry no mass.
pub fn normalize(weights: &[f64]) -> Vec<u32> {
    let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut running = 0.0;
    let mut previous = 0;
    let last = weights.len() - 1;
    weights
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            if w.is_finite() && w > 0.0 {
                running += w;
            }
            let threshold = if i == last {
                TOTAL
            } else {
                ((running / total * TOTAL as f64).round() as u32).min(TOTAL)
            };
            let share = threshold.saturating_sub(previous);
            previous = previous.max(threshold);
            share
        })
        .collect()
}

/// Pair names with shares and accumulate into thresholds
///
/// Zero shares are dropped so thresholds stay strictly increasing. When the
/// shares sum to 100 the last threshold is exactly 100.
pub fn cumulative<'a>(entries: impl IntoIterator<Item = (&'a str, u32)>) -> Vec<SplitTarget> {
    let mut running = 0u32;
    entries
        .into_iter()
        .filter(|(_, share)| *share > 0)
        .map(|(name, share)| {
            running = (running + share).min(TOTAL);
            SplitTarget::new(name, running as u8)
        })
        .collect()
}
