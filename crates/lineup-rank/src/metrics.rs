//! Spacing health of an ordered run of ranks.

use crate::Rank;

/// Spacing summary for one scope's ranks, in sorted order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GapMetrics {
    /// Number of ranks measured.
    pub count: usize,
    /// Mean numeric gap between neighbours (`None` with fewer than two ranks).
    pub average_gap: Option<f64>,
    /// Smallest numeric gap between neighbours.
    pub min_gap: Option<f64>,
    /// Longest key, in symbols.
    pub longest_key: usize,
}

/// Measure neighbour spacing. `ranks` must already be sorted.
///
/// Gaps are computed on [`Rank::as_fraction`], so neighbours that only differ
/// far past the tenth symbol report a gap of zero. That is the signal a
/// rebalance is overdue.
pub fn gap_metrics<'a>(ranks: impl IntoIterator<Item = &'a Rank>) -> GapMetrics {
    let mut metrics = GapMetrics::default();
    let mut prev: Option<f64> = None;
    let mut total = 0.0;

    for rank in ranks {
        metrics.count += 1;
        metrics.longest_key = metrics.longest_key.max(rank.len());
        let value = rank.as_fraction();
        if let Some(p) = prev {
            let gap = (value - p).max(0.0);
            total += gap;
            metrics.min_gap = Some(metrics.min_gap.map_or(gap, |m| m.min(gap)));
        }
        prev = Some(value);
    }

    if metrics.count > 1 {
        metrics.average_gap = Some(total / (metrics.count - 1) as f64);
    }
    metrics
}
