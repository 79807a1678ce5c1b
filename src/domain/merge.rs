//! Appending a repaired batch onto a symbol's stored history.

use crate::domain::minute_bar::{AssetSeries, MinuteBar};

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub series: AssetSeries,
    /// Stored bars dropped because the new batch starts at or before them.
    pub trimmed: usize,
    pub appended: usize,
    /// No history existed; the batch became the whole series.
    pub created: bool,
}

/// Trim the tail of `existing` that overlaps `new_bars`, then append.
///
/// `new_bars` must be repaired (strictly increasing). Re-running with the same
/// or an overlapping batch yields the same series, so retried syncs never
/// duplicate minutes.
pub fn merge_series(
    symbol: &str,
    existing: Option<AssetSeries>,
    new_bars: Vec<MinuteBar>,
) -> MergeOutcome {
    let appended = new_bars.len();
    let Some(mut series) = existing else {
        return MergeOutcome {
            series: AssetSeries::new(symbol, new_bars),
            trimmed: 0,
            appended,
            created: true,
        };
    };

    let mut trimmed = 0;
    if let Some(first_new) = new_bars.first().map(|b| b.timestamp) {
        while series
            .bars
            .last()
            .is_some_and(|last| last.timestamp >= first_new)
        {
            series.bars.pop();
            trimmed += 1;
        }
    }

    series.bars.extend(new_bars);
    MergeOutcome {
        series,
        trimmed,
        appended,
        created: false,
    }
}
