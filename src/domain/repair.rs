//! Streaming timestamp repair for a symbol's concatenated minute bars.
//!
//! The collector's clock jitters: two aggregates can land in the same minute,
//! or a row can be stamped a minute or two off. A single pass in arrival order
//! pulls such rows onto the next free minute while letting real outages
//! (more than [`TOO_FAR_MINUTES`]) through untouched. Arrival order, not
//! timestamp order, decides which row owns a minute.

use crate::domain::minute_bar::MinuteBar;
use chrono::TimeDelta;

/// Gaps wider than this many minutes are genuine and left alone.
pub const TOO_FAR_MINUTES: i64 = 3;

/// Counters for one repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    pub rows: usize,
    /// Rows that collided with the previous minute and were bumped forward.
    pub duplicates: usize,
    /// Rows stepping backwards or landing 2-3 minutes out, forced onto the
    /// next minute.
    pub ambiguous: usize,
}

impl RepairStats {
    pub fn repaired(&self) -> usize {
        self.duplicates + self.ambiguous
    }
}

/// Repair timestamps in place. Input timestamps must already be floored to the
/// minute. Afterwards timestamps are strictly increasing.
pub fn repair_timestamps(bars: &mut [MinuteBar]) -> RepairStats {
    let mut stats = RepairStats {
        rows: bars.len(),
        ..RepairStats::default()
    };
    let Some(first) = bars.first() else {
        return stats;
    };

    let okay = TimeDelta::minutes(1);
    let too_far = TimeDelta::minutes(TOO_FAR_MINUTES);
    let mut cursor = first.timestamp - okay;

    for bar in bars.iter_mut() {
        if bar.timestamp == cursor {
            bar.timestamp = cursor + okay;
            stats.duplicates += 1;
        } else {
            let delta = bar.timestamp - cursor;
            if !(delta == okay || delta > too_far) {
                tracing::trace!(
                    original = %bar.timestamp,
                    forced = %(cursor + okay),
                    "ambiguous timestamp repaired"
                );
                bar.timestamp = cursor + okay;
                stats.ambiguous += 1;
            }
        }
        cursor = bar.timestamp;
    }

    stats
}
