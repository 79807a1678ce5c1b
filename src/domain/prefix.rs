//! Key-prefix partitioning for time-ranged object listing.
//!
//! Raw files are named with the decimal UNIX timestamp of their creation as the
//! leading key component (`1541030427-...`). The object store can only list by
//! exact string prefix, so a time range is translated into a set of decimal
//! prefixes: a prefix that drops `k` trailing digits names an aligned block of
//! `10^k` seconds.

use crate::domain::time_range::TimeRange;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Smallest block emitted by either scheme (7-digit prefixes, ~16.7 minutes).
const FINE_BLOCK_SECONDS: i64 = 1_000;

/// Prefix covering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixScheme {
    /// Fixed three tiers: fine leading edge, one mid decade, then ~2.78 hour
    /// blocks through the end. Tuned for the daily "since last sync" cadence.
    #[default]
    ThreeTier,
    /// Minimal aligned-block cover at any granularity, for arbitrary spans.
    Canonical,
}

impl PrefixScheme {
    pub fn prefixes(&self, range: &TimeRange) -> Vec<String> {
        match self {
            PrefixScheme::ThreeTier => partition(range.start(), range.end()),
            PrefixScheme::Canonical => partition_canonical(range),
        }
    }
}

impl FromStr for PrefixScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "three_tier" | "three-tier" => Ok(PrefixScheme::ThreeTier),
            "canonical" => Ok(PrefixScheme::Canonical),
            other => Err(format!(
                "unknown prefix scheme '{other}' (expected three_tier or canonical)"
            )),
        }
    }
}

impl fmt::Display for PrefixScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixScheme::ThreeTier => write!(f, "three_tier"),
            PrefixScheme::Canonical => write!(f, "canonical"),
        }
    }
}

/// Three-tier prefix set for `[start, end]`.
///
/// 1. every 7-digit prefix from `start / 1000` to the end of its decade;
/// 2. every 6-digit prefix of the following decade;
/// 3. 6-digit prefixes from there through `end / 10000`.
///
/// Coverage is contiguous from the block holding `start` to the block holding
/// `end`, so the result never misses a key. It may overshoot `end` by up to one
/// mid decade (~27.8 hours) and grows linearly with long spans.
pub fn partition(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    let (start, end) = (start.timestamp(), end.timestamp());
    let mut prefixes = Vec::new();

    let head1 = start.div_euclid(FINE_BLOCK_SECONDS);
    let tail1 = decade_end(head1);
    push_run(&mut prefixes, head1, tail1);

    let head2 = head1.div_euclid(10) + 1;
    let tail2 = decade_end(head2);
    push_run(&mut prefixes, head2, tail2);

    let tail3 = end.div_euclid(FINE_BLOCK_SECONDS * 10);
    if tail2 < tail3 {
        push_run(&mut prefixes, tail2 + 1, tail3);
    }

    prefixes
}

/// Minimal aligned-block cover of `[start, end)`.
///
/// Peels unaligned 7-digit blocks off the leading edge, climbs to the coarsest
/// block that fits, then steps back down toward the trailing edge. The range
/// is split wherever the decimal width of timestamps changes so every prefix
/// carries the width of the keys it has to match. Instants before the first
/// fine block (epoch 1000) are clamped.
pub fn partition_canonical(range: &TimeRange) -> Vec<String> {
    let mut lo = align_down(range.start().timestamp()).max(FINE_BLOCK_SECONDS);
    let hi = align_up(range.end().timestamp());
    let mut prefixes = Vec::new();

    while lo < hi {
        let segment_end = hi.min(next_width_boundary(lo));
        cover_segment(lo, segment_end, &mut prefixes);
        lo = segment_end;
    }

    prefixes
}

/// Leading decimal timestamp of an object key, e.g. `1541030427` for
/// `1541030427-BTCUSDT-aggregates.csv`.
pub fn key_timestamp(key: &str) -> Option<i64> {
    let digits_len = key.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    key[..digits_len].parse().ok()
}

fn decade_end(value: i64) -> i64 {
    (value.div_euclid(10) + 1) * 10 - 1
}

fn push_run(out: &mut Vec<String>, head: i64, tail: i64) {
    out.extend((head..=tail).map(|v| v.to_string()));
}

fn align_down(secs: i64) -> i64 {
    secs.div_euclid(FINE_BLOCK_SECONDS) * FINE_BLOCK_SECONDS
}

fn align_up(secs: i64) -> i64 {
    (secs + FINE_BLOCK_SECONDS - 1).div_euclid(FINE_BLOCK_SECONDS) * FINE_BLOCK_SECONDS
}

/// Smallest power of ten strictly greater than `value` (value > 0).
fn next_width_boundary(value: i64) -> i64 {
    let mut boundary = 10_i64;
    while boundary <= value {
        match boundary.checked_mul(10) {
            Some(next) => boundary = next,
            None => return i64::MAX,
        }
    }
    boundary
}

// lo and hi are multiples of FINE_BLOCK_SECONDS with the same decimal width.
fn cover_segment(mut lo: i64, hi: i64, out: &mut Vec<String>) {
    while lo < hi {
        let mut block = FINE_BLOCK_SECONDS;
        while let Some(wider) = block.checked_mul(10) {
            if lo % wider != 0 || lo + wider > hi {
                break;
            }
            block = wider;
        }
        out.push((lo / block).to_string());
        lo += block;
    }
}
