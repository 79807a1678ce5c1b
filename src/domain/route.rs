//! Routing parsed raw records into per-symbol bar sequences.

use crate::domain::minute_bar::MinuteBar;
use crate::domain::raw_record::RawAggregateRecord;
use std::collections::BTreeMap;

/// Split records by symbol, keeping only the symbols of interest.
///
/// Every requested symbol gets an entry, empty when no rows matched. Bars keep
/// arrival order: file order first, then row order within a file. Event times
/// are floored to the minute.
pub fn route_records<'a, I>(symbols: &[String], files: I) -> BTreeMap<String, Vec<MinuteBar>>
where
    I: IntoIterator<Item = &'a [RawAggregateRecord]>,
{
    let mut routed: BTreeMap<String, Vec<MinuteBar>> = symbols
        .iter()
        .map(|symbol| (symbol.clone(), Vec::new()))
        .collect();

    for records in files {
        for record in records {
            if let Some(bars) = routed.get_mut(&record.symbol) {
                bars.push(record.to_bar());
            }
        }
    }

    routed
}
