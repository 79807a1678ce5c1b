//! Durable per-symbol minute series storage port.

use crate::domain::error::SyncError;
use crate::domain::minute_bar::AssetSeries;

pub trait SeriesStorePort: Send + Sync {
    /// `None` when nothing has been stored for `symbol` yet.
    fn read_series(&self, symbol: &str) -> Result<Option<AssetSeries>, SyncError>;

    /// Replace the stored series for `series.symbol` in full. A failed write
    /// must leave the previous series intact.
    fn write_series(&self, series: &AssetSeries) -> Result<(), SyncError>;

    fn list_symbols(&self) -> Result<Vec<String>, SyncError>;
}
