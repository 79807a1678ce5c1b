//! Concrete port implementations.

pub mod csv_adapter;
pub mod csv_series_store;
pub mod file_config_adapter;
pub mod file_watermark_adapter;
pub mod local_object_store;
pub mod lock_file;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
