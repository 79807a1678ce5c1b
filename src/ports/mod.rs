//! Capability traits the sync engine depends on.

pub mod aggregate_reader_port;
pub mod config_port;
pub mod object_store_port;
pub mod series_port;
pub mod watermark_port;
