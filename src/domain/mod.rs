//! Core types and the sync pipeline.

pub mod config_validation;
pub mod error;
pub mod merge;
pub mod minute_bar;
pub mod prefix;
pub mod raw_record;
pub mod repair;
pub mod route;
pub mod symbols;
pub mod sync;
pub mod time_range;
