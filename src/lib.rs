//! barsync: incremental minute-bar synchronization from a raw aggregate bucket.
//!
//! Hexagonal layout: sync logic in [`domain`], capability traits in [`ports`],
//! filesystem and SQLite implementations in [`adapters`], command line in
//! [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
