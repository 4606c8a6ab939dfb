//! Command implementations for the `loam` binary.

pub mod list;
pub mod merge;
pub mod train;
