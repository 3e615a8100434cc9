//! Data models for run aggregation
//!
//! This module contains the data structures shared by runners, the aggregator and reporters.

mod event;
mod stats;

pub use event::{Event, EventKind, RunnerId};
pub use stats::RunStats;
