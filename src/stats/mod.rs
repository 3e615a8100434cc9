//! Run statistics
//!
//! Collects pass/fail/pending counts from an event stream.

mod collector;

pub use collector::StatsCollector;
