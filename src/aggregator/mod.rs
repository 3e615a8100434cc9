//! Run aggregation
//!
//! Merges concurrently running runners into a single ordered event stream.

mod contract;
mod merge;

pub use contract::{InstanceStatus, Runner, RunnerRegistry};
pub use merge::{AggregatorSnapshot, RunAggregator};
