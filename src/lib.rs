//! Run aggregation for parallel test runners
//!
//! Several child runners each produce their own lifecycle events (run begin, suites,
//! tests, results, run end). [`aggregator::RunAggregator`] merges them into one
//! logical run: a single begin, every runner's events in contiguous blocks, and a
//! single end once every runner is done.
//!
//! ```no_run
//! use std::rc::Rc;
//! use run_aggregator::aggregator::RunAggregator;
//! use run_aggregator::events::Transcript;
//! use run_aggregator::runner::ChildRegistry;
//!
//! let registry = Rc::new(ChildRegistry::new());
//! let aggregator = RunAggregator::new(registry.clone());
//! let transcript = Transcript::attach(&aggregator);
//!
//! let child = registry.spawn("child-1", 1);
//! aggregator.listen(&child);
//! child.begin();
//! child.pass("adds numbers", 3);
//! child.end();
//!
//! assert_eq!(transcript.len(), 3);
//! ```

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod events;
pub mod executor;
pub mod models;
pub mod output;
pub mod runner;
pub mod stats;
pub mod utils;
