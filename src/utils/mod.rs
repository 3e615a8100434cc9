//! Shared utilities

mod logger;

pub use logger::{filter_directive, init_logger, LogLevel};
