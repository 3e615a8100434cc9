//! Output formatting module
//!
//! Provides various output formats for merged runs.

mod formatter;

pub use formatter::{OutputFormat, ReportFormatter};
