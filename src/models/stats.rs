//! Run statistics derived from the aggregate event stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters and timing for one logical test run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub suites: usize,
    pub tests: usize,
    pub passes: usize,
    pub pending: usize,
    pub failures: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl RunStats {
    pub fn pass_rate(&self) -> f64 {
        let decided = self.passes + self.failures;
        if decided == 0 {
            0.0
        } else {
            (self.passes as f64 / decided as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.failures == 0
    }

    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Suites: {} | Tests: {} | Pass: {} | Fail: {} | Pending: {}",
            self.suites, self.tests, self.passes, self.failures, self.pending
        )?;
        if let Some(duration) = self.duration_ms {
            write!(f, " | Duration: {duration}ms")?;
        }
        Ok(())
    }
}
