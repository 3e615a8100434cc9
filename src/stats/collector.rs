//! Statistics collection
//!
//! Derives run counters from an event stream without any other knowledge of the run.

use chrono::Utc;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

use crate::events::{handler, EventSource};
use crate::models::{Event, EventKind, RunStats};

/// Kinds the collector counts
const OBSERVED: [EventKind; 7] = [
    EventKind::RunBegin,
    EventKind::SuiteBegin,
    EventKind::TestPass,
    EventKind::TestFail,
    EventKind::TestPending,
    EventKind::TestEnd,
    EventKind::RunEnd,
];

/// Accumulates [`RunStats`] from the events it observes
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: RefCell<RunStats>,
}

impl StatsCollector {
    /// Subscribe a new collector to `source`
    pub fn attach(source: &dyn EventSource) -> Rc<Self> {
        let collector = Rc::new(Self::default());
        for kind in OBSERVED {
            let sink = collector.clone();
            source.on(kind, handler(move |event| sink.observe(event)));
        }
        collector
    }

    /// Account for a single event
    pub fn observe(&self, event: &Event) {
        let mut stats = self.stats.borrow_mut();
        match event.kind {
            EventKind::RunBegin => {
                if stats.start.is_none() {
                    stats.start = Some(Utc::now());
                }
            }
            EventKind::SuiteBegin => {
                if !is_root_suite(event) {
                    stats.suites += 1;
                }
            }
            EventKind::TestPass => stats.passes += 1,
            EventKind::TestFail => stats.failures += 1,
            EventKind::TestPending => stats.pending += 1,
            EventKind::TestEnd => stats.tests += 1,
            EventKind::RunEnd => {
                if stats.end.is_none() {
                    let end = Utc::now();
                    stats.end = Some(end);
                    stats.duration_ms = stats.start.map(|start| (end - start).num_milliseconds());
                }
            }
            _ => {}
        }
    }

    /// Current figures
    pub fn snapshot(&self) -> RunStats {
        self.stats.borrow().clone()
    }
}

fn is_root_suite(event: &Event) -> bool {
    event
        .args
        .first()
        .and_then(|suite| suite.get("root"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
