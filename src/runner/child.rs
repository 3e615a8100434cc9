//! In-process child runner
//!
//! Adapts a test engine running inside this process to the aggregator's runner contract.

use serde::Serialize;
use serde_json::{json, Value};
use std::cell::Cell;
use std::fmt;
use tracing::trace;

use crate::aggregator::Runner;
use crate::events::{EventEmitter, EventSource, Handler};
use crate::models::{Event, EventKind, RunnerId};

/// Lifecycle of a child runner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
    /// Created but has not reported its begin yet
    Idle,
    Running,
    Finished,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::Idle => write!(f, "IDLE"),
            RunnerState::Running => write!(f, "RUNNING"),
            RunnerState::Finished => write!(f, "FINISHED"),
        }
    }
}

/// A runner whose events are produced by calls on this handle
#[derive(Debug)]
pub struct ChildRunner {
    id: RunnerId,
    name: String,
    total: Cell<u64>,
    state: Cell<RunnerState>,
    emitter: EventEmitter,
}

impl ChildRunner {
    /// Create a runner expecting `total` tests
    pub fn new(name: impl Into<String>, total: u64) -> Self {
        Self {
            id: RunnerId::next(),
            name: name.into(),
            total: Cell::new(total),
            state: Cell::new(RunnerState::Idle),
            emitter: EventEmitter::new(),
        }
    }

    /// Revise the number of expected tests
    pub fn set_total(&self, total: u64) {
        self.total.set(total);
    }

    pub fn state(&self) -> RunnerState {
        self.state.get()
    }

    /// Whether this runner may still report events
    ///
    /// A runner that has not begun yet counts as running: it is expected to report later.
    pub fn is_running(&self) -> bool {
        self.state.get() != RunnerState::Finished
    }

    /// Emit an event of any kind
    ///
    /// The lifecycle state changes before subscribers are notified, so a subscriber
    /// reacting to this runner's end already sees it as finished.
    pub fn emit(&self, kind: EventKind, args: Vec<Value>) {
        match kind {
            EventKind::RunBegin => self.state.set(RunnerState::Running),
            EventKind::RunEnd => self.state.set(RunnerState::Finished),
            _ => {}
        }
        trace!(runner = %self.name, kind = %kind, "child emitting");
        self.emitter.emit(&Event::with_args(kind, args));
    }

    pub fn begin(&self) {
        self.emit(EventKind::RunBegin, Vec::new());
    }

    pub fn end(&self) {
        self.emit(EventKind::RunEnd, Vec::new());
    }

    /// Open the implicit root suite
    pub fn root_suite_begin(&self) {
        self.emit(EventKind::SuiteBegin, vec![self.root_payload()]);
    }

    pub fn root_suite_end(&self) {
        self.emit(EventKind::SuiteEnd, vec![self.root_payload()]);
    }

    pub fn suite_begin(&self, title: &str) {
        self.emit(EventKind::SuiteBegin, vec![self.payload(title)]);
    }

    pub fn suite_end(&self, title: &str) {
        self.emit(EventKind::SuiteEnd, vec![self.payload(title)]);
    }

    pub fn test_begin(&self, title: &str) {
        self.emit(EventKind::TestBegin, vec![self.payload(title)]);
    }

    pub fn test_end(&self, title: &str) {
        self.emit(EventKind::TestEnd, vec![self.payload(title)]);
    }

    pub fn pass(&self, title: &str, duration_ms: u64) {
        let mut payload = self.payload(title);
        payload["duration"] = json!(duration_ms);
        self.emit(EventKind::TestPass, vec![payload]);
    }

    pub fn fail(&self, title: &str, error: &str) {
        self.emit(
            EventKind::TestFail,
            vec![self.payload(title), json!({ "message": error })],
        );
    }

    pub fn pending(&self, title: &str) {
        self.emit(EventKind::TestPending, vec![self.payload(title)]);
    }

    fn payload(&self, title: &str) -> Value {
        json!({ "runner": self.name, "title": title })
    }

    fn root_payload(&self) -> Value {
        json!({ "runner": self.name, "title": "", "root": true })
    }
}

impl EventSource for ChildRunner {
    fn on(&self, kind: EventKind, handler: Handler) {
        self.emitter.on(kind, handler);
    }
}

impl Runner for ChildRunner {
    fn id(&self) -> RunnerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn total(&self) -> u64 {
        self.total.get()
    }
}
