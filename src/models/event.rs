//! Event models shared by runners and the aggregator
//!
//! Defines the closed set of event kinds, runner identities and the event record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RUNNER_ID: AtomicU64 = AtomicU64::new(1);

/// Every lifecycle event a runner may report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "hook")]
    HookBegin,
    #[serde(rename = "hook end")]
    HookEnd,
    #[serde(rename = "start")]
    RunBegin,
    #[serde(rename = "waiting")]
    DelayBegin,
    #[serde(rename = "ready")]
    DelayEnd,
    #[serde(rename = "end")]
    RunEnd,
    #[serde(rename = "suite")]
    SuiteBegin,
    #[serde(rename = "suite end")]
    SuiteEnd,
    #[serde(rename = "test")]
    TestBegin,
    #[serde(rename = "test end")]
    TestEnd,
    #[serde(rename = "fail")]
    TestFail,
    #[serde(rename = "pass")]
    TestPass,
    #[serde(rename = "pending")]
    TestPending,
    #[serde(rename = "retry")]
    TestRetry,
}

impl EventKind {
    /// All event kinds, in declaration order
    pub const ALL: [EventKind; 14] = [
        EventKind::HookBegin,
        EventKind::HookEnd,
        EventKind::RunBegin,
        EventKind::DelayBegin,
        EventKind::DelayEnd,
        EventKind::RunEnd,
        EventKind::SuiteBegin,
        EventKind::SuiteEnd,
        EventKind::TestBegin,
        EventKind::TestEnd,
        EventKind::TestFail,
        EventKind::TestPass,
        EventKind::TestPending,
        EventKind::TestRetry,
    ];

    /// Get the wire name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::HookBegin => "hook",
            EventKind::HookEnd => "hook end",
            EventKind::RunBegin => "start",
            EventKind::DelayBegin => "waiting",
            EventKind::DelayEnd => "ready",
            EventKind::RunEnd => "end",
            EventKind::SuiteBegin => "suite",
            EventKind::SuiteEnd => "suite end",
            EventKind::TestBegin => "test",
            EventKind::TestEnd => "test end",
            EventKind::TestFail => "fail",
            EventKind::TestPass => "pass",
            EventKind::TestPending => "pending",
            EventKind::TestRetry => "retry",
        }
    }

    /// Get the lifecycle group this kind belongs to
    pub fn category(&self) -> &'static str {
        match self {
            EventKind::RunBegin
            | EventKind::RunEnd
            | EventKind::DelayBegin
            | EventKind::DelayEnd => "Run",
            EventKind::SuiteBegin | EventKind::SuiteEnd => "Suite",
            EventKind::HookBegin | EventKind::HookEnd => "Hook",
            _ => "Test",
        }
    }

    /// Parse from wire name
    pub fn from_name(name: &str) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether this kind opens or closes a runner lifecycle
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, EventKind::RunBegin | EventKind::RunEnd)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of a runner instance
///
/// Two runners are the same runner only if they share an id; ids are never reused
/// within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunnerId(u64);

impl RunnerId {
    /// Allocate a fresh, process-unique id
    pub fn next() -> Self {
        RunnerId(NEXT_RUNNER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runner#{}", self.0)
    }
}

/// A single emitted event with its extra arguments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            args: Vec::new(),
        }
    }

    pub fn with_args(kind: EventKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }

    /// Look up a string field on the first argument
    pub fn field(&self, key: &str) -> Option<&str> {
        self.args.first()?.get(key)?.as_str()
    }

    /// Title of the test or suite this event describes
    pub fn title(&self) -> Option<&str> {
        self.field("title")
    }

    /// Name of the runner that produced this event, when the payload carries one
    pub fn runner_name(&self) -> Option<&str> {
        self.field("runner")
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(runner) = self.runner_name() {
            write!(f, " [{runner}]")?;
        }
        if let Some(title) = self.title() {
            write!(f, " {title}")?;
        }
        Ok(())
    }
}
