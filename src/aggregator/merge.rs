//! Run aggregation
//!
//! Merges the event streams of independently running runners into one logical run.
//! Exactly one runner owns the output at a time; events from the others are buffered
//! until the owner reports its end and then replayed in the order they arrived.

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::{Rc, Weak};
use tracing::{debug, info, trace, warn};

use super::contract::{Runner, RunnerRegistry};
use crate::events::{handler, EventEmitter, EventSource, Handler};
use crate::models::{Event, EventKind, RunStats, RunnerId};
use crate::stats::StatsCollector;

/// An event captured from a runner
struct Captured {
    runner: RunnerId,
    source: Weak<dyn Runner>,
    event: Event,
}

impl Captured {
    /// Total currently declared by the originating runner; zero once it is gone
    fn runner_total(&self) -> u64 {
        self.source.upgrade().map(|r| r.total()).unwrap_or(0)
    }
}

enum Work {
    Dispatch(Captured),
    /// Completion check that follows the replay of a finished runner's backlog
    Settle,
}

#[derive(Default)]
struct State {
    active: Option<RunnerId>,
    pending: Vec<Captured>,
    work: VecDeque<Work>,
    draining: bool,
    began: bool,
    finished: bool,
    registered: HashSet<RunnerId>,
}

impl State {
    fn has_queued_work(&self) -> bool {
        self.work.iter().any(|w| matches!(w, Work::Dispatch(_)))
    }
}

/// Point-in-time view of an aggregator
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AggregatorSnapshot {
    pub active: Option<RunnerId>,
    pub pending: usize,
    pub registered: usize,
    pub total: u64,
    pub began: bool,
    pub finished: bool,
}

struct Inner {
    output: EventEmitter,
    registry: Rc<dyn RunnerRegistry>,
    total: Cell<u64>,
    state: RefCell<State>,
}

impl Inner {
    fn add_total(&self, amount: u64) {
        self.total.set(self.total.get().saturating_add(amount));
    }

    /// Queue a captured event and drain the work list unless a drain is already running
    fn dispatch(&self, captured: Captured) {
        {
            let mut state = self.state.borrow_mut();
            state.work.push_back(Work::Dispatch(captured));
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let next = self.state.borrow_mut().work.pop_front();
            let Some(work) = next else {
                break;
            };

            let forward = match work {
                Work::Dispatch(captured) => self.route(captured),
                Work::Settle => self.settle(),
            };

            // No state borrow is held here: subscribers may feed more events in.
            if let Some(event) = forward {
                self.output.emit(&event);
            }
        }

        self.state.borrow_mut().draining = false;
    }

    /// Apply the per-kind policy to one event, returning what to forward
    fn route(&self, captured: Captured) -> Option<Event> {
        let mut state = self.state.borrow_mut();

        if let Some(active) = state.active {
            if active != captured.runner {
                trace!(
                    kind = %captured.event.kind,
                    runner = %captured.runner,
                    active = %active,
                    queued = state.pending.len() + 1,
                    "runner not active, buffering event"
                );
                state.pending.push(captured);
                return None;
            }
        }

        let kind = captured.event.kind;
        debug!(kind = %kind, runner = %captured.runner, "dispatching event");

        match kind {
            EventKind::RunBegin => {
                let first = !state.began;
                state.began = true;
                state.active = Some(captured.runner);
                self.add_total(captured.runner_total());

                if first {
                    info!(runner = %captured.runner, "run began");
                    Some(Event::new(EventKind::RunBegin))
                } else {
                    debug!(runner = %captured.runner, "runner took over the run");
                    None
                }
            }
            EventKind::RunEnd => {
                if state.finished {
                    warn!(runner = %captured.runner, "runner ended after the run was over");
                }
                state.active = None;
                let backlog = std::mem::take(&mut state.pending);
                if !backlog.is_empty() {
                    debug!(
                        runner = %captured.runner,
                        count = backlog.len(),
                        "replaying buffered events"
                    );
                }

                // Replay ahead of older work, then settle, as a nested flush would.
                state.work.push_front(Work::Settle);
                for item in backlog.into_iter().rev() {
                    state.work.push_front(Work::Dispatch(item));
                }
                None
            }
            _ => {
                if state.finished {
                    warn!(kind = %kind, runner = %captured.runner, "event after run end");
                }
                Some(captured.event)
            }
        }
    }

    /// Decide whether the whole run is over
    fn settle(&self) -> Option<Event> {
        let running = self.registry.running();
        if let Some(first) = running.first() {
            debug!(
                running = running.len(),
                first = %first.name,
                "runners still running, deferring run end"
            );
            return None;
        }

        let mut state = self.state.borrow_mut();
        if state.finished {
            return None;
        }
        if !state.pending.is_empty() {
            debug!(
                pending = state.pending.len(),
                "events still buffered, deferring run end"
            );
            return None;
        }
        // Events still waiting in the work list may reopen the run; check again after them.
        if state.has_queued_work() {
            trace!("work still queued, re-checking run end afterwards");
            if !matches!(state.work.back(), Some(Work::Settle)) {
                state.work.push_back(Work::Settle);
            }
            return None;
        }

        state.finished = true;
        info!(total = self.total.get(), "all runners finished, run ended");
        Some(Event::new(EventKind::RunEnd))
    }
}

/// Merges many runners into one logical run
pub struct RunAggregator {
    inner: Rc<Inner>,
    stats: Rc<StatsCollector>,
}

impl RunAggregator {
    /// Create an aggregator that consults `registry` before ending the run
    pub fn new(registry: Rc<dyn RunnerRegistry>) -> Self {
        let inner = Rc::new(Inner {
            output: EventEmitter::new(),
            registry,
            total: Cell::new(0),
            state: RefCell::new(State::default()),
        });
        let stats = StatsCollector::attach(&inner.output);
        Self { inner, stats }
    }

    /// Start merging the events of `runner`
    ///
    /// Adds the runner's current total right away; it is added again when the runner
    /// begins. The aggregator keeps only a weak reference to the runner.
    pub fn listen<R: Runner + 'static>(&self, runner: &Rc<R>) {
        let id = runner.id();
        if !self.inner.state.borrow_mut().registered.insert(id) {
            warn!(runner = %id, name = runner.name(), "runner already registered, ignoring");
            return;
        }

        let estimate = runner.total();
        self.inner.add_total(estimate);
        debug!(runner = %id, name = runner.name(), total = estimate, "listening to runner");

        let weak: Weak<R> = Rc::downgrade(runner);
        let source: Weak<dyn Runner> = weak;
        for kind in EventKind::ALL {
            let aggregator = Rc::downgrade(&self.inner);
            let source = source.clone();
            runner.on(
                kind,
                handler(move |event| {
                    if let Some(inner) = aggregator.upgrade() {
                        inner.dispatch(Captured {
                            runner: id,
                            source: source.clone(),
                            event: event.clone(),
                        });
                    }
                }),
            );
        }
    }

    /// Aggregate number of expected tests
    pub fn total(&self) -> u64 {
        self.inner.total.get()
    }

    /// Figures derived from the merged stream so far
    pub fn stats(&self) -> RunStats {
        self.stats.snapshot()
    }

    /// Whether the aggregate run end has been forwarded
    pub fn is_finished(&self) -> bool {
        self.inner.state.borrow().finished
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        let state = self.inner.state.borrow();
        AggregatorSnapshot {
            active: state.active,
            pending: state.pending.len(),
            registered: state.registered.len(),
            total: self.inner.total.get(),
            began: state.began,
            finished: state.finished,
        }
    }
}

impl EventSource for RunAggregator {
    fn on(&self, kind: EventKind, handler: Handler) {
        self.inner.output.on(kind, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::InstanceStatus;
    use crate::events::Transcript;
    use crate::runner::{ChildRegistry, ChildRunner};
    use std::collections::HashMap;

    /// Registry whose running flags are set by the test
    #[derive(Default)]
    struct FakeRegistry {
        running: RefCell<HashMap<RunnerId, bool>>,
    }

    impl FakeRegistry {
        fn set_running(&self, id: RunnerId, running: bool) {
            self.running.borrow_mut().insert(id, running);
        }
    }

    impl RunnerRegistry for FakeRegistry {
        fn instances(&self) -> Vec<InstanceStatus> {
            self.running
                .borrow()
                .iter()
                .map(|(id, running)| InstanceStatus {
                    id: *id,
                    name: id.to_string(),
                    running: *running,
                })
                .collect()
        }
    }

    fn setup() -> (Rc<ChildRegistry>, RunAggregator, Rc<Transcript>) {
        let registry = Rc::new(ChildRegistry::new());
        let aggregator = RunAggregator::new(registry.clone());
        let transcript = Transcript::attach(&aggregator);
        (registry, aggregator, transcript)
    }

    #[test]
    fn test_two_runner_scenario() {
        let (registry, aggregator, transcript) = setup();
        let r1 = registry.spawn("r1", 1);
        let r2 = registry.spawn("r2", 1);
        aggregator.listen(&r1);
        aggregator.listen(&r2);

        r1.begin();
        assert_eq!(transcript.kinds(), vec![EventKind::RunBegin]);

        r2.begin();
        assert_eq!(transcript.len(), 1);
        assert_eq!(aggregator.snapshot().pending, 1);

        r1.pass("test-pass", 1);
        assert_eq!(
            transcript.kinds(),
            vec![EventKind::RunBegin, EventKind::TestPass]
        );

        r1.end();
        // r2's begin was replayed and absorbed; r2 is still running
        assert_eq!(transcript.len(), 2);
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.active, Some(r2.id()));
        assert_eq!(snapshot.pending, 0);
        assert!(!aggregator.is_finished());

        r2.end();
        assert_eq!(
            transcript.kinds(),
            vec![EventKind::RunBegin, EventKind::TestPass, EventKind::RunEnd]
        );
        assert!(aggregator.is_finished());
        assert_eq!(aggregator.snapshot().active, None);
    }

    #[test]
    fn test_total_counts_registration_and_begin() {
        let (registry, aggregator, _transcript) = setup();
        let r1 = registry.spawn("r1", 5);
        let r2 = registry.spawn("r2", 3);

        aggregator.listen(&r1);
        aggregator.listen(&r2);
        assert_eq!(aggregator.total(), 8);

        r1.begin();
        assert_eq!(aggregator.total(), 13);

        // Buffered while r1 is active: no increment yet
        r2.begin();
        assert_eq!(aggregator.total(), 13);

        r1.end();
        assert_eq!(aggregator.total(), 16);

        r2.end();
        assert_eq!(aggregator.total(), 16);
    }

    #[test]
    fn test_begin_forwarded_once() {
        let (registry, aggregator, transcript) = setup();
        let runners: Vec<_> = (0..4)
            .map(|i| registry.spawn(format!("r{i}"), 1))
            .collect();
        for runner in &runners {
            aggregator.listen(runner);
        }

        for runner in &runners {
            runner.begin();
            runner.pass("works", 1);
            runner.end();
        }

        assert_eq!(transcript.count(EventKind::RunBegin), 1);
        assert_eq!(transcript.count(EventKind::RunEnd), 1);
        assert_eq!(transcript.count(EventKind::TestPass), 4);
        assert_eq!(transcript.kinds().last(), Some(&EventKind::RunEnd));
    }

    #[test]
    fn test_buffered_events_replay_in_arrival_order() {
        let (registry, aggregator, transcript) = setup();
        let r1 = registry.spawn("r1", 1);
        let r2 = registry.spawn("r2", 3);
        let r3 = registry.spawn("r3", 1);
        for runner in [&r1, &r2, &r3] {
            aggregator.listen(runner);
        }

        r1.begin();
        r2.begin();
        r2.pass("r2-a", 1);
        r3.begin();
        r2.pass("r2-b", 1);
        r3.pass("r3-a", 1);
        r2.fail("r2-c", "boom");
        r1.pass("r1-a", 1);

        // Only r1 is visible so far
        assert_eq!(transcript.titles(EventKind::TestPass), vec!["r1-a"]);

        r1.end();
        // r2 took over; r3's events were buffered again behind it
        assert_eq!(
            transcript.titles(EventKind::TestPass),
            vec!["r1-a", "r2-a", "r2-b"]
        );
        assert_eq!(transcript.titles(EventKind::TestFail), vec!["r2-c"]);
        assert_eq!(aggregator.snapshot().active, Some(r2.id()));
        assert_eq!(aggregator.snapshot().pending, 2);

        r2.end();
        assert_eq!(
            transcript.titles(EventKind::TestPass),
            vec!["r1-a", "r2-a", "r2-b", "r3-a"]
        );
        assert!(!aggregator.is_finished());

        r3.end();
        assert!(aggregator.is_finished());
        assert_eq!(transcript.count(EventKind::RunEnd), 1);
        assert_eq!(transcript.count(EventKind::RunBegin), 1);
    }

    #[test]
    fn test_unstarted_runner_blocks_run_end() {
        let (registry, aggregator, transcript) = setup();
        let r1 = registry.spawn("r1", 5);
        let silent = registry.spawn("silent", 3);
        aggregator.listen(&r1);
        aggregator.listen(&silent);

        r1.begin();
        r1.pass("only", 1);
        r1.end();

        assert_eq!(transcript.count(EventKind::RunEnd), 0);
        assert!(!aggregator.is_finished());
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.active, None);
        assert_eq!(snapshot.pending, 0);
        // Registration of both plus r1's begin; the silent runner counted once
        assert_eq!(snapshot.total, 5 + 3 + 5);
        assert_eq!(
            transcript.kinds(),
            vec![EventKind::RunBegin, EventKind::TestPass]
        );
    }

    #[test]
    fn test_runner_without_end_stalls_the_run() {
        let (registry, aggregator, transcript) = setup();
        let r1 = registry.spawn("r1", 1);
        let r2 = registry.spawn("r2", 1);
        aggregator.listen(&r1);
        aggregator.listen(&r2);

        r1.begin();
        r2.begin();
        r2.pass("hidden", 1);
        r2.end();

        // r1 never ends, so r2 stays buffered forever
        assert_eq!(transcript.kinds(), vec![EventKind::RunBegin]);
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.active, Some(r1.id()));
        assert_eq!(snapshot.pending, 3);
        assert!(!snapshot.finished);
    }

    #[test]
    fn test_end_gate_consults_registry() {
        let registry = Rc::new(FakeRegistry::default());
        let aggregator = RunAggregator::new(registry.clone());
        let transcript = Transcript::attach(&aggregator);

        let r1 = Rc::new(ChildRunner::new("r1", 1));
        let r2 = Rc::new(ChildRunner::new("r2", 1));
        aggregator.listen(&r1);
        aggregator.listen(&r2);
        registry.set_running(r1.id(), false);
        registry.set_running(r2.id(), true);

        r1.begin();
        r1.end();
        assert_eq!(transcript.count(EventKind::RunEnd), 0);

        // The flag clearing alone does not end the run; the next end does
        registry.set_running(r2.id(), false);
        assert!(!aggregator.is_finished());

        r2.begin();
        r2.end();
        assert_eq!(transcript.count(EventKind::RunEnd), 1);
    }

    #[test]
    fn test_run_end_forwarded_at_most_once() {
        let (registry, aggregator, transcript) = setup();
        let r1 = registry.spawn("r1", 1);
        aggregator.listen(&r1);

        r1.begin();
        r1.end();
        assert!(aggregator.is_finished());

        let late = registry.spawn("late", 1);
        aggregator.listen(&late);
        late.begin();
        late.pass("late-test", 1);
        late.end();

        assert_eq!(transcript.count(EventKind::RunBegin), 1);
        assert_eq!(transcript.count(EventKind::RunEnd), 1);
        assert_eq!(transcript.titles(EventKind::TestPass), vec!["late-test"]);
    }

    #[test]
    fn test_duplicate_listen_is_ignored() {
        let (registry, aggregator, transcript) = setup();
        let r1 = registry.spawn("r1", 4);
        aggregator.listen(&r1);
        aggregator.listen(&r1);
        assert_eq!(aggregator.total(), 4);
        assert_eq!(aggregator.snapshot().registered, 1);

        r1.begin();
        r1.pass("once", 1);
        assert_eq!(transcript.count(EventKind::TestPass), 1);
    }

    #[test]
    fn test_subscriber_may_trigger_runner_events() {
        let (registry, aggregator, transcript) = setup();
        let r1 = registry.spawn("r1", 1);
        let r2 = registry.spawn("r2", 1);
        aggregator.listen(&r1);
        aggregator.listen(&r2);

        // Starting r2 from inside a subscriber re-enters the aggregator
        let starter = r2.clone();
        aggregator.on(
            EventKind::TestPass,
            handler(move |event| {
                if event.title() == Some("kick") {
                    starter.begin();
                    starter.pass("from-r2", 1);
                }
            }),
        );

        r1.begin();
        r1.pass("kick", 1);
        assert_eq!(transcript.titles(EventKind::TestPass), vec!["kick"]);
        assert_eq!(aggregator.snapshot().pending, 2);

        r1.end();
        assert_eq!(
            transcript.titles(EventKind::TestPass),
            vec!["kick", "from-r2"]
        );

        r2.end();
        assert!(aggregator.is_finished());
    }

    #[test]
    fn test_run_ends_after_subscriber_ends_runner_and_another_emits() {
        let registry = Rc::new(FakeRegistry::default());
        let aggregator = RunAggregator::new(registry.clone());
        let transcript = Transcript::attach(&aggregator);

        let r1 = Rc::new(ChildRunner::new("r1", 1));
        let r2 = Rc::new(ChildRunner::new("r2", 1));
        aggregator.listen(&r1);
        aggregator.listen(&r2);

        let (ender, other) = (r1.clone(), r2.clone());
        aggregator.on(
            EventKind::TestPass,
            handler(move |event| {
                if event.title() == Some("kick") {
                    ender.end();
                    other.pass("late", 1);
                }
            }),
        );

        r1.begin();
        r1.pass("kick", 1);

        assert_eq!(
            transcript.kinds(),
            vec![
                EventKind::RunBegin,
                EventKind::TestPass,
                EventKind::TestPass,
                EventKind::RunEnd
            ]
        );
        assert_eq!(transcript.titles(EventKind::TestPass), vec!["kick", "late"]);
        assert!(aggregator.is_finished());
    }

    #[test]
    fn test_requeued_events_block_end_when_nothing_runs() {
        let registry = Rc::new(FakeRegistry::default());
        let aggregator = RunAggregator::new(registry.clone());
        let transcript = Transcript::attach(&aggregator);

        let r1 = Rc::new(ChildRunner::new("r1", 1));
        let r2 = Rc::new(ChildRunner::new("r2", 1));
        let r3 = Rc::new(ChildRunner::new("r3", 1));
        for runner in [&r1, &r2, &r3] {
            aggregator.listen(runner);
            registry.set_running(runner.id(), false);
        }

        r1.begin();
        r2.begin();
        r2.pass("r2-a", 1);
        r3.pass("r3-a", 1);

        r1.end();
        // r2 took over during replay and r3's event went back into the queue
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.active, Some(r2.id()));
        assert_eq!(snapshot.pending, 1);
        assert_eq!(transcript.count(EventKind::RunEnd), 0);
        assert_eq!(transcript.titles(EventKind::TestPass), vec!["r2-a"]);

        r2.end();
        assert_eq!(transcript.titles(EventKind::TestPass), vec!["r2-a", "r3-a"]);
        assert_eq!(transcript.count(EventKind::RunEnd), 1);
        assert_eq!(transcript.kinds().last(), Some(&EventKind::RunEnd));
    }

    #[test]
    fn test_long_replay_chain_is_iterative() {
        let registry: Rc<dyn RunnerRegistry> = Rc::new(FakeRegistry::default());
        let aggregator = RunAggregator::new(registry);
        let transcript = Transcript::attach(&aggregator);

        let first = Rc::new(ChildRunner::new("first", 1));
        aggregator.listen(&first);
        first.begin();

        let runners: Vec<_> = (0..2_000)
            .map(|i| Rc::new(ChildRunner::new(format!("r{i}"), 1)))
            .collect();
        for runner in &runners {
            aggregator.listen(runner);
        }
        for runner in &runners {
            runner.begin();
        }
        for runner in &runners {
            runner.pass("chained", 1);
            runner.end();
        }

        first.end();

        assert_eq!(transcript.count(EventKind::RunBegin), 1);
        assert_eq!(transcript.count(EventKind::TestPass), 2_000);
        assert_eq!(transcript.count(EventKind::RunEnd), 1);
        assert_eq!(transcript.kinds().last(), Some(&EventKind::RunEnd));
        assert_eq!(aggregator.snapshot().pending, 0);
    }

    #[test]
    fn test_stats_follow_merged_stream() {
        let (registry, aggregator, _transcript) = setup();
        let r1 = registry.spawn("r1", 2);
        let r2 = registry.spawn("r2", 1);
        aggregator.listen(&r1);
        aggregator.listen(&r2);

        r1.begin();
        r1.root_suite_begin();
        r1.suite_begin("math");
        r1.test_begin("adds");
        r1.pass("adds", 2);
        r1.test_end("adds");
        r2.begin();
        r2.root_suite_begin();
        r2.test_begin("io");
        r2.fail("io", "disk full");
        r2.test_end("io");
        r2.root_suite_end();
        r2.end();
        r1.test_begin("skips");
        r1.pending("skips");
        r1.test_end("skips");
        r1.suite_end("math");
        r1.root_suite_end();

        // r2 is still buffered behind r1
        let stats = aggregator.stats();
        assert_eq!(stats.tests, 2);
        assert_eq!(stats.failures, 0);

        r1.end();
        let stats = aggregator.stats();
        assert_eq!(stats.suites, 1);
        assert_eq!(stats.tests, 3);
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.pending, 1);
        assert!(stats.is_finished());
    }

    #[test]
    fn test_dropped_aggregator_stops_listening() {
        let registry = Rc::new(ChildRegistry::new());
        let r1 = registry.spawn("r1", 1);
        {
            let aggregator = RunAggregator::new(registry.clone());
            aggregator.listen(&r1);
        }
        // Handlers hold only weak references; emitting is harmless
        r1.begin();
        r1.end();
    }
}
