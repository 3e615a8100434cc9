//! Simulated test session
//!
//! Drives several child runners concurrently on one thread and merges them through a
//! [`RunAggregator`], with a watchdog for sessions that never end.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::LocalSet;
use tracing::{debug, info, warn};

use crate::aggregator::{AggregatorSnapshot, Runner, RunnerRegistry, RunAggregator};
use crate::config::SimulationConfig;
use crate::events::Transcript;
use crate::models::{Event, RunStats};
use crate::runner::{ChildRegistry, ChildRunner};

/// Simulation errors
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("Run did not end: {0}")]
    Stalled(StallReport),
}

/// Why a session did not end
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StallReport {
    pub waited_ms: u64,
    /// Runner occupying the merged stream, if any
    pub active: Option<String>,
    /// Events buffered behind the active runner
    pub pending: usize,
    /// Runners the registry still reports as running
    pub running: Vec<String>,
}

impl fmt::Display for StallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "waited {}ms", self.waited_ms)?;
        if let Some(active) = &self.active {
            write!(f, ", {active} still active")?;
        }
        write!(f, ", {} event(s) buffered", self.pending)?;
        if !self.running.is_empty() {
            write!(f, ", running: {}", self.running.join(", "))?;
        }
        Ok(())
    }
}

/// Everything observed during one session
#[derive(Clone, Debug, Serialize)]
pub struct SessionOutcome {
    pub runners: usize,
    pub events: Vec<Event>,
    pub stats: RunStats,
    pub total: u64,
    pub snapshot: AggregatorSnapshot,
    pub elapsed_ms: u64,
    pub stall: Option<StallReport>,
}

impl SessionOutcome {
    pub fn is_complete(&self) -> bool {
        self.stall.is_none()
    }

    /// Turn a stalled session into an error
    pub fn ensure_complete(&self) -> Result<(), SimulationError> {
        match &self.stall {
            Some(report) => Err(SimulationError::Stalled(report.clone())),
            None => Ok(()),
        }
    }
}

/// Per-runner script
#[derive(Clone, Debug)]
struct RunnerPlan {
    tests: u32,
    seed: u64,
    failure_rate: f64,
    pending_rate: f64,
    max_delay_ms: u64,
    stall: bool,
}

/// Simulated multi-runner session
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        validate(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run the session to completion or until the watchdog fires
    pub async fn run(&self) -> SessionOutcome {
        LocalSet::new().run_until(self.drive()).await
    }

    async fn drive(&self) -> SessionOutcome {
        let config = &self.config;
        let registry = Rc::new(ChildRegistry::new());
        let aggregator = RunAggregator::new(registry.clone());
        let transcript = Transcript::attach(&aggregator);
        let slots = Rc::new(Semaphore::new(config.max_concurrent));
        let base_seed = config.seed.unwrap_or_else(rand::random);

        info!(
            "Simulating {} runners x {} tests (max {} concurrent, seed {})",
            config.runners, config.tests_per_runner, config.max_concurrent, base_seed
        );

        let start = Instant::now();
        let mut handles = Vec::with_capacity(config.runners);

        for index in 0..config.runners {
            let child = registry.spawn(
                format!("runner-{index}"),
                u64::from(config.tests_per_runner),
            );
            aggregator.listen(&child);

            let plan = RunnerPlan {
                tests: config.tests_per_runner,
                seed: base_seed.wrapping_add(index as u64),
                failure_rate: config.failure_rate,
                pending_rate: config.pending_rate,
                max_delay_ms: config.max_delay_ms,
                stall: config.stalled_runner == Some(index),
            };
            handles.push(tokio::task::spawn_local(run_child(
                child,
                plan,
                slots.clone(),
            )));
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let watchdog = Duration::from_millis(config.watchdog_ms);
        let finished_in_time = tokio::time::timeout(watchdog, join_all(handles))
            .await
            .is_ok();

        if !finished_in_time {
            warn!(
                "Watchdog fired after {}ms, aborting remaining runners",
                config.watchdog_ms
            );
            for abort in aborts {
                abort.abort();
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let snapshot = aggregator.snapshot();
        let stall = if aggregator.is_finished() {
            None
        } else {
            Some(stall_report(&registry, &snapshot, elapsed_ms))
        };

        match &stall {
            None => info!(
                "Session completed in {}ms - {}",
                elapsed_ms,
                aggregator.stats()
            ),
            Some(report) => warn!(
                "Session stalled: active={:?} pending={} running={:?}",
                report.active, report.pending, report.running
            ),
        }

        SessionOutcome {
            runners: config.runners,
            events: transcript.events(),
            stats: aggregator.stats(),
            total: aggregator.total(),
            snapshot,
            elapsed_ms,
            stall,
        }
    }
}

fn validate(config: &SimulationConfig) -> Result<(), SimulationError> {
    if config.runners == 0 {
        return Err(SimulationError::InvalidConfig(
            "at least one runner is required".to_string(),
        ));
    }
    if config.max_concurrent == 0 {
        return Err(SimulationError::InvalidConfig(
            "max_concurrent must be at least 1".to_string(),
        ));
    }
    let rates_ok = (0.0..=1.0).contains(&config.failure_rate)
        && (0.0..=1.0).contains(&config.pending_rate)
        && config.failure_rate + config.pending_rate <= 1.0;
    if !rates_ok {
        return Err(SimulationError::InvalidConfig(format!(
            "failure_rate ({}) and pending_rate ({}) must be within 0..=1 and sum to at most 1",
            config.failure_rate, config.pending_rate
        )));
    }
    if let Some(index) = config.stalled_runner {
        if index >= config.runners {
            return Err(SimulationError::InvalidConfig(format!(
                "stalled_runner {index} is out of range for {} runners",
                config.runners
            )));
        }
    }
    Ok(())
}

fn stall_report(
    registry: &ChildRegistry,
    snapshot: &AggregatorSnapshot,
    waited_ms: u64,
) -> StallReport {
    let active = snapshot
        .active
        .and_then(|id| registry.find(id))
        .map(|child| child.name().to_string());

    StallReport {
        waited_ms,
        active,
        pending: snapshot.pending,
        running: registry.running().into_iter().map(|i| i.name).collect(),
    }
}

async fn run_child(child: Rc<ChildRunner>, plan: RunnerPlan, slots: Rc<Semaphore>) {
    let Ok(_permit) = slots.acquire().await else {
        return;
    };
    let mut rng = StdRng::seed_from_u64(plan.seed);

    pause(&mut rng, plan.max_delay_ms).await;
    debug!("{} starting", child.name());
    child.begin();
    child.root_suite_begin();

    let suite = format!("{} suite", child.name());
    child.suite_begin(&suite);

    for n in 1..=plan.tests {
        let title = format!("{} test {n}", child.name());
        let roll: f64 = rng.random();

        if roll < plan.pending_rate {
            child.pending(&title);
            child.test_end(&title);
            continue;
        }

        child.test_begin(&title);
        let elapsed = pause(&mut rng, plan.max_delay_ms).await;
        if roll < plan.pending_rate + plan.failure_rate {
            child.fail(&title, "simulated failure");
        } else {
            child.pass(&title, elapsed);
        }
        child.test_end(&title);
    }

    child.suite_end(&suite);
    child.root_suite_end();

    if plan.stall {
        warn!("{} stalled before reporting its end", child.name());
        std::future::pending::<()>().await;
    }

    child.end();
    debug!("{} finished", child.name());
}

async fn pause(rng: &mut StdRng, max_ms: u64) -> u64 {
    let ms = if max_ms == 0 {
        0
    } else {
        rng.random_range(0..=max_ms)
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
    ms
}
