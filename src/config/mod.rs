//! Configuration module
//!
//! Handles loading and managing configuration.

mod env;
mod file;

pub use env::{print_env_help, EnvBuilder, EnvConfig};
pub use file::ConfigFile;

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Output format (table, json, json-pretty, csv, summary)
    pub format: String,

    /// Simulated session settings
    pub simulation: SimulationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: "table".to_string(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Apply environment overrides on top of this configuration
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(level) = &env.log_level {
            self.log_level = level.clone();
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
        if let Some(runners) = env.runners {
            self.simulation.runners = runners;
        }
        if let Some(tests) = env.tests {
            self.simulation.tests_per_runner = tests;
        }
        if let Some(concurrent) = env.concurrent {
            self.simulation.max_concurrent = concurrent;
        }
        if let Some(seed) = env.seed {
            self.simulation.seed = Some(seed);
        }
        if let Some(watchdog) = env.watchdog_ms {
            self.simulation.watchdog_ms = watchdog;
        }
    }
}

/// Simulated session configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of child runners
    pub runners: usize,

    /// Tests each runner executes
    pub tests_per_runner: u32,

    /// Runners allowed to execute at the same time
    pub max_concurrent: usize,

    /// Probability that a test fails
    pub failure_rate: f64,

    /// Probability that a test is pending
    pub pending_rate: f64,

    /// Upper bound of the random delay before each test, in milliseconds
    pub max_delay_ms: u64,

    /// How long to wait for the merged run to end, in milliseconds
    pub watchdog_ms: u64,

    /// Index of a runner that never reports its end
    pub stalled_runner: Option<usize>,

    /// Random seed; a fresh one is drawn when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            runners: 3,
            tests_per_runner: 5,
            max_concurrent: 2,
            failure_rate: 0.1,
            pending_rate: 0.05,
            max_delay_ms: 20,
            watchdog_ms: 10_000,
            stalled_runner: None,
            seed: None,
        }
    }
}
