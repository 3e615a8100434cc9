//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

use crate::config::SimulationConfig;

/// Merge concurrently running test runners into one logical run
#[derive(Parser, Debug)]
#[command(name = "run-aggregator")]
#[command(author = "hephaex@gmail.com")]
#[command(version = "0.1.0")]
#[command(about = "Merge the event streams of parallel test runners into one run")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulated multi-runner session
    Simulate(SimulateArgs),

    /// List event kinds and their wire names
    Kinds(KindsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

impl Command {
    /// Whether the command needs the existing configuration file
    ///
    /// `config init` writes a new file and must work even when the old one is invalid.
    pub fn reads_config_file(&self) -> bool {
        !matches!(
            self,
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { .. }
            })
        )
    }

    /// Configuration file named on the command line
    pub fn config_path(&self) -> Option<&str> {
        match self {
            Command::Simulate(sim) => sim.config.as_deref(),
            _ => None,
        }
    }
}

/// Arguments for simulate command
#[derive(Parser, Debug, Default)]
pub struct SimulateArgs {
    /// Number of child runners
    #[arg(short, long)]
    pub runners: Option<usize>,

    /// Tests per runner
    #[arg(short, long)]
    pub tests: Option<u32>,

    /// Maximum runners executing at once
    #[arg(short, long)]
    pub concurrent: Option<usize>,

    /// Probability that a test fails (0-1)
    #[arg(long)]
    pub failure_rate: Option<f64>,

    /// Probability that a test is skipped as pending (0-1)
    #[arg(long)]
    pub pending_rate: Option<f64>,

    /// Upper bound for simulated test duration in milliseconds
    #[arg(long)]
    pub max_delay_ms: Option<u64>,

    /// Seed for reproducible sessions
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Index of a runner that never finishes
    #[arg(long)]
    pub stall: Option<usize>,

    /// Give up waiting for the run to end after this many milliseconds
    #[arg(long)]
    pub watchdog_ms: Option<u64>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Configuration file
    #[arg(long)]
    pub config: Option<String>,
}

impl SimulateArgs {
    /// Overlay command-line values on a loaded configuration
    pub fn apply(&self, config: &mut SimulationConfig) {
        if let Some(runners) = self.runners {
            config.runners = runners;
        }
        if let Some(tests) = self.tests {
            config.tests_per_runner = tests;
        }
        if let Some(concurrent) = self.concurrent {
            config.max_concurrent = concurrent;
        }
        if let Some(rate) = self.failure_rate {
            config.failure_rate = rate;
        }
        if let Some(rate) = self.pending_rate {
            config.pending_rate = rate;
        }
        if let Some(delay) = self.max_delay_ms {
            config.max_delay_ms = delay;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if self.stall.is_some() {
            config.stalled_runner = self.stall;
        }
        if let Some(watchdog) = self.watchdog_ms {
            config.watchdog_ms = watchdog;
        }
    }
}

/// Arguments for kinds command
#[derive(Parser, Debug)]
pub struct KindsArgs {
    /// Show lifecycle group of each kind
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(default_value = "./run-aggregator.yaml")]
        path: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Show supported environment variables
    Env,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulate_args() {
        let args = Args::parse_from([
            "run-aggregator",
            "simulate",
            "--runners",
            "4",
            "--seed",
            "9",
            "--stall",
            "2",
            "--format",
            "summary",
        ]);
        match args.command {
            Command::Simulate(sim) => {
                assert_eq!(sim.runners, Some(4));
                assert_eq!(sim.seed, Some(9));
                assert_eq!(sim.stall, Some(2));
                assert_eq!(sim.format.as_deref(), Some("summary"));
                assert_eq!(sim.tests, None);
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["run-aggregator", "kinds", "--detailed", "-v"]);
        assert!(args.verbose);
        match args.command {
            Command::Kinds(kinds) => assert!(kinds.detailed),
            _ => panic!("Expected Kinds command"),
        }
    }

    #[test]
    fn test_config_init_default_path() {
        let args = Args::parse_from(["run-aggregator", "--log-level", "debug", "config", "init"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { path, force },
            }) => {
                assert_eq!(path, "./run-aggregator.yaml");
                assert!(!force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_config_init_skips_existing_file() {
        let init = Args::parse_from(["run-aggregator", "config", "init", "--force"]);
        assert!(!init.command.reads_config_file());

        let show = Args::parse_from(["run-aggregator", "config", "show"]);
        assert!(show.command.reads_config_file());

        let sim = Args::parse_from(["run-aggregator", "simulate", "--config", "custom.yaml"]);
        assert!(sim.command.reads_config_file());
        assert_eq!(sim.command.config_path(), Some("custom.yaml"));
        assert_eq!(show.command.config_path(), None);
    }

    #[test]
    fn test_apply_overrides_only_given_values() {
        let mut config = SimulationConfig::default();
        let args = SimulateArgs {
            runners: Some(7),
            failure_rate: Some(0.5),
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.runners, 7);
        assert_eq!(config.failure_rate, 0.5);
        assert_eq!(config.tests_per_runner, SimulationConfig::default().tests_per_runner);
        assert_eq!(config.stalled_runner, None);
    }
}
