//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "RUN_AGGREGATOR";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Runner count from RUN_AGGREGATOR_RUNNERS
    pub runners: Option<usize>,
    /// Tests per runner from RUN_AGGREGATOR_TESTS
    pub tests: Option<u32>,
    /// Concurrency limit from RUN_AGGREGATOR_CONCURRENT
    pub concurrent: Option<usize>,
    /// Seed from RUN_AGGREGATOR_SEED
    pub seed: Option<u64>,
    /// Watchdog from RUN_AGGREGATOR_WATCHDOG_MS
    pub watchdog_ms: Option<u64>,
    /// Log level from RUN_AGGREGATOR_LOG
    pub log_level: Option<String>,
    /// Output format from RUN_AGGREGATOR_FORMAT
    pub format: Option<String>,
    /// Config file from RUN_AGGREGATOR_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            runners: get_env_parse("RUNNERS"),
            tests: get_env_parse("TESTS"),
            concurrent: get_env_parse("CONCURRENT"),
            seed: get_env_parse("SEED"),
            watchdog_ms: get_env_parse("WATCHDOG_MS"),
            log_level: get_env("LOG"),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.runners.is_some()
            || self.tests.is_some()
            || self.concurrent.is_some()
            || self.seed.is_some()
            || self.watchdog_ms.is_some()
            || self.log_level.is_some()
            || self.format.is_some()
            || self.config_file.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_RUNNERS:     {:?}", ENV_PREFIX, self.runners);
        println!("  {}_TESTS:       {:?}", ENV_PREFIX, self.tests);
        println!("  {}_CONCURRENT:  {:?}", ENV_PREFIX, self.concurrent);
        println!("  {}_SEED:        {:?}", ENV_PREFIX, self.seed);
        println!("  {}_WATCHDOG_MS: {:?}", ENV_PREFIX, self.watchdog_ms);
        println!("  {}_LOG:         {:?}", ENV_PREFIX, self.log_level);
        println!("  {}_FORMAT:      {:?}", ENV_PREFIX, self.format);
        println!("  {}_CONFIG:      {:?}", ENV_PREFIX, self.config_file);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn runners(mut self, runners: usize) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_RUNNERS"), runners.to_string()));
        self
    }

    pub fn tests(mut self, tests: u32) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_TESTS"), tests.to_string()));
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_SEED"), seed.to_string()));
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_FORMAT"), format.into()));
        self
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all RUN_AGGREGATOR environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_RUNNERS      Number of simulated runners");
    println!("  {ENV_PREFIX}_TESTS        Tests per runner");
    println!("  {ENV_PREFIX}_CONCURRENT   Runners executing at the same time");
    println!("  {ENV_PREFIX}_SEED         Random seed for reproducible sessions");
    println!("  {ENV_PREFIX}_WATCHDOG_MS  Time to wait for the merged run to end");
    println!("  {ENV_PREFIX}_LOG          Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_FORMAT       Output format (table, json, json-pretty, csv, summary)");
    println!("  {ENV_PREFIX}_CONFIG       Path to configuration file");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_RUNNERS=5");
    println!("  export {ENV_PREFIX}_SEED=42");
    println!("  run-aggregator simulate");
}
