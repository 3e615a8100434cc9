//! Run Aggregator - merge parallel test runners into one logical run
//!
//! A CLI tool that simulates several concurrently executing test runners and
//! shows the single merged event stream a reporter would see.
//!
//! ## Features
//!
//! - One aggregate run begin and end regardless of runner count
//! - Buffered, order-preserving replay of runners waiting for the output
//! - Watchdog reporting for sessions that never end
//! - Multiple output formats (Table, JSON, CSV, Summary)
//!
//! ## Usage
//!
//! ```bash
//! # Simulate three runners with five tests each
//! run-aggregator simulate
//!
//! # Reproducible session with more runners
//! run-aggregator simulate --runners 6 --tests 10 --seed 42
//!
//! # Runner 1 never finishes; the watchdog reports the stall
//! run-aggregator simulate --stall 1 --watchdog-ms 500
//!
//! # List event kinds
//! run-aggregator kinds --detailed
//!
//! # Write an example configuration
//! run-aggregator config init
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use run_aggregator::cli::{self, Args};
use run_aggregator::config::{print_env_help, AppConfig, ConfigFile, EnvConfig};
use run_aggregator::executor::Simulation;
use run_aggregator::models::EventKind;
use run_aggregator::output::{OutputFormat, ReportFormatter};
use run_aggregator::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env = EnvConfig::load();
    let explicit = args
        .command
        .config_path()
        .map(str::to_string)
        .or_else(|| env.config_file.clone());

    let mut file = if !args.command.reads_config_file() {
        ConfigFile::default()
    } else {
        match &explicit {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::load_default()?,
        }
    };
    file.app.apply_env(&env);

    // Initialize logging
    let level = LogLevel::resolve(
        Some(args.log_level.as_deref().unwrap_or(&file.app.log_level)),
        args.verbose,
    );
    init_logger(level);
    debug!("Log level: {:?}", level);

    match args.command {
        cli::Command::Simulate(sim_args) => {
            run_simulation(sim_args, file.app).await?;
        }
        cli::Command::Kinds(kinds_args) => {
            list_kinds(kinds_args);
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &file, &env)?;
        }
    }

    Ok(())
}

async fn run_simulation(args: cli::SimulateArgs, mut app: AppConfig) -> Result<()> {
    args.apply(&mut app.simulation);

    let format_name = args.format.as_deref().unwrap_or(&app.format);
    let format = OutputFormat::from_str(format_name)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {format_name}"))?;

    let simulation = Simulation::new(app.simulation)?;
    let outcome = simulation.run().await;

    info!(
        "Session finished in {}ms with {} merged events",
        outcome.elapsed_ms,
        outcome.events.len()
    );

    let formatter = ReportFormatter::new(format);
    println!("{}", formatter.format_outcome(&outcome));

    outcome.ensure_complete()?;
    Ok(())
}

fn list_kinds(args: cli::KindsArgs) {
    println!("\nEvent Kinds ({} total)\n", EventKind::ALL.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut current_category = "";

    for kind in EventKind::ALL {
        let category = kind.category();
        if args.detailed && category != current_category {
            println!("\n{category} Events:");
            println!("──────────────────────────────────────────────────────────────────────");
            current_category = category;
        }

        if args.detailed {
            let note = if kind.is_lifecycle() {
                " (coalesced across runners)"
            } else {
                ""
            };
            println!("  {:14} {:?}{}", kind.name(), kind, note);
        } else {
            println!("  {}", kind.name());
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
}

fn manage_config(args: cli::ConfigArgs, loaded: &ConfigFile, env: &EnvConfig) -> Result<()> {
    use std::path::Path;

    match args.action {
        cli::ConfigAction::Init { path, force } => {
            let target = Path::new(&path);
            if target.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {path}. Use --force to overwrite."
                );
            }

            ConfigFile::example().save(target)?;
            println!("✓ Configuration file created: {path}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { format } => {
            let output = if format == "json" {
                serde_json::to_string_pretty(loaded)?
            } else {
                serde_yaml::to_string(loaded)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Env => {
            print_env_help();
            if env.has_any() {
                println!();
                env.print_summary();
            }
        }
    }

    Ok(())
}
