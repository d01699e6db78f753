//! flowsim CLI
//!
//! Run a discrete-event simulation from a TOML or JSON configuration file.
//!
//! # Example
//!
//! ```bash
//! # Run with the seed from the file and print the result
//! flowsim run line.toml
//!
//! # Override seed and horizon, write the result to a file
//! flowsim run line.json --seed 7 --duration 3600 --output result.json
//!
//! # Check a configuration without running it
//! flowsim validate line.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowsim_simulation::{RunStatus, SimulationEngine};
use flowsim_simulator::{load_config, RunOverrides};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// flowsim
///
/// Deterministic discrete-event simulation of devices and flows.
/// Identical configuration and seed give identical results.
#[derive(Parser, Debug)]
#[command(name = "flowsim")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulation and emit the JSON result
    Run {
        /// Configuration file (.toml or .json)
        config: PathBuf,

        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the simulated duration in seconds
        #[arg(short = 'd', long)]
        duration: Option<f64>,

        /// Write the result here instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Omit the event timeline
        #[arg(long)]
        no_events: bool,

        /// Omit the device state history
        #[arg(long)]
        no_history: bool,
    },

    /// Validate a configuration without running it
    Validate {
        /// Configuration file (.toml or .json)
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,flowsim=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            seed,
            duration,
            output,
            no_events,
            no_history,
        } => {
            let overrides = RunOverrides {
                seed,
                duration,
                include_events: no_events.then_some(false),
                include_history: no_history.then_some(false),
            };
            let loaded = load_config(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let loaded = overrides.apply(loaded);

            info!(
                config = %config.display(),
                seed = loaded.simulation.random_seed,
                duration_secs = loaded.simulation.duration,
                devices = loaded.devices.len(),
                flows = loaded.flows.len(),
                "Starting simulation"
            );

            let result = SimulationEngine::new(loaded)
                .context("configuration rejected")?
                .run()
                .context("simulation failed")?;

            if result.status == RunStatus::DeadlockDetected {
                if let Some(error) = &result.error {
                    warn!(message = %error.message, "Run ended in deadlock");
                }
            }

            let json = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(output = %path.display(), "Result written");
                }
                None => println!("{json}"),
            }
        }

        Commands::Validate { config } => {
            let loaded = load_config(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            loaded
                .validate()
                .with_context(|| format!("validating {}", config.display()))?;
            SimulationEngine::new(loaded).context("configuration rejected")?;
            println!("{}: ok", config.display());
        }
    }

    Ok(())
}
