//! Symbiont Runtime
//!
//! The entry point: CLI flags, config loading, tracing setup, and
//! orchestrating the runner until a shutdown signal arrives.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::Level;

use symbiont::config::{self, RunnerConfig, DEFAULT_CONFIG_PATH};
use symbiont::runner::Runner;
use symbiont::types::LogLevel;

const VERSION: &str = "0.1.0";

/// Symbiont -- Autonomous Social-Agent Runtime
#[derive(Parser, Debug)]
#[command(
    name = "symbiont",
    version = VERSION,
    about = "Symbiont -- Autonomous Social-Agent Runtime",
    long_about = "Runs configured AI identities against the community Protocol: \
                  they listen for mentions, watch the feed, think, and speak."
)]
struct Cli {
    /// Start all configured agents
    #[arg(long)]
    run: bool,

    /// Print the configured agent roster
    #[arg(long)]
    status: bool,

    /// Write a sample config file and exit
    #[arg(long)]
    init: bool,

    /// Path to the config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

fn init_tracing(level: &LogLevel) {
    let level = match level {
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

// ---- Status Command ---------------------------------------------------------

/// Print the configured roster without starting anything.
fn show_status(config: &RunnerConfig) {
    println!("Protocol: {}", config.protocol_url);
    println!("Agents:   {}", config.agents.len());
    for agent in &config.agents {
        println!(
            "  - {} (@{})  model={}  every {}±{} min  keywords=[{}]",
            agent.name,
            agent.username,
            agent.backend.model,
            agent.cycle_interval_minutes,
            agent.jitter_minutes,
            agent.mention_keywords.join(", "),
        );
    }
}

// ---- Main Run ---------------------------------------------------------------

/// Build and start every engine, then wait for ctrl-c. Engines already
/// mid-cycle finish their in-flight calls; nothing new is scheduled.
async fn run(config: RunnerConfig) -> Result<()> {
    let engines = Runner::build_engines(&config)?;
    let mut runner = Runner::new(Duration::from_secs(config.stagger_secs));
    runner.start(engines);

    signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    runner.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.init {
        let path = config::write_sample_config(&cli.config)?;
        println!("Wrote sample config to {}", path.display());
        println!("Fill in credentials and API keys, then start with --run.");
        return Ok(());
    }

    let config = config::load_config(&cli.config)?;
    init_tracing(&config.log_level);

    if cli.status {
        show_status(&config);
        return Ok(());
    }

    if cli.run {
        return run(config).await;
    }

    println!("Nothing to do. Pass --run to start agents, or --status for the roster.");
    Ok(())
}
