//! Vigil daemon CLI
//!
//! `vigild replay` feeds newline-delimited sensor events through the fusion
//! engine and prints every emitted security event.

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_engine::{EngineEvent, FusionEngine, IngestOutcome, VigilConfig};
use vigil_types::{CircleId, HouseMode, SensorEvent, SiteTopology};

/// Vigil daemon CLI
#[derive(Parser)]
#[command(name = "vigild")]
#[command(about = "Vigil - sensor fusion for home security", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VIGIL_CONFIG", global = true)]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "VIGIL_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "VIGIL_LOG_JSON", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded sensor events through the engine
    Replay {
        /// Site topology JSON
        #[arg(long)]
        topology: String,

        /// Newline-delimited sensor events
        #[arg(long)]
        events: String,

        /// House mode applied to every circle in the stream
        #[arg(long, default_value = "disarmed")]
        mode: HouseMode,

        /// Print pretty JSON
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = VigilConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(
        cli.log_level.as_deref().unwrap_or(config.logging.level.as_str()),
        cli.json_logs || config.logging.json,
    );

    match cli.command {
        Commands::Replay {
            topology,
            events,
            mode,
            pretty,
        } => replay(config, &topology, &events, mode, pretty).await,
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn replay(
    config: VigilConfig,
    topology_path: &str,
    events_path: &str,
    mode: HouseMode,
    pretty: bool,
) -> Result<()> {
    let topology = SiteTopology::load(topology_path)
        .with_context(|| format!("loading topology from {topology_path}"))?;
    let engine = FusionEngine::in_memory(config, topology)?;
    let mut seen_circles: Vec<CircleId> = Vec::new();
    let mut updates = engine.subscribe();

    let file = File::open(events_path).with_context(|| format!("opening {events_path}"))?;
    let mut ingested = 0usize;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let signal: SensorEvent = serde_json::from_str(&line)
            .with_context(|| format!("parsing event on line {}", index + 1))?;
        if !seen_circles.contains(&signal.circle_id) {
            engine.set_house_mode(signal.circle_id.clone(), mode);
            seen_circles.push(signal.circle_id.clone());
        }

        if let IngestOutcome::Skipped(reason) = engine.ingest(signal).await? {
            tracing::debug!(line = index + 1, reason = ?reason, "Skipped event");
        }
        ingested += 1;

        while let Ok(update) = updates.try_recv() {
            let event = match update {
                EngineEvent::EventEmitted(event) | EngineEvent::EventUpgraded { event, .. } => {
                    event
                }
                _ => continue,
            };
            let rendered = if pretty {
                serde_json::to_string_pretty(&event)?
            } else {
                serde_json::to_string(&event)?
            };
            println!("{rendered}");
        }
    }

    let stats = engine.stats();
    tracing::info!(
        ingested,
        emitted = stats.emitted,
        upgraded = stats.upgraded,
        suppressed = stats.suppressed,
        skipped = stats.skipped,
        "Replay complete"
    );
    Ok(())
}
