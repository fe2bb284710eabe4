//! MQTT bridge - main entry point

use clap::{Parser, Subcommand};
use mqtt_bridge::broker::{select_broker, BrokerPrioritizer, TcpProbe};
use mqtt_bridge::config::BridgeConfig;
use mqtt_bridge::lifecycle::BridgeApp;
use mqtt_bridge::local::InProcessBus;
use mqtt_bridge::observability::init_default_logging;
use mqtt_bridge::shutdown::{ShutdownReason, ShutdownSignal};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Bridge between a local pub/sub bus and a prioritized set of MQTT brokers
#[derive(Parser)]
#[command(name = "mqtt-bridge")]
#[command(about = "Bridge local pub/sub endpoints to the best reachable MQTT broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select a broker, connect and relay until shutdown
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Probe broker candidates and print the ranking without connecting
    Probe,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!("Starting mqtt-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Probe => probe_brokers(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(BridgeConfig::load_from_file(path)?);
    }

    for path_str in ["mqtt_bridge.toml", "config/mqtt_bridge.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(BridgeConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create mqtt_bridge.toml".into())
}

/// Request a graceful shutdown on SIGINT or SIGTERM
fn spawn_signal_listener(shutdown: ShutdownSignal) -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
            _ = shutdown.wait() => return,
        };
        info!("Received {}, shutting down gracefully...", name);
        shutdown.request(ShutdownReason::graceful(name));
    });
    Ok(())
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = ShutdownSignal::new();
    spawn_signal_listener(shutdown.clone())?;

    let bus = Arc::new(InProcessBus::new());
    let running = BridgeApp::new(config)
        .with_shutdown_signal(shutdown)
        .start(bus)
        .await?;

    let reason = running.wait().await;
    if reason.fatal {
        // Non-zero exit lets the supervisor restart with a fresh broker selection
        return Err(format!("fatal shutdown: {}", reason.message).into());
    }
    Ok(())
}

fn handle_config_command(config: &BridgeConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    let specs = config.bridge_specs();
    let invalid = specs
        .iter()
        .enumerate()
        .filter_map(|(i, spec)| match spec {
            Ok(spec) => spec.validate().err().map(|e| (i, e)),
            Err(e) => Some((i, e.to_string())),
        })
        .collect::<Vec<_>>();

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    println!(
        "Configuration valid: {} broker candidate(s), {} bridge(s)",
        config.ip.len(),
        specs.len()
    );
    for (index, reason) in &invalid {
        println!("  bridge #{index} will be skipped: {reason}");
    }
    Ok(())
}

async fn probe_brokers(config: &BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let candidates = config.ip.candidates();
    let prioritizer = BrokerPrioritizer::new(Arc::new(TcpProbe::from_config(&config.probe)))
        .with_concurrency(config.probe.concurrent);
    let reachable = prioritizer.probe_all(&candidates).await;

    for (index, (name, candidate)) in config.ip.entries().iter().enumerate() {
        let status = if reachable.is_reachable(index) {
            "reachable"
        } else {
            "unreachable"
        };
        let shown = candidate.to_string();
        println!("{name:<16} {shown:<40} {status}");
    }

    let selected = select_broker(&candidates, &reachable)?;
    println!("Highest priority broker: {selected}");
    Ok(())
}
