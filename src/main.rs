// src/main.rs - Operator console for the thermal controller
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thermo_rs::communication::{OperatorCommand, parse_operator_line};
use thermo_rs::config::{self, Config};
use thermo_rs::hardware::serial::SystemSerial;
use thermo_rs::scheduler::FixedDelayTicker;
use thermo_rs::simulator::SeededJitter;
use thermo_rs::sink::{JsonLinesSink, LogSink, SnapshotSink};
use thermo_rs::{ControlLoop, SIMULATION_PORT};
use thermo_shared::PortOpener;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "thermo-host", version, about = "Monitor and steer a serial thermal controller")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to open at startup ("Simulation" for the synthetic process)
    #[arg(short, long)]
    port: Option<String>,

    /// Seed for simulation noise
    #[arg(long)]
    seed: Option<u64>,

    /// Write snapshots to stdout as JSON lines
    #[arg(long)]
    json: bool,

    /// Print candidate ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Debug logging, including wire traffic
    #[arg(short, long)]
    verbose: bool,
}

const HELP: &str = "commands: connect <port> | disconnect | +0.1 | -0.1 | +0.5 | -0.5 | set <value> | ports | quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    if args.list_ports {
        for port in SystemSerial.available_ports() {
            println!("{}", port);
        }
        println!("{}", SIMULATION_PORT);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path).map_err(|e| {
                tracing::error!("Failed to load config from '{}': {}", path.display(), e);
                Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
            })?
        }
        None => Config::default(),
    };
    if args.seed.is_some() {
        config.simulation.seed = args.seed;
    }
    config.validate()?;

    tracing::info!("Link: {} baud, {} ms read timeout", config.link.baud, config.link.read_timeout_ms);
    tracing::info!(
        "Ticks every {} ms, {} points visible, initial target {:.2}°C",
        config.control.tick_interval_ms,
        config.control.max_points,
        config.control.initial_target
    );

    let sink: Arc<dyn SnapshotSink> = if args.json {
        Arc::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Arc::new(LogSink)
    };

    let mut control = ControlLoop::new(
        &config,
        Box::new(SystemSerial),
        Box::new(SeededJitter::new(config.simulation.seed)),
        sink,
    );

    if let Some(port) = &args.port {
        // An unopenable port leaves the loop idle; the operator can retry
        let _ = control.request_connect(port).await;
    }

    let (command_tx, command_rx) = mpsc::channel::<OperatorCommand>(16);

    let console_tx = command_tx.clone();
    tokio::spawn(async move {
        tracing::info!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Console read failed: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_operator_line(&line) {
                Ok(command) => {
                    if console_tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("{} ({})", e, HELP),
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            let _ = command_tx.send(OperatorCommand::Shutdown).await;
        }
    });

    control
        .run(FixedDelayTicker::new(config.control.tick_interval()), command_rx)
        .await;

    Ok(())
}
