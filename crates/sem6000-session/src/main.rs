//! `sem6000` command-line tool.
//!
//! Encodes and decodes protocol frames, and drives the simulated plug through
//! the session coordinator.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use sem6000_protocol::{Command, DerivedReading, FrameCodec, NotificationEvent, SwitchMode};
use sem6000_session::{AppConfig, Poller, SessionCoordinator, SessionRegistry, SimulatedPlug};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sem6000", version, about = "Voltcraft SEM6000 smart plug tool")]
struct Cli {
    /// YAML configuration file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the wire frame of a command as hex.
    Encode {
        #[arg(value_enum)]
        frame: FrameKind,
    },
    /// Decode a notification frame given as hex.
    Decode {
        /// Frame bytes; spaces are ignored.
        hex: String,
    },
    /// Poll the simulated plug, one JSON reading per line.
    Poll {
        /// Stop after this many refresh cycles.
        #[arg(long)]
        count: Option<u64>,
        /// Override the configured poll interval.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Switch the simulated plug, then print its state.
    Switch {
        #[arg(value_enum)]
        mode: ModeArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FrameKind {
    Measure,
    On,
    Off,
    Login,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    On,
    Off,
}

impl From<ModeArg> for SwitchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::On => SwitchMode::On,
            ModeArg::Off => SwitchMode::Off,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    sem6000_metrics::describe_metrics();

    let config = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    match cli.command {
        Cmd::Encode { frame } => encode(frame),
        Cmd::Decode { hex } => decode(&hex),
        Cmd::Poll { count, interval_ms } => poll(&config, count, interval_ms).await,
        Cmd::Switch { mode } => switch(&config, mode.into()).await,
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn encode(frame: FrameKind) -> Result<(), Box<dyn Error>> {
    let command = match frame {
        FrameKind::Measure => Command::Measure,
        FrameKind::On => Command::Switch(SwitchMode::On),
        FrameKind::Off => Command::Switch(SwitchMode::Off),
        FrameKind::Login => Command::Login,
    };
    println!("{}", hex::encode_upper(command.encode()));
    Ok(())
}

fn decode(input: &str) -> Result<(), Box<dyn Error>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = hex::decode(compact)?;

    let frame = FrameCodec::decode(&raw)?;
    println!(
        "command=0x{:02X} length={} params={} checksum=0x{:02X}{}",
        frame.command,
        frame.length(),
        hex::encode_upper(&frame.params),
        frame.checksum,
        if frame.checksum_matches() { "" } else { " (mismatch)" }
    );

    match NotificationEvent::decode(&frame)? {
        NotificationEvent::Measurement(sample) => {
            println!("{}", serde_json::to_string_pretty(&DerivedReading::from(&sample))?);
        }
        event => println!("{:?}", event),
    }
    Ok(())
}

/// Build the simulated plug and its session from configuration.
fn open_session(
    config: &AppConfig,
) -> Result<(SessionRegistry<SimulatedPlug>, SessionCoordinator<SimulatedPlug>), Box<dyn Error>> {
    let plug = Arc::new(SimulatedPlug::new(config.simulator.clone()));
    let mut registry = SessionRegistry::new();
    let session = registry.insert(&config.device.address, plug, config.session.clone())?;
    if let Some(name) = &config.device.name {
        info!(device = %session.device(), name = %name, "opened session");
    }
    Ok((registry, session))
}

async fn poll(
    config: &AppConfig,
    count: Option<u64>,
    interval_ms: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    let (mut registry, session) = open_session(config)?;
    session.start().await?;

    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.session.poll_interval());
    let mut poller = Poller::new(interval);
    if let Some(count) = count {
        poller = poller.with_max_cycles(count);
    }

    let summary = poller
        .run(&session, shutdown_rx, |result| match result {
            Ok(reading) => match serde_json::to_string(reading) {
                Ok(line) => println!("{}", line),
                Err(err) => warn!(error = %err, "failed to serialize reading"),
            },
            Err(err) => warn!(error = %err, "refresh failed"),
        })
        .await;
    info!(
        cycles = summary.cycles,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "polling finished"
    );

    registry.shutdown_all().await;
    Ok(())
}

async fn switch(config: &AppConfig, mode: SwitchMode) -> Result<(), Box<dyn Error>> {
    let (mut registry, session) = open_session(config)?;
    session.start().await?;
    session.send_switch_command(mode).await?;

    // The acknowledgement lands before the measurement answer.
    let reading = session.refresh().await?;
    println!("{}", serde_json::to_string_pretty(&reading)?);
    println!("{}", serde_json::to_string_pretty(&session.snapshot())?);

    registry.shutdown_all().await;
    Ok(())
}
