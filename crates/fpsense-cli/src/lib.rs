//! fpsense command-line tool.
//!
//! Drives an FPC1020 driver against the simulated chip, which is handy for
//! exercising the class layer without hardware.
//!
//! # Usage
//!
//! ```bash
//! # Probe and print device attributes
//! fpsense info
//!
//! # Print ten presence edges while a finger is placed and lifted
//! fpsense watch --events 10
//!
//! # Capture one frame with a custom gain
//! fpsense --adc-gain 10 capture
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use fpsense_class::{DeviceAttributes, DeviceRegistry, RegistryConfig};
use fpsense_core::{OpenMode, PollEvent};
use fpsense_fpc1020::sim::{SimulatedChip, SimulatedPower};
use fpsense_fpc1020::{ChipConfig, ChipPhase, Fpc1020, Timing};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Fingerprint sensor capture tool
#[derive(Parser, Debug)]
#[command(name = "fpsense")]
#[command(author, version, about = "Probe, watch and capture from an FPC1020 sensor")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub chip: ChipArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Probe-time chip settings.
#[derive(Args, Debug, Clone)]
pub struct ChipArgs {
    /// ADC shift (0-31)
    #[arg(long, global = true)]
    pub adc_shift: Option<u8>,

    /// ADC gain (0-15)
    #[arg(long, global = true)]
    pub adc_gain: Option<u8>,

    /// Finger detection threshold
    #[arg(long, global = true)]
    pub det_threshold: Option<u8>,

    /// Bring-up window for the ready interrupt, in milliseconds
    #[arg(long, global = true, default_value_t = 1300)]
    pub ready_timeout_ms: u64,

    /// Settle delay before each finger presence query, in milliseconds
    #[arg(long, global = true, default_value_t = 20)]
    pub settle_ms: u64,

    /// Hardware id reported by the simulated chip
    #[arg(long, global = true, default_value_t = 0x020a, value_parser = parse_hex_u16)]
    pub hardware_id: u16,

    /// Parent label of the registered device
    #[arg(long, global = true, default_value = "spi0.0")]
    pub parent: String,
}

impl ChipArgs {
    pub fn config(&self) -> ChipConfig {
        ChipConfig {
            adc_shift: self.adc_shift,
            adc_gain: self.adc_gain,
            det_threshold: self.det_threshold,
        }
    }

    pub fn timing(&self) -> Timing {
        Timing {
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            finger_query_delay: Duration::from_millis(self.settle_ms),
            ..Timing::default()
        }
    }
}

fn parse_hex_u16(value: &str) -> std::result::Result<u16, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"));
    let parsed = match digits {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|error| format!("invalid hardware id '{value}': {error}"))
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe the sensor and print its attributes as JSON
    Info,

    /// Print presence edges while a simulated finger comes and goes
    Watch {
        /// Number of edges to print before exiting
        #[arg(long, default_value_t = 4)]
        events: usize,

        /// Time between finger placement and removal, in milliseconds
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },

    /// Capture one frame and print a summary
    Capture,
}

type SimDriver = Fpc1020<SimulatedChip, SimulatedPower>;

/// A probed simulated sensor.
pub struct Session {
    registry: Arc<DeviceRegistry>,
    chip: SimulatedChip,
    driver: SimDriver,
}

impl Session {
    pub async fn start(args: &ChipArgs) -> Result<Self> {
        let registry = Arc::new(DeviceRegistry::new(RegistryConfig::default()));
        let (chip, irq) = SimulatedChip::new();
        chip.set_hardware_id(args.hardware_id);
        let power = SimulatedPower::new(&chip);

        let driver = Fpc1020::probe(
            registry.clone(),
            chip.clone(),
            power,
            irq,
            args.config(),
            args.timing(),
            &args.parent,
        )
        .await
        .context("failed to probe FPC1020")?;

        Ok(Self {
            registry,
            chip,
            driver,
        })
    }

    pub async fn stop(self) {
        self.driver.remove().await;
    }
}

#[derive(Debug, Serialize)]
pub struct InfoReport {
    pub chip_type: Option<String>,
    pub phase: ChipPhase,
    pub attributes: DeviceAttributes,
}

#[derive(Debug, Serialize)]
pub struct EdgeReport {
    pub event: PollEvent,
    pub finger_present: bool,
    pub elapsed_ms: u128,
}

/// Size and byte distribution of a captured frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSummary {
    pub bytes: usize,
    pub min: u8,
    pub max: u8,
    pub mean: f64,
    /// Counts per 32-value bucket, lowest first.
    pub histogram: [usize; 8],
}

pub fn summarize(frame: &[u8]) -> FrameSummary {
    let mut histogram = [0usize; 8];
    let mut sum = 0u64;
    for &byte in frame {
        histogram[usize::from(byte / 32)] += 1;
        sum += u64::from(byte);
    }

    FrameSummary {
        bytes: frame.len(),
        min: frame.iter().copied().min().unwrap_or(0),
        max: frame.iter().copied().max().unwrap_or(0),
        mean: if frame.is_empty() {
            0.0
        } else {
            sum as f64 / frame.len() as f64
        },
        histogram,
    }
}

pub fn info(session: &Session) -> InfoReport {
    InfoReport {
        chip_type: session.driver.chip_type().map(|chip_type| chip_type.to_string()),
        phase: session.driver.phase(),
        attributes: session.driver.device().attributes(),
    }
}

pub async fn watch(session: &Session, events: usize, interval: Duration) -> Result<()> {
    let file = session
        .registry
        .open(session.driver.device().id(), OpenMode::NonBlocking)?;

    let chip = session.chip.clone();
    let finger = tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            debug!("Placing finger");
            chip.place_finger();
            tokio::time::sleep(interval).await;
            debug!("Lifting finger");
            chip.lift_finger();
        }
    });

    let started = tokio::time::Instant::now();
    for _ in 0..events {
        let event = tokio::select! {
            event = file.wait_event() => event?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let report = EdgeReport {
            event,
            finger_present: file.device().finger_present(),
            elapsed_ms: started.elapsed().as_millis(),
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    finger.abort();
    Ok(())
}

pub async fn capture(session: &Session) -> Result<FrameSummary> {
    let device = session.driver.device();
    let mut file = session.registry.open(device.id(), OpenMode::Blocking)?;

    session.chip.place_finger();
    let mut frame = vec![0u8; device.frame_size()];
    let n = file.read(&mut frame).await.context("capture failed")?;
    session.chip.lift_finger();

    frame.truncate(n);
    Ok(summarize(&frame))
}

/// Run one command against a freshly probed sensor.
pub async fn run(cli: Cli) -> Result<()> {
    let session = Session::start(&cli.chip).await?;

    let outcome = match cli.command {
        Commands::Info => serde_json::to_string_pretty(&info(&session))
            .map(|json| println!("{json}"))
            .map_err(Into::into),
        Commands::Watch {
            events,
            interval_ms,
        } => watch(&session, events, Duration::from_millis(interval_ms)).await,
        Commands::Capture => capture(&session)
            .await
            .and_then(|summary| Ok(serde_json::to_string_pretty(&summary)?))
            .map(|json| println!("{json}")),
    };

    session.stop().await;
    outcome
}
