use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use voxshift_core::constants::FRAME_MS;
use voxshift_core::{AudioPipeline, CaptureBackend, DeviceSelector};

mod capture;
mod config;
mod control;
mod driver;
mod sink;
mod stream;

use capture::CpalBackend;
use config::{db_to_linear, AppConfig};
use control::Event;
use driver::FrameDriver;
use sink::SinkSpec;

#[derive(Parser)]
#[command(name = "voxshift")]
#[command(about = "VoxShift: live voice pitch shift and EQ, one 20ms frame at a time", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices
    List,
    /// Capture, process and emit frames until stopped
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Input device: default, an index from `list`, or a name
    #[arg(short, long)]
    input: Option<String>,
    /// Frame sink: stdout, device, device:<name> or wav:<path>
    #[arg(short, long)]
    sink: Option<String>,
    /// Output gain in dB
    #[arg(long, allow_negative_numbers = true)]
    gain_db: Option<f32>,
    /// Pitch factor, 0.1 to 4.0
    #[arg(long)]
    pitch: Option<f32>,
    /// Band gains in dB: LOW,MID,HIGH
    #[arg(long, value_delimiter = ',', num_args = 3, allow_negative_numbers = true)]
    eq: Option<Vec<f32>>,
    /// Config file (defaults to the per-user config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Don't read commands from stdin
    #[arg(long)]
    no_control: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => list_devices()?,
        Commands::Run(args) => run(args)?,
    }

    Ok(())
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    println!("Audio Host: {}", host.id().name());
    println!("\nInput Devices:");
    // Same enumeration `run --input <index>` resolves against.
    let backend = CpalBackend::new(Duration::from_millis(FRAME_MS));
    for device in backend.list_input_devices() {
        println!("  [{}] {}", device.id, device.name);
    }
    println!("\nOutput Devices:");
    for device in host.output_devices()? {
        println!("  - {}", device.name().unwrap_or("Unknown".to_string()));
    }
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(sink) = args.sink {
        config.sink = sink;
    }
    if let Some(gain_db) = args.gain_db {
        config.gain_db = gain_db;
    }
    if let Some(pitch) = args.pitch {
        config.pitch = pitch;
    }
    if let Some(eq) = args.eq {
        // clap enforces exactly three values
        config.eq_low_db = eq[0];
        config.eq_mid_db = eq[1];
        config.eq_high_db = eq[2];
    }
    if args.no_control {
        config.control = false;
    }

    let sink_spec: SinkSpec = config.sink.parse()?;
    let backend = CpalBackend::new(Duration::from_millis(config.read_timeout_ms));
    let pipeline = Arc::new(AudioPipeline::new(
        Box::new(backend),
        config.initial_parameters(),
    ));

    let selector: DeviceSelector = config.input.parse().unwrap_or_else(|never| match never {});
    if let Err(e) = pipeline.switch_input_device(&selector) {
        warn!("{:#}; emitting silence until another device is selected", e);
    }

    let sink = sink::open_sink(&sink_spec)?;
    let (tx, rx) = crossbeam_channel::unbounded();

    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Event::Shutdown);
    })
    .context("Failed to install Ctrl+C handler")?;

    let driver = FrameDriver::start(pipeline.clone(), sink, tx.clone())?;
    if config.control {
        control::spawn_stdin_reader(tx.clone())?;
    }
    info!(
        "VoxShift active ({} -> {:?}, gain {:.3}). Press Ctrl+C to stop.",
        selector,
        sink_spec,
        db_to_linear(config.gain_db)
    );

    for event in rx.iter() {
        match event {
            Event::Command(command) => {
                if control::apply(&pipeline, command).is_break() {
                    break;
                }
            }
            Event::Shutdown => {
                info!("Shutting down gracefully...");
                break;
            }
            Event::DriverExited => break,
        }
    }

    let frames = driver.stop()?;
    info!("VoxShift stopped after {} frames ({} faults).", frames, pipeline.fault_count());
    Ok(())
}
