//! Line-oriented control surface on stdin.
//!
//! Replies go to stderr; stdout may be carrying PCM.

use crate::config::db_to_linear;
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use std::io::{self, BufRead};
use std::ops::ControlFlow;
use std::str::FromStr;
use std::thread;
use voxshift_core::{AudioPipeline, DeviceSelector};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Gain in dB
    Gain(f32),
    Pitch(f32),
    /// Low, mid and high band gains in dB
    Eq(f32, f32, f32),
    Device(DeviceSelector),
    Devices,
    /// Flush EQ history
    Reset,
    Status,
    Help,
    Quit,
}

/// Everything the main loop reacts to.
#[derive(Debug)]
pub enum Event {
    Command(Command),
    /// Ctrl+C
    Shutdown,
    /// The frame driver stopped on its own (sink failure)
    DriverExited,
}

fn number(word: Option<&str>, what: &str) -> Result<f32> {
    let word = word.with_context(|| format!("Missing {}", what))?;
    let value: f32 = word
        .parse()
        .with_context(|| format!("Invalid {} '{}'", what, word))?;
    if !value.is_finite() {
        bail!("Invalid {} '{}'", what, word);
    }
    Ok(value)
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| anyhow!("Empty command"))?;
        let command = match verb.to_ascii_lowercase().as_str() {
            "gain" => Command::Gain(number(words.next(), "gain")?),
            "pitch" => Command::Pitch(number(words.next(), "pitch factor")?),
            "eq" => Command::Eq(
                number(words.next(), "low band dB")?,
                number(words.next(), "mid band dB")?,
                number(words.next(), "high band dB")?,
            ),
            "device" | "input" => {
                // Device names may contain spaces.
                let rest = line.trim_start()[verb.len()..].trim();
                let selector = rest
                    .parse::<DeviceSelector>()
                    .unwrap_or_else(|never| match never {});
                return Ok(Command::Device(selector));
            }
            "devices" | "list" => Command::Devices,
            "reset" => Command::Reset,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("Unknown command '{}' (try 'help')", other),
        };
        if let Some(extra) = words.next() {
            bail!("Unexpected argument '{}'", extra);
        }
        Ok(command)
    }
}

/// Reads commands from stdin on its own thread.
///
/// EOF only closes the control surface; the process keeps running until
/// Ctrl+C or `quit`, so it can be driven with stdin closed or redirected.
pub fn spawn_stdin_reader(events: Sender<Event>) -> Result<()> {
    thread::Builder::new()
        .name("voxshift-control".into())
        .spawn(move || {
            forward_commands(io::stdin().lock(), &events);
            info!("Control input closed, running until Ctrl+C");
        })
        .context("Failed to spawn control thread")?;
    Ok(())
}

/// Parses one command per line and forwards it until EOF or a dropped receiver.
fn forward_commands<R: BufRead>(input: R, events: &Sender<Event>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read control input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if events.send(Event::Command(command)).is_err() {
                    return;
                }
            }
            Err(e) => eprintln!("error: {:#}", e),
        }
    }
    debug!("control input reached EOF");
}

const HELP: &str = "\
commands:
  gain <dB>            output gain
  pitch <factor>       0.1 .. 4.0, 1 bypasses
  eq <low> <mid> <high>  band gains in dB
  device <sel>         default, an index or a name
  devices              list inputs
  reset                flush EQ history
  status               current parameters
  quit";

/// Applies one command. `Break` means the user asked to quit.
pub fn apply(pipeline: &AudioPipeline, command: Command) -> ControlFlow<()> {
    match command {
        Command::Gain(db) => {
            pipeline.set_gain(db_to_linear(db));
            info!("Gain set to {:+.1} dB", db);
        }
        Command::Pitch(factor) => {
            pipeline.set_pitch(factor);
            info!("Pitch factor set to {:.3}", pipeline.parameters().pitch_factor());
        }
        Command::Eq(low, mid, high) => {
            pipeline.set_eq(low, mid, high);
            info!("EQ set to {:+.1} / {:+.1} / {:+.1} dB", low, mid, high);
        }
        Command::Device(selector) => match pipeline.switch_input_device(&selector) {
            Ok(()) => eprintln!("input: {}", selector),
            Err(e) => eprintln!("error: {:#}", e),
        },
        Command::Devices => {
            let devices = pipeline.list_input_devices();
            if devices.is_empty() {
                eprintln!("no input devices");
            }
            for device in devices {
                eprintln!("  [{}] {}", device.id, device.name);
            }
        }
        Command::Reset => {
            pipeline.reset_filters();
            info!("EQ history flushed");
        }
        Command::Status => {
            let p = pipeline.parameters().snapshot();
            eprintln!(
                "gain {:.3} ({:+.1} dB), pitch {:.3}, eq {:+.1} / {:+.1} / {:+.1} dB, faults {}",
                p.gain,
                20.0 * p.gain.max(f32::MIN_POSITIVE).log10(),
                p.pitch_factor,
                p.eq_low_db,
                p.eq_mid_db,
                p.eq_high_db,
                pipeline.fault_count()
            );
        }
        Command::Help => eprintln!("{}", HELP),
        Command::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}
