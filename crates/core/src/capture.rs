//! Capture-side seams: where raw frames come from and how devices are opened.

use anyhow::Result;
use std::fmt;
use std::str::FromStr;

/// Result of asking a source for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `frame` now holds one full s16le frame.
    Ready,
    /// No frame this cycle (device idle, unopened or timed out).
    Unavailable,
}

/// One open input device.
///
/// `read` must fill exactly `frame.len()` bytes or report `Unavailable`, and
/// must return within a bounded time. `Err` is a device fault.
pub trait CaptureSource: Send {
    fn read(&mut self, frame: &mut [u8]) -> Result<ReadStatus>;
}

/// An input device as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: usize,
    pub name: String,
}

/// How the user picked an input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Default,
    Index(usize),
    Name(String),
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("default") {
            Ok(DeviceSelector::Default)
        } else if let Ok(index) = s.parse::<usize>() {
            Ok(DeviceSelector::Index(index))
        } else {
            Ok(DeviceSelector::Name(s.to_string()))
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Default => write!(f, "default"),
            DeviceSelector::Index(i) => write!(f, "#{}", i),
            DeviceSelector::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Platform audio subsystem: enumerates and opens input devices.
pub trait CaptureBackend: Send + Sync {
    /// Input devices in enumeration order. Failures yield an empty list.
    fn list_input_devices(&self) -> Vec<InputDevice>;

    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn CaptureSource>>;
}

/// A source with no device behind it.
pub struct NullSource;

impl CaptureSource for NullSource {
    fn read(&mut self, _frame: &mut [u8]) -> Result<ReadStatus> {
        Ok(ReadStatus::Unavailable)
    }
}
