use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

// --- Basic Types ---

/// Accelerometer axis of the sensor board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Single-byte commands understood by the board firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Measure +g and -g voltages on one axis. The board answers with two lines.
    SelectAxis(Axis),
    /// Start streaming `pitch,roll` telemetry. No reply.
    StartFlight,
    /// Stop streaming telemetry. No reply.
    StopFlight,
}

impl Command {
    pub fn to_byte(&self) -> u8 {
        match self {
            Command::SelectAxis(Axis::X) => b'X',
            Command::SelectAxis(Axis::Y) => b'Y',
            Command::SelectAxis(Axis::Z) => b'Z',
            Command::StartFlight => b'F',
            Command::StopFlight => b'S',
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.to_byte() as char)
    }
}

/// One orientation reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Seconds since the UNIX epoch
    pub timestamp: f64,
    /// Pitch angle (deg)
    pub pitch: f64,
    /// Roll angle (deg)
    pub roll: f64,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sample(t={:.3}, pitch={}, roll={})",
            self.timestamp, self.pitch, self.roll
        )
    }
}

/// Orientation telemetry as sent by the board: `<pitch>,<roll>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub pitch: f64,
    pub roll: f64,
}

impl Orientation {
    pub fn at(self, timestamp: f64) -> Sample {
        Sample {
            timestamp,
            pitch: self.pitch,
            roll: self.roll,
        }
    }
}

impl FromStr for Orientation {
    type Err = LinkError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || LinkError::MalformedLine(format!("expected `pitch,roll`, got {:?}", line));

        let mut fields = line.trim().split(',');
        let (Some(pitch), Some(roll), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(malformed());
        };
        let pitch: f64 = pitch.trim().parse().map_err(|_| malformed())?;
        let roll: f64 = roll.trim().parse().map_err(|_| malformed())?;
        if !pitch.is_finite() || !roll.is_finite() {
            return Err(malformed());
        }
        Ok(Orientation { pitch, roll })
    }
}

// --- Standard Error Type ---
#[derive(Debug)]
pub enum LinkError {
    /// The port could not be opened
    Connection(String),
    /// Transport failure while reading or writing; the device is gone
    DeviceUnavailable(String),
    /// A line arrived but could not be decoded
    MalformedLine(String),
    /// No complete line arrived within the read timeout
    Timeout,
    /// The link was closed locally
    Closed,
}

impl LinkError {
    /// Whether the link must not be used again after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::DeviceUnavailable(_) | LinkError::Closed)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Connection(s) => write!(f, "Connection error: {}", s),
            LinkError::DeviceUnavailable(s) => write!(f, "Device unavailable: {}", s),
            LinkError::MalformedLine(s) => write!(f, "Malformed line: {}", s),
            LinkError::Timeout => write!(f, "Timed out waiting for a line"),
            LinkError::Closed => write!(f, "Link closed"),
        }
    }
}

impl StdError for LinkError {}

impl From<io::Error> for LinkError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                LinkError::Timeout
            }
            io::ErrorKind::InvalidData => LinkError::MalformedLine(error.to_string()),
            _ => LinkError::DeviceUnavailable(error.to_string()),
        }
    }
}

impl From<serialport::Error> for LinkError {
    fn from(error: serialport::Error) -> Self {
        match error.kind() {
            serialport::ErrorKind::Io(kind) => io::Error::new(kind, error.description).into(),
            _ => LinkError::DeviceUnavailable(error.description),
        }
    }
}

/// Line-oriented command/response channel to the sensor board.
pub trait LineLink: Send {
    /// Writes one command byte.
    fn send_command(&mut self, command: Command) -> Result<(), LinkError>;

    /// Blocks until a newline-terminated line arrives, the read timeout
    /// elapses, or the transport fails. The terminator and surrounding
    /// whitespace are stripped.
    fn read_line(&mut self) -> Result<String, LinkError>;

    /// Drops any input already buffered on the link.
    fn discard_input(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Idempotent, best-effort.
    fn close(&mut self);
}

impl<L: LineLink + ?Sized> LineLink for Box<L> {
    fn send_command(&mut self, command: Command) -> Result<(), LinkError> {
        (**self).send_command(command)
    }

    fn read_line(&mut self) -> Result<String, LinkError> {
        (**self).read_line()
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        (**self).discard_input()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
