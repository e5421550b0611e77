use crate::calibration::CapturePhase;
use flightsim_traits::{Axis, LinkError};
use std::error::Error as StdError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum CalibrationError {
    /// A reading is not finite or carries too few digits to be a full measurement
    InsufficientData { axis: Axis, value: f64 },
    /// A reply line did not contain a voltage
    UnreadableReply {
        axis: Axis,
        phase: CapturePhase,
        line: String,
    },
    /// The device stopped answering while an axis was being captured
    CaptureAborted {
        axis: Axis,
        phase: CapturePhase,
        source: LinkError,
    },
    /// At least one axis has no +g/-g pair yet
    IncompleteCalibration(Axis),
    /// `v_pos + v_neg == 0`, the transfer coefficient is undefined
    DivisionByZero(Axis),
    /// A persisted record could not be parsed
    MalformedRecord(String),
    Io(io::Error),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::InsufficientData { axis, value } => {
                write!(f, "Insufficient data read on {} axis: {}", axis, value)
            }
            CalibrationError::UnreadableReply { axis, phase, line } => {
                write!(f, "Unreadable {} reply on {} axis: {:?}", phase, axis, line)
            }
            CalibrationError::CaptureAborted {
                axis,
                phase,
                source,
            } => write!(f, "{} axis capture aborted {}: {}", axis, phase, source),
            CalibrationError::IncompleteCalibration(axis) => {
                write!(f, "Calibration of the {} axis is incomplete", axis)
            }
            CalibrationError::DivisionByZero(axis) => write!(
                f,
                "Degenerate readings on {} axis: positive and negative voltages cancel out",
                axis
            ),
            CalibrationError::MalformedRecord(s) => write!(f, "Malformed calibration record: {}", s),
            CalibrationError::Io(e) => write!(f, "Calibration file error: {}", e),
        }
    }
}

impl StdError for CalibrationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CalibrationError::CaptureAborted { source, .. } => Some(source),
            CalibrationError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CalibrationError {
    fn from(error: io::Error) -> Self {
        CalibrationError::Io(error)
    }
}

#[derive(Debug)]
pub enum SessionError {
    /// Operator input rejected before touching the device
    Validation(String),
    /// Operation not allowed in the current session state
    InvalidState(String),
    Link(LinkError),
    Calibration(CalibrationError),
    /// The flight series holds no samples
    NoData,
    /// The acquisition thread could not be started or died
    Acquisition(String),
    Config(String),
    Io(io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Validation(s) => write!(f, "Validation error: {}", s),
            SessionError::InvalidState(s) => write!(f, "Invalid state: {}", s),
            SessionError::Link(e) => write!(f, "{}", e),
            SessionError::Calibration(e) => write!(f, "{}", e),
            SessionError::NoData => write!(f, "No data recorded"),
            SessionError::Acquisition(s) => write!(f, "Acquisition error: {}", s),
            SessionError::Config(s) => write!(f, "Configuration error: {}", s),
            SessionError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SessionError::Link(e) => Some(e),
            SessionError::Calibration(e) => Some(e),
            SessionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LinkError> for SessionError {
    fn from(error: LinkError) -> Self {
        SessionError::Link(error)
    }
}

impl From<CalibrationError> for SessionError {
    fn from(error: CalibrationError) -> Self {
        SessionError::Calibration(error)
    }
}

impl From<io::Error> for SessionError {
    fn from(error: io::Error) -> Self {
        SessionError::Io(error)
    }
}
