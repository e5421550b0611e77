//! Two-point accelerometer calibration.
//!
//! For each axis the board reports the sensor voltage with the axis pointing
//! up (+g) and down (-g). A linear transfer `a = k * v + n` is fitted through
//! those two points.

use crate::error::CalibrationError;
use crate::record::CalibrationRecord;
use flightsim_traits::{Axis, LinkError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, info};

/// Reference acceleration with the axis pointing up (m/s²).
pub const G_POSITIVE: f64 = 9.81;
/// Reference acceleration with the axis pointing down (m/s²).
pub const G_NEGATIVE: f64 = -9.81;
/// Readings transmitted with fewer digits than this are treated as truncated.
pub const MIN_READING_DIGITS: usize = 3;
/// How long to wait for each reply line after an axis command.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const FULL_PRECISION: usize = f64::DIGITS as usize;

/// A voltage together with how many digits the device actually sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageReading {
    value: f64,
    digits: usize,
}

impl VoltageReading {
    /// A reading known at full precision.
    pub fn new(value: f64) -> Self {
        VoltageReading {
            value,
            digits: FULL_PRECISION,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn digits(&self) -> usize {
        self.digits
    }

    pub fn is_plausible(&self, min_digits: usize) -> bool {
        self.value.is_finite() && self.digits >= min_digits
    }
}

impl From<f64> for VoltageReading {
    fn from(value: f64) -> Self {
        VoltageReading::new(value)
    }
}

impl FromStr for VoltageReading {
    type Err = std::num::ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let value: f64 = text.parse()?;
        let mantissa = text.split(['e', 'E']).next().unwrap_or("");
        let digits = mantissa.chars().filter(|c| c.is_ascii_digit()).count();
        Ok(VoltageReading { value, digits })
    }
}

/// Linear transfer coefficients for one axis: `a = scale * v + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCoefficients {
    pub scale: f64,
    pub offset: f64,
}

impl AxisCoefficients {
    /// Converts a raw voltage to acceleration (m/s²).
    pub fn apply(&self, voltage: f64) -> f64 {
        self.scale * voltage + self.offset
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisVoltagePair {
    pub positive: Option<f64>,
    pub negative: Option<f64>,
}

impl AxisVoltagePair {
    pub fn is_complete(&self) -> bool {
        self.positive.is_some() && self.negative.is_some()
    }

    /// The negative reading is the magnitude reported with the axis pointing
    /// down, so the voltage span between the two reference points is
    /// `v_pos - (-v_neg)`.
    pub fn coefficients(&self, axis: Axis) -> Result<AxisCoefficients, CalibrationError> {
        let (Some(v_pos), Some(v_neg)) = (self.positive, self.negative) else {
            return Err(CalibrationError::IncompleteCalibration(axis));
        };

        let span = v_pos - (-v_neg);
        if span == 0.0 {
            return Err(CalibrationError::DivisionByZero(axis));
        }
        let scale = (G_POSITIVE - G_NEGATIVE) / span;
        let offset = G_POSITIVE - scale * v_pos;
        if !scale.is_finite() || !offset.is_finite() {
            return Err(CalibrationError::DivisionByZero(axis));
        }
        Ok(AxisCoefficients { scale, offset })
    }
}

/// Coefficients for all three axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    axes: [AxisCoefficients; 3],
}

impl Calibration {
    pub fn new(x: AxisCoefficients, y: AxisCoefficients, z: AxisCoefficients) -> Self {
        Calibration { axes: [x, y, z] }
    }

    pub fn get(&self, axis: Axis) -> AxisCoefficients {
        self.axes[axis.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, AxisCoefficients)> + '_ {
        Axis::iter().map(move |axis| (axis, self.get(axis)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    AwaitingPositive,
    AwaitingNegative,
    Complete,
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturePhase::AwaitingPositive => write!(f, "awaiting positive-g reading"),
            CapturePhase::AwaitingNegative => write!(f, "awaiting negative-g reading"),
            CapturePhase::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CaptureState {
    AwaitingPositive,
    AwaitingNegative(VoltageReading),
    Complete(VoltageReading, VoltageReading),
}

/// Reply parser for one axis command: the board answers with the +g
/// voltage line, then the -g voltage line.
#[derive(Debug, Clone, Copy)]
pub struct AxisCapture {
    axis: Axis,
    state: CaptureState,
}

impl AxisCapture {
    pub fn new(axis: Axis) -> Self {
        AxisCapture {
            axis,
            state: CaptureState::AwaitingPositive,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn phase(&self) -> CapturePhase {
        match self.state {
            CaptureState::AwaitingPositive => CapturePhase::AwaitingPositive,
            CaptureState::AwaitingNegative(_) => CapturePhase::AwaitingNegative,
            CaptureState::Complete(..) => CapturePhase::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == CapturePhase::Complete
    }

    /// Consumes one reply line. Lines arriving after completion are ignored.
    pub fn feed(&mut self, line: &str) -> Result<CapturePhase, CalibrationError> {
        if self.is_complete() {
            debug!("Ignoring extra reply on {} axis: {:?}", self.axis, line);
            return Ok(CapturePhase::Complete);
        }
        let reading: VoltageReading =
            line.parse().map_err(|_| CalibrationError::UnreadableReply {
                axis: self.axis,
                phase: self.phase(),
                line: line.to_string(),
            })?;

        self.state = match self.state {
            CaptureState::AwaitingPositive => CaptureState::AwaitingNegative(reading),
            CaptureState::AwaitingNegative(positive) => CaptureState::Complete(positive, reading),
            complete @ CaptureState::Complete(..) => complete,
        };
        Ok(self.phase())
    }

    /// Wraps a transport failure with the phase it interrupted.
    pub fn abort(&self, source: LinkError) -> CalibrationError {
        CalibrationError::CaptureAborted {
            axis: self.axis,
            phase: self.phase(),
            source,
        }
    }

    pub fn readings(&self) -> Option<(VoltageReading, VoltageReading)> {
        match self.state {
            CaptureState::Complete(positive, negative) => Some((positive, negative)),
            _ => None,
        }
    }
}

/// Accumulates voltage pairs per axis and derives the calibration.
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    pairs: [AxisVoltagePair; 3],
    active_axis: Option<Axis>,
    min_digits: usize,
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(MIN_READING_DIGITS)
    }
}

impl CalibrationEngine {
    pub fn new(min_digits: usize) -> Self {
        CalibrationEngine {
            pairs: [AxisVoltagePair::default(); 3],
            active_axis: None,
            min_digits,
        }
    }

    pub fn active_axis(&self) -> Option<Axis> {
        self.active_axis
    }

    pub fn pair(&self, axis: Axis) -> AxisVoltagePair {
        self.pairs[axis.index()]
    }

    /// Marks `axis` as the one being measured and returns a fresh reply parser.
    pub fn begin_axis(&mut self, axis: Axis) -> AxisCapture {
        self.active_axis = Some(axis);
        AxisCapture::new(axis)
    }

    pub fn cancel_axis(&mut self) {
        self.active_axis = None;
    }

    /// Stores both readings for `axis`. Nothing is changed if either reading
    /// fails the plausibility check.
    pub fn record_axis_readings(
        &mut self,
        axis: Axis,
        positive: impl Into<VoltageReading>,
        negative: impl Into<VoltageReading>,
    ) -> Result<(), CalibrationError> {
        let positive = positive.into();
        let negative = negative.into();
        for reading in [positive, negative] {
            if !reading.is_plausible(self.min_digits) {
                return Err(CalibrationError::InsufficientData {
                    axis,
                    value: reading.value(),
                });
            }
        }

        self.pairs[axis.index()] = AxisVoltagePair {
            positive: Some(positive.value()),
            negative: Some(negative.value()),
        };
        if self.active_axis == Some(axis) {
            self.active_axis = None;
        }
        info!(
            "Captured {} axis: +g {} V, -g {} V",
            axis,
            positive.value(),
            negative.value()
        );
        Ok(())
    }

    /// Fails on the first axis (X, Y, Z order) that cannot be solved.
    pub fn finalize(&self) -> Result<Calibration, CalibrationError> {
        let mut axes = [AxisCoefficients {
            scale: 0.0,
            offset: 0.0,
        }; 3];
        for axis in Axis::iter() {
            axes[axis.index()] = self.pair(axis).coefficients(axis)?;
        }
        Ok(Calibration { axes })
    }

    /// Writes the record for `operator` into `dir` and returns the file path.
    pub fn persist(
        &self,
        dir: &Path,
        operator: &str,
        calibration: &Calibration,
    ) -> Result<PathBuf, CalibrationError> {
        CalibrationRecord::new(operator, *calibration).write_to(dir)
    }

    pub fn reset(&mut self) {
        self.pairs = [AxisVoltagePair::default(); 3];
        self.active_axis = None;
    }
}
