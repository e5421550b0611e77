use crate::calibration::{AxisCoefficients, Calibration};
use crate::error::CalibrationError;
use flightsim_traits::Axis;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::IntoEnumIterator;
use tracing::info;

pub const RECORD_EXTENSION: &str = "txt";

/// File name for an operator's record: spaces become underscores.
pub fn record_file_name(operator: &str) -> String {
    format!("{}.{}", operator.trim().replace(' ', "_"), RECORD_EXTENSION)
}

/// Plain-text calibration record:
///
/// ```text
/// Ana Petrovic
/// X-osa: k = 4.905, n = 0.0
/// Y-osa: k = 6.54, n = -0.981
/// Z-osa: k = 6.54, n = -6.54
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRecord {
    pub operator: String,
    pub calibration: Calibration,
}

impl CalibrationRecord {
    pub fn new(operator: &str, calibration: Calibration) -> Self {
        CalibrationRecord {
            operator: operator.trim().to_string(),
            calibration,
        }
    }

    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, CalibrationError> {
        let path = dir.join(record_file_name(&self.operator));
        fs::write(&path, self.to_string())?;
        info!("Saved calibration for {} to {}", self.operator, path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        fs::read_to_string(path)?.parse()
    }
}

impl fmt::Display for CalibrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.operator)?;
        for (axis, c) in self.calibration.iter() {
            // Debug formatting keeps the shortest round-trip repr and a trailing `.0`
            writeln!(f, "{}-osa: k = {:?}, n = {:?}", axis, c.scale, c.offset)?;
        }
        Ok(())
    }
}

fn parse_axis_line(line: &str) -> Result<(Axis, AxisCoefficients), CalibrationError> {
    let malformed = || CalibrationError::MalformedRecord(format!("bad axis line {:?}", line));

    let (axis, rest) = line.split_once("-osa:").ok_or_else(malformed)?;
    let axis = Axis::from_str(axis.trim()).map_err(|_| malformed())?;
    let (k, n) = rest.split_once(',').ok_or_else(malformed)?;
    let value = |field: &str, key: &str| -> Result<f64, CalibrationError> {
        let (name, value) = field.split_once('=').ok_or_else(malformed)?;
        if name.trim() != key {
            return Err(malformed());
        }
        value.trim().parse().map_err(|_| malformed())
    };

    Ok((
        axis,
        AxisCoefficients {
            scale: value(k, "k")?,
            offset: value(n, "n")?,
        },
    ))
}

impl FromStr for CalibrationRecord {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().map(str::trim).filter(|l| !l.is_empty());
        let operator = lines
            .next()
            .ok_or_else(|| CalibrationError::MalformedRecord("empty record".to_string()))?;

        let mut axes: [Option<AxisCoefficients>; 3] = [None; 3];
        for line in lines {
            let (axis, coefficients) = parse_axis_line(line)?;
            axes[axis.index()] = Some(coefficients);
        }

        let mut solved = Vec::with_capacity(3);
        for axis in Axis::iter() {
            solved.push(axes[axis.index()].ok_or(CalibrationError::IncompleteCalibration(axis))?);
        }
        Ok(CalibrationRecord {
            operator: operator.to_string(),
            calibration: Calibration::new(solved[0], solved[1], solved[2]),
        })
    }
}
