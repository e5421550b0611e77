use crate::error::SessionError;
use flightsim_traits::Sample;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Append-only sample buffer for one flight.
#[derive(Debug, Default)]
pub struct FlightRecorder {
    samples: Vec<Sample>,
}

impl FlightRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn append(&mut self, sample: Sample) {
        debug_assert!(
            self.samples
                .last()
                .map_or(true, |last| last.timestamp <= sample.timestamp),
            "samples must arrive in time order"
        );
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Hands the recorded samples over as an immutable series and leaves
    /// the recorder empty.
    pub fn finish(&mut self) -> FlightSeries {
        let samples = std::mem::take(&mut self.samples);
        debug!("Finished flight with {} samples", samples.len());
        FlightSeries { samples }
    }
}

/// Finished, time-ordered flight data for the plotting side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightSeries {
    samples: Vec<Sample>,
}

/// Column layout for plotting two time series against a shared time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesColumns {
    pub times: Vec<f64>,
    pub pitches: Vec<f64>,
    pub rolls: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub count: usize,
    pub duration: f64,
    pub pitch_range: (f64, f64),
    pub roll_range: (f64, f64),
}

impl FlightSeries {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Splits the series into time/pitch/roll columns, failing when nothing
    /// was recorded.
    pub fn columns(&self) -> Result<SeriesColumns, SessionError> {
        if self.is_empty() {
            return Err(SessionError::NoData);
        }
        Ok(SeriesColumns {
            times: self.samples.iter().map(|s| s.timestamp).collect(),
            pitches: self.samples.iter().map(|s| s.pitch).collect(),
            rolls: self.samples.iter().map(|s| s.roll).collect(),
        })
    }

    pub fn summary(&self) -> Option<SeriesSummary> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        let range = |f: fn(&Sample) -> f64| {
            self.samples
                .iter()
                .map(f)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
        };
        Some(SeriesSummary {
            count: self.samples.len(),
            duration: last.timestamp - first.timestamp,
            pitch_range: range(|s| s.pitch),
            roll_range: range(|s| s.roll),
        })
    }

    /// Writes `timestamp,pitch,roll` rows with a header.
    pub fn write_csv(&self, path: &Path) -> Result<(), SessionError> {
        if self.is_empty() {
            return Err(SessionError::NoData);
        }
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "timestamp,pitch,roll")?;
        for s in &self.samples {
            writeln!(file, "{:.6},{},{}", s.timestamp, s.pitch, s.roll)?;
        }
        file.flush()?;
        info!("Exported {} samples to {}", self.samples.len(), path.display());
        Ok(())
    }

    /// Writes the series as a JSON array of `{timestamp, pitch, roll}` objects.
    pub fn write_json(&self, path: &Path) -> Result<(), SessionError> {
        if self.is_empty() {
            return Err(SessionError::NoData);
        }
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, &self.samples)
            .map_err(|e| SessionError::Io(e.into()))?;
        info!("Exported {} samples to {}", self.samples.len(), path.display());
        Ok(())
    }
}
