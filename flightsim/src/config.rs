use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound on a single `read_line` wait
    pub read_timeout_ms: u64,
    /// Delay between telemetry reads (100 ms ≈ 10 samples/s)
    pub pace_interval_ms: u64,
    /// Upper bound on waiting for each reply line while calibrating an axis
    pub calibration_reply_timeout_ms: u64,
    pub calibration_dir: PathBuf,
    pub max_line_len: usize,
    pub min_reading_digits: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: arduino_link::default_port().to_string(),
            baud_rate: arduino_link::DEFAULT_BAUD_RATE,
            read_timeout_ms: arduino_link::DEFAULT_READ_TIMEOUT.as_millis() as u64,
            pace_interval_ms: crate::acquisition::DEFAULT_PACE_INTERVAL.as_millis() as u64,
            calibration_reply_timeout_ms: crate::calibration::DEFAULT_REPLY_TIMEOUT.as_millis() as u64,
            calibration_dir: PathBuf::from("."),
            max_line_len: arduino_link::DEFAULT_MAX_LINE_LEN,
            min_reading_digits: crate::calibration::MIN_READING_DIGITS,
        }
    }
}

impl SessionConfig {
    /// Loads a JSON config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        let config: SessionConfig = serde_json::from_str(&text)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.port.trim().is_empty() {
            return Err(SessionError::Config("port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(SessionError::Config("baud_rate must be positive".to_string()));
        }
        if self.read_timeout_ms == 0 {
            return Err(SessionError::Config(
                "read_timeout_ms must be positive, reads would never block".to_string(),
            ));
        }
        if self.calibration_reply_timeout_ms == 0 {
            return Err(SessionError::Config(
                "calibration_reply_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn pace_interval(&self) -> Duration {
        Duration::from_millis(self.pace_interval_ms)
    }

    pub fn calibration_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.calibration_reply_timeout_ms)
    }
}
