use flightsim_traits::LinkError;
use serialport::SerialPort;
use std::time::Duration;
use tracing::{debug, trace};

pub const DEFAULT_MAX_LINE_LEN: usize = 512;

pub fn open_port(
    port_name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, LinkError> {
    let mut port = serialport::new(port_name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| LinkError::Connection(format!("{}: {}", port_name, e)))?;
    debug!("Opened port {} at {} baud", port_name, baud_rate);
    clear(port.as_mut(), Duration::from_millis(10), timeout);
    Ok(port)
}

// The board resets when the port opens and may dump a partial line first.
fn clear(port: &mut dyn SerialPort, timeout: Duration, restore: Duration) {
    let mut buffer = [0u8; 64];
    if port.set_timeout(timeout).is_err() {
        return;
    }
    for _ in 0..4 {
        match port.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(bytes_read) => trace!("Cleared {} bytes from port", bytes_read),
        }
    }
    let _ = port.set_timeout(restore);
}

/// Splits a byte stream into newline-terminated text lines.
///
/// Carriage returns and surrounding whitespace are stripped and blank lines
/// are skipped. A line longer than `max_len` is discarded up to its
/// terminator and reported once as malformed.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_len: usize,
    overflowed: bool,
}

impl LineFramer {
    pub fn new(max_len: Option<usize>) -> Self {
        let max_len = max_len.unwrap_or(DEFAULT_MAX_LINE_LEN).max(1);
        LineFramer {
            buffer: Vec::with_capacity(max_len),
            max_len,
            overflowed: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete line, or `None` if more bytes are needed.
    pub fn next_line(&mut self) -> Option<Result<String, LinkError>> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > self.max_len {
                    self.buffer.clear();
                    if !self.overflowed {
                        self.overflowed = true;
                        return Some(Err(self.overflow_error()));
                    }
                }
                return None;
            };

            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            if self.overflowed {
                // tail of an oversized line
                self.overflowed = false;
                continue;
            }
            if raw.len() > self.max_len + 1 {
                return Some(Err(self.overflow_error()));
            }

            match std::str::from_utf8(&raw) {
                Ok(text) => {
                    let line = text.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(Ok(line.to_string()));
                }
                Err(e) => {
                    return Some(Err(LinkError::MalformedLine(format!(
                        "invalid UTF-8 in line: {}",
                        e
                    ))))
                }
            }
        }
    }

    fn overflow_error(&self) -> LinkError {
        LinkError::MalformedLine(format!("line exceeds {} bytes", self.max_len))
    }
}
