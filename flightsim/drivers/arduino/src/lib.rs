pub mod port;

pub use flightsim_traits::{Axis, Command, LineLink, LinkError, Orientation, Sample};
pub use port::{LineFramer, DEFAULT_MAX_LINE_LEN};

use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Usual device name of an Arduino board on this OS.
pub fn default_port() -> &'static str {
    if cfg!(target_os = "windows") {
        "COM9"
    } else if cfg!(target_os = "macos") {
        "/dev/tty.usbmodem14101"
    } else {
        "/dev/ttyACM0"
    }
}

/// Serial connection to the sensor board speaking the line protocol.
///
/// The port is released on [`LineLink::close`], on the first fatal
/// transport error, and on drop.
pub struct SerialLink {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    framer: LineFramer,
    read_timeout: Duration,
}

impl SerialLink {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, LinkError> {
        Self::open_with(port_name, baud_rate, DEFAULT_READ_TIMEOUT, None)
    }

    pub fn open_with(
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
        max_line_len: Option<usize>,
    ) -> Result<Self, LinkError> {
        let port = port::open_port(port_name, baud_rate, read_timeout)?;
        info!("Connected to sensor board on {}", port_name);
        Ok(SerialLink {
            port: Some(port),
            port_name: port_name.to_string(),
            framer: LineFramer::new(max_line_len),
            read_timeout,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or(LinkError::Closed)
    }

    // A fatal error means the board is gone; release the handle right away.
    fn check<T>(&mut self, result: Result<T, LinkError>) -> Result<T, LinkError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("Serial link {} lost: {}", self.port_name, e);
                self.close();
            }
        }
        result
    }

    fn fill(&mut self, deadline: Instant) -> Result<(), LinkError> {
        let mut buffer = [0u8; 256];
        let port = self.port.as_mut().ok_or(LinkError::Closed)?;
        loop {
            match port.read(&mut buffer) {
                Ok(0) => {
                    if Instant::now() >= deadline {
                        return Err(LinkError::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(n) => {
                    self.framer.push(&buffer[..n]);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl LineLink for SerialLink {
    fn send_command(&mut self, command: Command) -> Result<(), LinkError> {
        let byte = command.to_byte();
        let result = self.port().and_then(|port| {
            port.write_all(&[byte])
                .and_then(|_| port.flush())
                .map_err(|e| LinkError::DeviceUnavailable(format!("write failed: {}", e)))
        });
        if result.is_ok() {
            debug!("Sent command {} on {}", command, self.port_name);
        }
        self.check(result)
    }

    fn read_line(&mut self) -> Result<String, LinkError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if let Some(line) = self.framer.next_line() {
                return line;
            }
            if Instant::now() >= deadline {
                return Err(LinkError::Timeout);
            }
            let filled = self.fill(deadline);
            self.check(filled)?;
        }
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        if self.framer.pending() > 0 {
            debug!("Discarding {} buffered bytes on {}", self.framer.pending(), self.port_name);
        }
        self.framer.clear();
        let result = self
            .port()
            .and_then(|port| port.clear(ClearBuffer::Input).map_err(LinkError::from));
        self.check(result)
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            // Dropping the handle closes the descriptor; nothing to report.
            drop(port);
            self.framer.clear();
            info!("Closed serial link {}", self.port_name);
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}
