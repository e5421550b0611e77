use crate::acquisition::{AcquisitionEvent, AcquisitionHandle, AcquisitionLoop, AcquisitionOutcome, LoopExit};
use crate::calibration::{AxisVoltagePair, Calibration, CalibrationEngine};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::recorder::{FlightRecorder, FlightSeries};
use arduino_link::SerialLink;
use flightsim_traits::{Axis, Command, LineLink, LinkError};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Calibrating,
    Flying,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedCalibration {
    pub path: PathBuf,
    pub calibration: Calibration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightReport {
    pub series: FlightSeries,
    pub exit: LoopExit,
}

impl FlightReport {
    pub fn device_lost(&self) -> bool {
        matches!(self.exit, LoopExit::DeviceLost(_))
    }
}

fn validate_operator(operator: &str) -> Result<String, SessionError> {
    let operator = operator.trim();
    if operator.is_empty() {
        return Err(SessionError::Validation(
            "operator name must not be empty".to_string(),
        ));
    }
    Ok(operator.to_string())
}

/// Drives one run against the sensor board.
///
/// The controller is the only owner of the link, the calibration engine and
/// the recorder. While a flight is running the link and recorder live on the
/// acquisition thread and come back when [`stop_flight`](Self::stop_flight)
/// joins it.
pub struct SessionController<L: LineLink + 'static> {
    link: Option<L>,
    engine: CalibrationEngine,
    recorder: FlightRecorder,
    acquisition: Option<AcquisitionHandle<L>>,
    state: SessionState,
    operator: Option<String>,
    clock: Arc<dyn Clock>,
    pace_interval: Duration,
    reply_timeout: Duration,
    calibration_dir: PathBuf,
    events: Option<mpsc::Sender<AcquisitionEvent>>,
}

impl SessionController<SerialLink> {
    /// Opens the configured port. Failure here is fatal for the run.
    pub fn connect(config: &SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let link = SerialLink::open_with(
            &config.port,
            config.baud_rate,
            config.read_timeout(),
            Some(config.max_line_len),
        )?;
        Ok(Self::new(link, config))
    }
}

impl<L: LineLink + 'static> SessionController<L> {
    pub fn new(link: L, config: &SessionConfig) -> Self {
        SessionController {
            link: Some(link),
            engine: CalibrationEngine::new(config.min_reading_digits),
            recorder: FlightRecorder::new(),
            acquisition: None,
            state: SessionState::Idle,
            operator: None,
            clock: Arc::new(SystemClock::new()),
            pace_interval: config.pace_interval(),
            reply_timeout: config.calibration_reply_timeout(),
            calibration_dir: config.calibration_dir.clone(),
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Live feed of samples and the device-lost signal for flights started
    /// after this call.
    pub fn subscribe(&mut self) -> mpsc::Receiver<AcquisitionEvent> {
        let (tx, rx) = mpsc::channel();
        self.events = Some(tx);
        rx
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.engine
    }

    /// False once the link has been closed or lost.
    pub fn is_connected(&self) -> bool {
        self.link.is_some() || self.acquisition.is_some()
    }

    /// True when the acquisition thread exited on its own (device lost).
    pub fn flight_ended(&self) -> bool {
        self.acquisition.as_ref().is_some_and(|h| h.is_finished())
    }

    fn drop_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }

    fn send(&mut self, command: Command) -> Result<(), SessionError> {
        let link = self.link.as_mut().ok_or(LinkError::Closed)?;
        match link.send_command(command) {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_fatal() {
                    self.drop_link();
                }
                Err(e.into())
            }
        }
    }

    fn read_line(&mut self) -> Result<String, LinkError> {
        let link = self.link.as_mut().ok_or(LinkError::Closed)?;
        let result = link.read_line();
        if let Err(e) = &result {
            if e.is_fatal() {
                self.drop_link();
            }
        }
        result
    }

    // Leftover reply lines would otherwise be read as the next axis' answer.
    fn discard_pending(&mut self) {
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.discard_input() {
                warn!("Failed to discard pending input: {}", e);
                if e.is_fatal() {
                    self.drop_link();
                }
            }
        }
    }

    pub fn start_calibration(&mut self, operator: &str) -> Result<(), SessionError> {
        let operator = validate_operator(operator)?;
        if self.state == SessionState::Flying {
            return Err(SessionError::InvalidState(
                "stop the flight before calibrating".to_string(),
            ));
        }
        info!("Calibration started by {}", operator);
        self.operator = Some(operator);
        self.state = SessionState::Calibrating;
        Ok(())
    }

    /// Asks the board to measure `axis` and stores the +g/-g pair it sends
    /// back. Each reply line may take up to the configured reply timeout.
    /// On any failure the previously captured axes are left as they were.
    pub fn select_axis(&mut self, axis: Axis) -> Result<AxisVoltagePair, SessionError> {
        if self.state != SessionState::Calibrating {
            return Err(SessionError::InvalidState(
                "calibration has not been started".to_string(),
            ));
        }

        // Telemetry still in flight after a stop must not be read as a reply.
        self.discard_pending();
        self.send(Command::SelectAxis(axis))?;
        let mut capture = self.engine.begin_axis(axis);
        let mut deadline = Instant::now() + self.reply_timeout;

        let (positive, negative) = loop {
            if let Some(readings) = capture.readings() {
                break readings;
            }
            let fed = match self.read_line() {
                Ok(line) => {
                    deadline = Instant::now() + self.reply_timeout;
                    capture.feed(&line).map(|_| ())
                }
                Err(LinkError::Timeout) if Instant::now() < deadline => continue,
                Err(e) => Err(capture.abort(e)),
            };
            if let Err(e) = fed {
                warn!("{}", e);
                self.engine.cancel_axis();
                self.discard_pending();
                return Err(e.into());
            }
        };

        if let Err(e) = self.engine.record_axis_readings(axis, positive, negative) {
            self.engine.cancel_axis();
            return Err(e.into());
        }
        Ok(self.engine.pair(axis))
    }

    /// Solves all three axes and writes the operator's record. An incomplete
    /// calibration leaves the session in calibration mode so it can be resumed.
    pub fn end_calibration(&mut self) -> Result<SavedCalibration, SessionError> {
        if self.state != SessionState::Calibrating {
            return Err(SessionError::InvalidState(
                "calibration has not been started".to_string(),
            ));
        }
        let operator = self
            .operator
            .clone()
            .ok_or_else(|| SessionError::Validation("operator name must not be empty".to_string()))?;

        let calibration = self.engine.finalize()?;
        let path = self
            .engine
            .persist(&self.calibration_dir, &operator, &calibration)?;
        self.state = SessionState::Idle;
        Ok(SavedCalibration { path, calibration })
    }

    pub fn start_flight(&mut self, operator: &str) -> Result<(), SessionError> {
        let operator = validate_operator(operator)?;
        match self.state {
            SessionState::Flying => {
                return Err(SessionError::InvalidState(
                    "a flight is already running".to_string(),
                ))
            }
            SessionState::Calibrating => {
                return Err(SessionError::InvalidState(
                    "finish calibration before flying".to_string(),
                ))
            }
            SessionState::Idle => {}
        }

        self.send(Command::StartFlight)?;
        self.recorder.reset();
        let link = self.link.take().ok_or(LinkError::Closed)?;

        let mut acquisition = AcquisitionLoop::new(
            link,
            std::mem::take(&mut self.recorder),
            Arc::clone(&self.clock),
            self.pace_interval,
        );
        if let Some(tx) = &self.events {
            acquisition = acquisition.with_events(tx.clone());
        }
        self.acquisition = Some(acquisition.spawn()?);

        info!("Flight started by {}", operator);
        self.operator = Some(operator);
        self.state = SessionState::Flying;
        Ok(())
    }

    /// Cancels the acquisition thread, waits for it to exit, tells the board
    /// to stop streaming and returns what was recorded.
    pub fn stop_flight(&mut self) -> Result<FlightReport, SessionError> {
        let handle = self
            .acquisition
            .take()
            .ok_or_else(|| SessionError::InvalidState("no flight in progress".to_string()))?;
        self.state = SessionState::Idle;

        let AcquisitionOutcome {
            mut link,
            mut recorder,
            exit,
        } = handle.stop()?;

        match &exit {
            LoopExit::Cancelled => {
                let stopped = link
                    .send_command(Command::StopFlight)
                    .and_then(|_| link.discard_input());
                match stopped {
                    Ok(()) => self.link = Some(link),
                    Err(e) if !e.is_fatal() => {
                        warn!("Stop command incomplete: {}", e);
                        self.link = Some(link);
                    }
                    Err(e) => {
                        warn!("Sensor board lost while stopping: {}", e);
                        link.close();
                    }
                }
            }
            LoopExit::DeviceLost(reason) => {
                warn!("Flight ended early, device lost: {}", reason);
                link.close();
            }
        }

        let series = recorder.finish();
        self.recorder = recorder;
        if series.is_empty() {
            warn!("No data recorded");
        } else {
            info!("Flight stopped with {} samples", series.len());
        }
        Ok(FlightReport { series, exit })
    }

    /// Stops any running flight and closes the link. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.acquisition.take() {
            match handle.stop() {
                Ok(AcquisitionOutcome { mut link, exit, .. }) => {
                    if exit == LoopExit::Cancelled {
                        let _ = link.send_command(Command::StopFlight);
                    }
                    link.close();
                }
                Err(e) => warn!("{}", e),
            }
        }
        self.drop_link();
        self.state = SessionState::Idle;
    }
}

impl<L: LineLink + 'static> Drop for SessionController<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
