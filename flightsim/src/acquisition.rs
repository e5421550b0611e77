//! Background telemetry reader.
//!
//! The loop owns the link and the recorder while it runs. Both are handed
//! back through [`AcquisitionHandle::join`], so the recorded samples can only
//! be read once the thread has finished writing them.

use crate::clock::Clock;
use crate::error::SessionError;
use crate::recorder::FlightRecorder;
use flightsim_traits::{LineLink, LinkError, Orientation, Sample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

pub const DEFAULT_PACE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    Sample(Sample),
    /// The board stopped responding. Sent at most once, as the last event.
    DeviceLost(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    Cancelled,
    DeviceLost(String),
}

/// What a finished loop hands back.
pub struct AcquisitionOutcome<L> {
    pub link: L,
    pub recorder: FlightRecorder,
    pub exit: LoopExit,
}

pub struct AcquisitionLoop<L> {
    link: L,
    recorder: FlightRecorder,
    clock: Arc<dyn Clock>,
    pace: Duration,
    events: Option<mpsc::Sender<AcquisitionEvent>>,
}

impl<L: LineLink> AcquisitionLoop<L> {
    pub fn new(link: L, recorder: FlightRecorder, clock: Arc<dyn Clock>, pace: Duration) -> Self {
        AcquisitionLoop {
            link,
            recorder,
            clock,
            pace,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<AcquisitionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: AcquisitionEvent) {
        if let Some(tx) = &self.events {
            // nobody listening is fine, the recorder still has the data
            let _ = tx.send(event);
        }
    }

    /// Runs on the calling thread until `cancel` is set or the device is lost.
    pub fn run(mut self, cancel: &AtomicBool) -> AcquisitionOutcome<L> {
        debug!("Acquisition loop started, pacing {:?}", self.pace);
        let exit = loop {
            if cancel.load(Ordering::Acquire) {
                break LoopExit::Cancelled;
            }

            match self.link.read_line() {
                Ok(line) => match line.parse::<Orientation>() {
                    Ok(orientation) => {
                        let sample = orientation.at(self.clock.now());
                        trace!("{}", sample);
                        self.recorder.append(sample);
                        self.emit(AcquisitionEvent::Sample(sample));
                    }
                    Err(e) => warn!("Skipping telemetry line: {}", e),
                },
                Err(LinkError::Timeout) => continue,
                Err(LinkError::MalformedLine(e)) => warn!("Skipping telemetry line: {}", e),
                Err(e) => {
                    error!("Sensor board disconnected: {}", e);
                    let reason = e.to_string();
                    self.emit(AcquisitionEvent::DeviceLost(reason.clone()));
                    break LoopExit::DeviceLost(reason);
                }
            }

            if cancel.load(Ordering::Acquire) {
                break LoopExit::Cancelled;
            }
            self.clock.sleep(self.pace);
        };
        debug!(
            "Acquisition loop stopped ({:?}) after {} samples",
            exit,
            self.recorder.len()
        );

        AcquisitionOutcome {
            link: self.link,
            recorder: self.recorder,
            exit,
        }
    }
}

impl<L: LineLink + 'static> AcquisitionLoop<L> {
    pub fn spawn(self) -> Result<AcquisitionHandle<L>, SessionError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let thread = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || self.run(&flag))
            .map_err(|e| SessionError::Acquisition(format!("failed to spawn reader: {}", e)))?;
        Ok(AcquisitionHandle { cancel, thread })
    }
}

/// Running acquisition thread.
pub struct AcquisitionHandle<L> {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<AcquisitionOutcome<L>>,
}

impl<L> AcquisitionHandle<L> {
    /// Asks the loop to stop; it notices between reads.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the thread to exit. Does not cancel.
    pub fn join(self) -> Result<AcquisitionOutcome<L>, SessionError> {
        self.thread
            .join()
            .map_err(|_| SessionError::Acquisition("reader thread panicked".to_string()))
    }

    pub fn stop(self) -> Result<AcquisitionOutcome<L>, SessionError> {
        self.cancel();
        self.join()
    }
}
