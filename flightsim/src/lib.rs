pub mod acquisition;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod error;
pub mod record;
pub mod recorder;
pub mod session;

pub use flightsim_traits::{Axis, Command, LineLink, LinkError, Orientation, Sample};

pub use acquisition::{AcquisitionEvent, AcquisitionHandle, AcquisitionLoop, LoopExit};
pub use calibration::{AxisCoefficients, AxisVoltagePair, Calibration, CalibrationEngine};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use error::{CalibrationError, SessionError};
pub use record::CalibrationRecord;
pub use recorder::{FlightRecorder, FlightSeries};
pub use session::{FlightReport, SessionController, SessionState};

pub use arduino_link::SerialLink;
