mod common;

use common::{Reply, ScriptedLink};
use flightsim::calibration::CapturePhase;
use flightsim::{
    AcquisitionEvent, Axis, CalibrationError, CalibrationRecord, LinkError, LoopExit, ManualClock,
    SessionConfig, SessionController, SessionError, SessionState,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("flightsim-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn controller(link: &ScriptedLink, dir: &PathBuf) -> SessionController<ScriptedLink> {
    controller_with(link, dir, SessionConfig::default())
}

fn controller_with(
    link: &ScriptedLink,
    dir: &PathBuf,
    config: SessionConfig,
) -> SessionController<ScriptedLink> {
    let config = SessionConfig {
        calibration_dir: dir.clone(),
        ..config
    };
    SessionController::new(link.clone(), &config).with_clock(Arc::new(ManualClock::starting_at(1000.0)))
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn blank_operator_is_rejected_before_any_io() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("blank");
    let mut session = controller(&link, &dir);

    assert!(matches!(
        session.start_calibration("   "),
        Err(SessionError::Validation(_))
    ));
    assert!(matches!(session.start_flight(""), Err(SessionError::Validation(_))));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(link.sent(), "");
    assert_eq!(link.reads(), 0);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn full_calibration_writes_record() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("calibrate");
    let mut session = controller(&link, &dir);

    session.start_calibration("Test Pilot").unwrap();
    assert_eq!(session.state(), SessionState::Calibrating);

    link.answer_next([Reply::Line("2.00"), Reply::Line("2.00")]);
    let x = session.select_axis(Axis::X).unwrap();
    assert_eq!((x.positive, x.negative), (Some(2.0), Some(2.0)));

    link.answer_next([Reply::Line("1.65"), Reply::Line("1.35")]);
    session.select_axis(Axis::Y).unwrap();
    link.answer_next([Reply::Line("2.50"), Reply::Line("0.50")]);
    session.select_axis(Axis::Z).unwrap();

    let saved = session.end_calibration().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(link.sent(), "XYZ");
    assert_eq!(saved.path, dir.join("Test_Pilot.txt"));

    let text = fs::read_to_string(&saved.path).unwrap();
    assert!(text.starts_with("Test Pilot\nX-osa: k = 4.905, n = 0.0\n"), "{}", text);

    let record = CalibrationRecord::load(&saved.path).unwrap();
    assert_eq!(record.calibration, saved.calibration);
    let y = record.calibration.get(Axis::Y);
    assert!((y.scale - 19.62 / 3.0).abs() < 1e-12);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn incomplete_calibration_is_reported_and_nothing_is_written() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("incomplete");
    let mut session = controller(&link, &dir);

    session.start_calibration("Pilot").unwrap();
    link.answer_next([Reply::Line("2.00"), Reply::Line("2.00")]);
    session.select_axis(Axis::X).unwrap();

    let err = session.end_calibration().unwrap_err();
    assert!(matches!(
        err,
        SessionError::Calibration(CalibrationError::IncompleteCalibration(Axis::Y))
    ));
    assert_eq!(session.state(), SessionState::Calibrating);
    assert!(!dir.join("Pilot.txt").exists());

    // resuming completes the record
    link.answer_next([Reply::Line("1.50"), Reply::Line("1.50")]);
    session.select_axis(Axis::Y).unwrap();
    link.answer_next([Reply::Line("1.50"), Reply::Line("1.50")]);
    session.select_axis(Axis::Z).unwrap();
    session.end_calibration().unwrap();
    assert!(dir.join("Pilot.txt").exists());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn dropped_reply_aborts_only_the_current_axis() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("dropped");
    let config = SessionConfig {
        calibration_reply_timeout_ms: 30,
        ..SessionConfig::default()
    };
    let mut session = controller_with(&link, &dir, config);
    session.start_calibration("Pilot").unwrap();

    link.answer_next([Reply::Line("2.00"), Reply::Line("2.00")]);
    session.select_axis(Axis::X).unwrap();

    // the -g line never arrives
    link.answer_next([Reply::Line("1.65")]);
    let started = Instant::now();
    let err = session.select_axis(Axis::Y).unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(
        matches!(
            err,
            SessionError::Calibration(CalibrationError::CaptureAborted {
                axis: Axis::Y,
                phase: CapturePhase::AwaitingNegative,
                source: LinkError::Timeout,
            })
        ),
        "{:?}",
        err
    );
    assert!(link.discards() >= 1);
    assert!(session.calibration().pair(Axis::X).is_complete());
    assert!(!session.calibration().pair(Axis::Y).is_complete());
    assert_eq!(session.calibration().active_axis(), None);

    link.answer_next([Reply::Line("1.65"), Reply::Line("oops")]);
    let err = session.select_axis(Axis::Y).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Calibration(CalibrationError::UnreadableReply {
            phase: CapturePhase::AwaitingNegative,
            ..
        })
    ));

    link.answer_next([Reply::Line("1.65"), Reply::Line("1.35")]);
    session.select_axis(Axis::Y).unwrap();
    assert!(session.calibration().pair(Axis::Y).is_complete());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn slow_reply_is_waited_for() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("slow");
    let mut session = controller(&link, &dir);
    session.start_calibration("Pilot").unwrap();

    // each timeout is one read timeout without a line
    link.answer_next([
        Reply::Timeout,
        Reply::Line("2.00"),
        Reply::Timeout,
        Reply::Timeout,
        Reply::Line("2.00"),
    ]);
    let x = session.select_axis(Axis::X).unwrap();
    assert_eq!((x.positive, x.negative), (Some(2.0), Some(2.0)));
    assert_eq!(link.reads(), 5);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn late_telemetry_is_flushed_before_an_axis_command() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("late-telemetry");
    let mut session = controller(&link, &dir);

    session.start_flight("Pilot").unwrap();
    session.stop_flight().unwrap();
    // the board was still streaming when the stop byte went out
    link.push([Reply::Line("4.0,-1.5"), Reply::Line("4.1,-1.4")]);

    session.start_calibration("Pilot").unwrap();
    link.answer_next([Reply::Line("2.00"), Reply::Line("2.00")]);
    let x = session.select_axis(Axis::X).unwrap();
    assert_eq!((x.positive, x.negative), (Some(2.0), Some(2.0)));
    assert_eq!(link.sent(), "FSX");
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn truncated_reading_is_rejected() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("truncated");
    let mut session = controller(&link, &dir);
    session.start_calibration("Pilot").unwrap();

    link.answer_next([Reply::Line("2."), Reply::Line("1.98")]);
    let err = session.select_axis(Axis::Z).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Calibration(CalibrationError::InsufficientData { axis: Axis::Z, .. })
    ));
    assert!(!session.calibration().pair(Axis::Z).is_complete());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn device_lost_during_calibration_closes_the_link() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("lost-cal");
    let mut session = controller(&link, &dir);
    session.start_calibration("Pilot").unwrap();

    link.answer_next([Reply::Lost]);
    let err = session.select_axis(Axis::X).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Calibration(CalibrationError::CaptureAborted {
            phase: CapturePhase::AwaitingPositive,
            source: LinkError::DeviceUnavailable(_),
            ..
        })
    ));
    assert!(link.is_closed());
    assert!(!session.is_connected());
    assert!(matches!(
        session.select_axis(Axis::X),
        Err(SessionError::Link(LinkError::Closed))
    ));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn flight_records_samples_until_stopped() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("flight");
    let mut session = controller(&link, &dir);
    let events = session.subscribe();

    link.push([
        Reply::Line("1.5,-2.25"),
        Reply::Line("garbage"),
        Reply::Line("2.0,-1.0"),
        Reply::Line("2.5,0.0"),
    ]);
    session.start_flight("Pilot").unwrap();
    assert_eq!(session.state(), SessionState::Flying);
    assert!(matches!(
        session.start_calibration("Pilot"),
        Err(SessionError::InvalidState(_))
    ));

    for _ in 0..3 {
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event, AcquisitionEvent::Sample(_)));
    }

    let report = session.stop_flight().unwrap();
    assert_eq!(report.exit, LoopExit::Cancelled);
    assert!(!report.device_lost());
    assert_eq!(link.sent(), "FS");
    assert_eq!(session.state(), SessionState::Idle);

    let samples = report.series.samples();
    let angles: Vec<(f64, f64)> = samples.iter().map(|s| (s.pitch, s.roll)).collect();
    assert_eq!(angles, vec![(1.5, -2.25), (2.0, -1.0), (2.5, 0.0)]);
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    // the reader is gone once stop_flight returns
    let reads = link.reads();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(link.reads(), reads);
    assert!(!link.is_closed());
    assert!(link.discards() >= 1, "stale telemetry is flushed after stop");

    // next flight starts from an empty buffer
    link.push([Reply::Line("9.0,9.0")]);
    session.start_flight("Pilot").unwrap();
    wait_until(|| link.remaining() == 0);
    let report = session.stop_flight().unwrap();
    assert_eq!(report.series.len(), 1);
    assert_eq!(link.sent(), "FSFS");
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn device_lost_during_flight_is_signalled_once() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("lost-flight");
    let mut session = controller(&link, &dir);
    let events = session.subscribe();

    link.push([Reply::Line("1.0,2.0"), Reply::Lost]);
    session.start_flight("Pilot").unwrap();
    wait_until(|| session.flight_ended());

    let report = session.stop_flight().unwrap();
    assert!(report.device_lost());
    assert_eq!(report.series.len(), 1);
    assert_eq!(link.sent(), "F", "no stop command to a lost board");
    assert!(link.is_closed());
    assert!(!session.is_connected());

    let lost = events
        .try_iter()
        .filter(|e| matches!(e, AcquisitionEvent::DeviceLost(_)))
        .count();
    assert_eq!(lost, 1);

    assert!(matches!(
        session.start_flight("Pilot"),
        Err(SessionError::Link(LinkError::Closed))
    ));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn empty_flight_reports_no_data() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("empty");
    let mut session = controller(&link, &dir);

    session.start_flight("Pilot").unwrap();
    let report = session.stop_flight().unwrap();
    assert!(report.series.is_empty());
    assert!(report.series.summary().is_none());
    assert!(matches!(report.series.columns(), Err(SessionError::NoData)));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn operations_out_of_order_are_rejected() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("order");
    let mut session = controller(&link, &dir);

    assert!(matches!(session.stop_flight(), Err(SessionError::InvalidState(_))));
    assert!(matches!(
        session.select_axis(Axis::X),
        Err(SessionError::InvalidState(_))
    ));
    assert!(matches!(
        session.end_calibration(),
        Err(SessionError::InvalidState(_))
    ));

    session.start_calibration("Pilot").unwrap();
    assert!(matches!(
        session.start_flight("Pilot"),
        Err(SessionError::InvalidState(_))
    ));
    assert_eq!(link.sent(), "");
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn failed_start_command_closes_the_link() {
    let link = ScriptedLink::new();
    link.fail_writes();
    let dir = scratch_dir("write-fail");
    let mut session = controller(&link, &dir);

    assert!(matches!(
        session.start_flight("Pilot"),
        Err(SessionError::Link(LinkError::DeviceUnavailable(_)))
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(link.is_closed());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn shutdown_is_idempotent_and_stops_a_running_flight() {
    let link = ScriptedLink::new();
    let dir = scratch_dir("shutdown");
    let mut session = controller(&link, &dir);

    session.start_flight("Pilot").unwrap();
    session.shutdown();
    assert_eq!(link.sent(), "FS");
    assert!(link.is_closed());
    assert_eq!(session.state(), SessionState::Idle);

    session.shutdown();
    drop(session);
    assert_eq!(link.close_calls(), 1);
    fs::remove_dir_all(&dir).unwrap();
}
