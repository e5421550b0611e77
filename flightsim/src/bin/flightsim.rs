use clap::Parser;
use flightsim::{
    AcquisitionEvent, Axis, FlightReport, SessionConfig, SessionController, SessionError, SerialLink,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::thread;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Operator console for the UAV flight simulator board.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    /// Where calibration records are written
    #[arg(long)]
    calibration_dir: Option<PathBuf>,

    /// Delay between telemetry reads in milliseconds
    #[arg(long)]
    pace_ms: Option<u64>,

    /// Print every sample while flying
    #[arg(long)]
    live: bool,
}

const HELP: &str = "\
commands:
  calibrate <operator>   start calibration
  x | y | z              measure one axis (+g then -g)
  end                    finish calibration and save the record
  fly <operator>         start recording a flight
  stop [file.csv|.json]  stop the flight, optionally export the series
  help
  quit";

fn load_config(args: &Args) -> Result<SessionConfig, SessionError> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(dir) = &args.calibration_dir {
        config.calibration_dir = dir.clone();
    }
    if let Some(pace) = args.pace_ms {
        config.pace_interval_ms = pace;
    }
    config.validate()?;
    Ok(config)
}

fn report_flight(report: &FlightReport, export: Option<&str>) -> Result<(), SessionError> {
    if report.device_lost() {
        println!("Sensor board disconnected during the flight.");
    }
    let Some(summary) = report.series.summary() else {
        println!("No data recorded.");
        return Ok(());
    };
    println!(
        "{} samples over {:.1} s, pitch {:.2}..{:.2} deg, roll {:.2}..{:.2} deg",
        summary.count,
        summary.duration,
        summary.pitch_range.0,
        summary.pitch_range.1,
        summary.roll_range.0,
        summary.roll_range.1,
    );
    if let Some(path) = export {
        let path = Path::new(path);
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => report.series.write_json(path)?,
            _ => report.series.write_csv(path)?,
        }
        println!("Saved {}", path.display());
    }
    Ok(())
}

fn execute(
    session: &mut SessionController<SerialLink>,
    command: &str,
    rest: &str,
) -> Result<bool, SessionError> {
    match command {
        "calibrate" => {
            session.start_calibration(rest)?;
            println!("Calibrating for {}. Measure x, y and z, then `end`.", rest.trim());
        }
        "x" | "y" | "z" => {
            let axis = Axis::from_str(command)
                .map_err(|e| SessionError::Validation(e.to_string()))?;
            let pair = session.select_axis(axis)?;
            println!(
                "{}-axis: +g {} V, -g {} V",
                axis,
                pair.positive.unwrap_or_default(),
                pair.negative.unwrap_or_default()
            );
        }
        "end" => {
            let saved = session.end_calibration()?;
            for (axis, c) in saved.calibration.iter() {
                println!("{}-axis: k = {}, n = {}", axis, c.scale, c.offset);
            }
            println!("Saved {}", saved.path.display());
        }
        "fly" => {
            session.start_flight(rest)?;
            println!("Flying. Type `stop` to end the flight.");
        }
        "stop" => {
            let report = session.stop_flight()?;
            let export = Some(rest.trim()).filter(|p| !p.is_empty());
            report_flight(&report, export)?;
        }
        "help" => println!("{}", HELP),
        "quit" | "exit" => return Ok(false),
        other => println!("Unknown command `{}`, try `help`.", other),
    }
    Ok(true)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut session = match SessionController::connect(&config) {
        Ok(session) => session,
        Err(e) => {
            error!("Unable to connect to the sensor board: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let events = session.subscribe();
    let live = args.live;
    thread::spawn(move || {
        for event in events {
            match event {
                AcquisitionEvent::Sample(s) if live => {
                    println!("pitch: {: >8.2} roll: {: >8.2}", s.pitch, s.roll)
                }
                AcquisitionEvent::Sample(_) => {}
                AcquisitionEvent::DeviceLost(reason) => {
                    println!("Sensor board disconnected ({}). Type `stop` to collect the data.", reason)
                }
            }
        }
    });

    println!("{}", HELP);
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match execute(&mut session, &command.to_lowercase(), rest) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("Error: {}", e),
        }
        if !session.is_connected() {
            println!("Sensor board is no longer connected, exiting.");
            break;
        }
    }

    session.shutdown();
    ExitCode::SUCCESS
}
