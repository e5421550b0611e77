use arduino_link::{Command, LineLink, LinkError, Orientation, SerialLink, DEFAULT_BAUD_RATE};
use clap::Parser;
use std::io;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Streams pitch/roll telemetry from the sensor board to stdout.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port; defaults to the usual Arduino device for this OS
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Stop after this many samples (0 = run until the board goes away)
    #[arg(short = 'n', long, default_value_t = 0)]
    count: usize,

    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let port = args.port.unwrap_or_else(|| arduino_link::default_port().to_string());

    let mut link = SerialLink::open_with(&port, args.baud, Duration::from_millis(args.timeout_ms), None)
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))?;

    info!("Streaming telemetry from {}", link.port_name());
    link.send_command(Command::StartFlight)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let mut received = 0usize;
    while args.count == 0 || received < args.count {
        match link.read_line() {
            Ok(line) => match line.parse::<Orientation>() {
                Ok(o) => {
                    received += 1;
                    println!("pitch: {: >10.3} roll: {: >10.3}", o.pitch, o.roll);
                }
                Err(e) => warn!("{}", e),
            },
            Err(LinkError::Timeout) => continue,
            Err(LinkError::MalformedLine(e)) => warn!("Malformed line: {}", e),
            Err(e) => {
                error!("Board disconnected: {}", e);
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()));
            }
        }
    }

    if let Err(e) = link.send_command(Command::StopFlight) {
        warn!("Failed to stop telemetry: {}", e);
    }
    info!("Read {} samples", received);
    link.close();
    Ok(())
}
