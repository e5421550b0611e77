use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source for sample timestamps and loop pacing.
pub trait Clock: Send + Sync {
    /// Seconds since the UNIX epoch. Never goes backwards.
    fn now(&self) -> f64;

    fn sleep(&self, duration: Duration);
}

/// Wall-clock anchored at construction, advanced by a monotonic timer so
/// timestamps stay ordered even if the system clock is adjusted mid-flight.
#[derive(Debug)]
pub struct SystemClock {
    epoch: f64,
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        SystemClock {
            epoch,
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.epoch + self.start.elapsed().as_secs_f64()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Virtual clock: `sleep` returns immediately and advances time instead.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn starting_at(seconds: f64) -> Self {
        ManualClock {
            micros: AtomicU64::new((seconds * 1e6) as u64),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1e6
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // let other threads observe a cancel flag between virtual ticks
        thread::yield_now();
    }
}
