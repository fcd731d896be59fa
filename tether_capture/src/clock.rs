use chrono::{Local, NaiveDateTime};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Format used for every timestamp embedded in artifact and batch names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Source of time for the capture loops.
///
/// Every wait in a run is a deliberate blocking sleep sized to a physical
/// device (relay settle, bulb warm-up, interval remainder), so all of them go
/// through here.
pub trait Clock {
    /// Monotonic instant used to measure how long a capture took.
    fn now(&self) -> Instant;
    /// Local wall time used to name artifacts.
    fn wall_time(&self) -> NaiveDateTime;
    fn sleep(&self, duration: Duration);

    /// Sleeps for `duration` unless `stop` is raised first. Returns `false`
    /// when the sleep was cut short or the flag was already up.
    fn sleep_unless_stopped(&self, duration: Duration, stop: &StopFlag) -> bool {
        if stop.is_raised() {
            return false;
        }
        self.sleep(duration);
        !stop.is_raised()
    }
}

/// Operator request to end a run early. Raised from the signal handler,
/// polled by the capture loops between shots.
#[derive(Clone, Debug)]
pub struct StopFlag {
    raised: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl StopFlag {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            raised: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        // a full channel already holds a wake-up
        let _ = self.wake_tx.try_send(());
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Blocks for up to `timeout`. Returns `true` if the flag went up.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_raised() {
            return true;
        }
        let _ = self.wake_rx.recv_timeout(timeout);
        self.is_raised()
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn sleep_unless_stopped(&self, duration: Duration, stop: &StopFlag) -> bool {
        !stop.wait_timeout(duration)
    }
}

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Time left of `interval` once `elapsed` has been spent. An overrun yields
/// zero, it never goes negative and never errors.
pub fn remaining(interval: Duration, elapsed: Duration) -> Duration {
    interval.checked_sub(elapsed).unwrap_or(Duration::ZERO)
}
