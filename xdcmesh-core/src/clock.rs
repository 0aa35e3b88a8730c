//! Time source for event timestamps.

use chrono::{DateTime, Utc};

/// Supplies timestamps for observer events.
///
/// Takes `&mut self` so simulated clocks can advance on every reading.
pub trait Clock: Send {
    fn now(&mut self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> DateTime<Utc> {
        Utc::now()
    }
}
