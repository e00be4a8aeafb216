//! Host time adapter.
//!
//! - [`MonotonicClock`] implements the [`Clock`] port on
//!   `std::time::Instant`; every clone shares the same epoch.
//! - [`StdDelay`] implements `embedded_hal::delay::DelayNs` with
//!   `thread::sleep`, for the spacing between ultrasonic pings.

use core::time::Duration;
use std::time::Instant;

use embedded_hal::delay::DelayNs;

use crate::app::ports::Clock;
use crate::events::Timestamp;

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds since the clock was created.
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.start.elapsed().as_millis() as u64)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
