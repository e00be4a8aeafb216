//! Ultrasonic distance channel.
//!
//! Takes `N` point readings spaced by a short delay, drops echo misses,
//! and averages the rest.  No thresholding happens here: deciding whether
//! a vehicle is present is the fusion engine's job, so every average is
//! published, including "far" ones that signal departure.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::app::ports::{Clock, RangeFinder};
use crate::events::{DistanceSample, EventBus, SensorEvent};
use crate::shutdown::Shutdown;

pub struct DistanceChannel<R: RangeFinder, D: DelayNs, C: Clock> {
    sensor: R,
    delay: D,
    clock: C,
    samples: usize,
    spacing_ms: u32,
}

impl<R: RangeFinder, D: DelayNs, C: Clock> DistanceChannel<R, D, C> {
    pub fn new(sensor: R, delay: D, clock: C, samples: usize, spacing_ms: u32) -> Self {
        Self {
            sensor,
            delay,
            clock,
            samples: samples.max(1),
            spacing_ms,
        }
    }

    /// One averaged reading, or `None` if every point reading failed.
    pub fn sample(&mut self) -> Option<DistanceSample> {
        let mut sum = 0.0;
        let mut valid = 0usize;
        for i in 0..self.samples {
            if i > 0 {
                self.delay.delay_ms(self.spacing_ms);
            }
            match self.sensor.read_once() {
                Some(cm) if cm.is_finite() => {
                    sum += cm;
                    valid += 1;
                }
                _ => {}
            }
        }
        if valid == 0 {
            return None;
        }
        if valid < self.samples {
            debug!("DISTANCE: {}/{} echoes valid", valid, self.samples);
        }
        Some(DistanceSample {
            distance_cm: sum / valid as f64,
            timestamp: self.clock.now(),
        })
    }

    /// Publish one averaged reading per `interval` until shutdown.
    pub fn run(mut self, bus: &EventBus, shutdown: &Shutdown, interval: Duration) {
        info!("DISTANCE: started ({} readings per sample)", self.samples);
        loop {
            match self.sample() {
                Some(s) => {
                    bus.push(SensorEvent::Distance(s));
                }
                None => warn!("DISTANCE: no valid echo in {} readings", self.samples),
            }
            if shutdown.wait(interval) {
                break;
            }
        }
        info!("DISTANCE: stopped");
    }
}
