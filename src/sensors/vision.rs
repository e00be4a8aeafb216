//! Camera-based vehicle classification channel.
//!
//! Each frame goes through the external classifier; the best detection is
//! mapped to EV / non-EV through the configured class ids and then has to
//! survive the [`StabilityFilter`] before a [`VisionEvent`] is published.
//!
//! ```text
//!  capture ─▶ classify ─▶ pick_candidate ─▶ StabilityFilter ─▶ VisionEvent
//!                                              │
//!                   gap / bbox jump / class flip ─▶ timer reset
//! ```

use core::time::Duration;

use log::{debug, info, warn};

use crate::adapters::gates::ChannelGates;
use crate::app::ports::{Camera, Classifier, Clock, Detection};
use crate::config::SpotConfig;
use crate::error::SensorError;
use crate::events::{BoundingBox, Channel, EventBus, SensorEvent, Timestamp, VisionEvent};
use crate::shutdown::Shutdown;

// ---------------------------------------------------------------------------
// Class mapping
// ---------------------------------------------------------------------------

/// A detection mapped onto the vehicle classes the monitor cares about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub is_ev: bool,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Pick the detection that decides this frame.
///
/// Detections below `min_confidence` or outside the configured class ids
/// are ignored.  Any EV detection wins over plain vehicles; within a class
/// the most confident one supplies the bounding box.
pub fn pick_candidate(detections: &[Detection], config: &SpotConfig) -> Option<Candidate> {
    let mut best_ev: Option<&Detection> = None;
    let mut best_vehicle: Option<&Detection> = None;
    for d in detections {
        if d.confidence.is_nan() || d.confidence < config.min_confidence {
            continue;
        }
        let slot = if config.ev_class_ids.contains(&d.class_id) {
            &mut best_ev
        } else if config.vehicle_class_ids.contains(&d.class_id) {
            &mut best_vehicle
        } else {
            continue;
        };
        if slot.is_none_or(|b| d.confidence > b.confidence) {
            *slot = Some(d);
        }
    }
    let (is_ev, d) = match (best_ev, best_vehicle) {
        (Some(ev), _) => (true, ev),
        (None, Some(v)) => (false, v),
        (None, None) => return None,
    };
    Some(Candidate {
        is_ev,
        confidence: d.confidence,
        bbox: d.bbox,
    })
}

// ---------------------------------------------------------------------------
// Stability filter
// ---------------------------------------------------------------------------

/// Confirms a candidate only after it has held still for `window`.
pub struct StabilityFilter {
    window: Duration,
    tolerance_px: f32,
    /// First box of the current candidate and when it appeared.
    anchor: Option<(Candidate, Timestamp)>,
}

impl StabilityFilter {
    pub fn new(window: Duration, tolerance_px: f32) -> Self {
        Self {
            window,
            tolerance_px,
            anchor: None,
        }
    }

    /// Feed one frame's verdict.  Returns the candidate once it has been
    /// stable for the whole window, then starts a fresh window.
    pub fn observe(&mut self, candidate: Option<Candidate>, now: Timestamp) -> Option<Candidate> {
        let Some(c) = candidate else {
            if self.anchor.take().is_some() {
                debug!("VISION: detection lost, stability timer reset");
            }
            return None;
        };

        let since = match self.anchor {
            Some((a, since))
                if a.is_ev == c.is_ev && a.bbox.max_shift(&c.bbox) <= self.tolerance_px =>
            {
                since
            }
            Some(_) => {
                debug!("VISION: candidate moved or changed class, stability timer reset");
                self.anchor = Some((c, now));
                now
            }
            None => {
                self.anchor = Some((c, now));
                now
            }
        };

        if now.since(since) >= self.window {
            self.anchor = None;
            return Some(c);
        }
        None
    }

    pub fn reset(&mut self) {
        self.anchor = None;
    }

    /// Start of the current stability window, if a candidate is pending.
    pub fn pending_since(&self) -> Option<Timestamp> {
        self.anchor.map(|(_, since)| since)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

pub struct VisionChannel<Cam: Camera, Cls: Classifier, C: Clock> {
    camera: Cam,
    classifier: Cls,
    clock: C,
    filter: StabilityFilter,
    config: SpotConfig,
}

impl<Cam: Camera, Cls: Classifier, C: Clock> VisionChannel<Cam, Cls, C> {
    pub fn new(camera: Cam, classifier: Cls, clock: C, config: SpotConfig) -> Self {
        Self {
            camera,
            classifier,
            clock,
            filter: StabilityFilter::new(config.detection_stability(), config.bbox_tolerance_px),
            config,
        }
    }

    /// Capture and classify one frame.  Returns a confirmed event when the
    /// stability window completes on this frame.
    pub fn step(&mut self) -> Result<Option<VisionEvent>, SensorError> {
        let frame = self.camera.capture()?;
        let detections = self.classifier.classify(&frame)?;
        let now = self.clock.now();
        let candidate = pick_candidate(&detections, &self.config);
        Ok(self.filter.observe(candidate, now).map(|c| {
            info!(
                "VISION: confirmed {} ({:.2})",
                if c.is_ev { "EV" } else { "non-EV vehicle" },
                c.confidence
            );
            VisionEvent {
                is_ev: c.is_ev,
                confidence: c.confidence,
                bbox: c.bbox,
                timestamp: now,
                frame: Some(frame),
            }
        }))
    }

    /// Classify frames while armed until shutdown, then release the camera.
    pub fn run(mut self, bus: &EventBus, gates: &ChannelGates, shutdown: &Shutdown) {
        info!("VISION: started");
        let frame_interval = self.config.frame_interval();
        loop {
            let mut wait = frame_interval;
            if gates.is_armed(Channel::Vision) {
                match self.step() {
                    Ok(Some(event)) => {
                        bus.push(SensorEvent::Vision(event));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("VISION: {e}, retrying in {} s", self.config.camera_retry_s);
                        self.filter.reset();
                        self.camera.release();
                        wait = self.config.camera_retry();
                    }
                }
            } else if self.filter.pending_since().is_some() {
                self.filter.reset();
            }
            if shutdown.wait(wait) {
                break;
            }
        }
        self.camera.release();
        info!("VISION: stopped, camera released");
    }
}
