//! Port traits: the hexagonal boundary between the fusion core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ channels / FusionEngine (domain)
//! ```
//!
//! Driven adapters (range finder, camera, classifier, notification
//! gateway, audio) implement these traits.  Channels and the engine consume
//! them via generics, so the domain core never touches a device directly.

use crate::error::{NotifyError, SensorError};
use crate::events::{BoundingBox, Channel, FrameRef, Timestamp};

use super::events::Alert;

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// Monotonic time source shared by every channel.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

// ───────────────────────────────────────────────────────────────
// Sensor collaborators (driven adapters: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Ultrasonic range finder.
pub trait RangeFinder {
    /// One point reading in centimetres.  `None` on echo timeout or miss.
    /// Must tolerate being called at 10 Hz or faster.
    fn read_once(&mut self) -> Option<f64>;
}

/// Frame source for the vision channel.
pub trait Camera {
    /// Grab the next frame, opening the device on first use.
    fn capture(&mut self) -> Result<FrameRef, SensorError>;

    /// Release the device.  The next `capture` reopens it.
    fn release(&mut self) {}
}

/// One object reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Model class index; mapped to vehicle / EV through configuration.
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Object-detection model.
pub trait Classifier {
    fn classify(&mut self, frame: &FrameRef) -> Result<Vec<Detection>, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Notification collaborators (driven adapters: domain → outside)
// ───────────────────────────────────────────────────────────────

/// Push-notification gateway.  Best effort: a failure is logged by the
/// caller and never retried.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, image: Option<&[u8]>) -> Result<(), NotifyError>;
}

/// Audio / text-to-speech output.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, clip: &str) -> Result<(), NotifyError>;
}

// ───────────────────────────────────────────────────────────────
// Fusion engine outputs
// ───────────────────────────────────────────────────────────────

/// Receives alert intents from the engine.  Must not block.
pub trait AlertSink {
    fn raise(&mut self, alert: Alert);
}

/// Arms and disarms the on-demand channels.
pub trait ChannelControl {
    fn set_armed(&mut self, channel: Channel, armed: bool);
}
