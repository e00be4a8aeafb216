//! Outbound alert intents.
//!
//! The [`FusionEngine`](crate::fsm::FusionEngine) emits these through the
//! [`AlertSink`](super::ports::AlertSink) port.  The dispatcher on the
//! other side turns each one into a push notification and audio clips.

use crate::events::{FrameRef, Timestamp};

/// Policy violations the monitor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlertKind {
    /// A vehicle that is not an EV occupies the spot.
    NonEvDetected = 0,
    /// An EV occupies the spot without drawing charging current.
    EvNotCharging = 1,
}

impl AlertKind {
    pub const COUNT: usize = 2;
    pub const ALL: [AlertKind; Self::COUNT] = [Self::NonEvDetected, Self::EvNotCharging];

    pub const fn name(self) -> &'static str {
        match self {
            Self::NonEvDetected => "NonEVDetected",
            Self::EvNotCharging => "EVNotCharging",
        }
    }

    /// Audio clips played, in order, when this alert fires.
    pub const fn clips(self) -> &'static [&'static str] {
        match self {
            Self::NonEvDetected => &["alert", "warning"],
            Self::EvNotCharging => &["not_charging"],
        }
    }
}

/// One notification intent.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub raised_at: Timestamp,
    pub message: String,
    pub image: Option<FrameRef>,
}
