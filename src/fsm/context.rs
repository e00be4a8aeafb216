//! Shared mutable context threaded through every fusion state handler.
//!
//! `FusionContext` is the single struct that state handlers read from and
//! write to: the time of the event being handled, configuration, alert
//! episodes, the charging timer, and the outputs (channel arming and
//! pending alerts) that the engine applies after each event.  Think of it
//! as the "blackboard" in a blackboard architecture.

use log::{debug, info};

use crate::app::events::{Alert, AlertKind};
use crate::config::SpotConfig;
use crate::events::{FrameRef, Timestamp};

// ---------------------------------------------------------------------------
// Alert episodes
// ---------------------------------------------------------------------------

/// Span during which one alert condition stays continuously true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertEpisode {
    pub kind: AlertKind,
    pub started_at: Timestamp,
    pub last_notified_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Channel arming (written by state handlers; applied by the engine)
// ---------------------------------------------------------------------------

/// Which on-demand channels the current state wants running.
/// The distance channel is always on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArmCommands {
    pub vision: bool,
    pub power: bool,
}

// ---------------------------------------------------------------------------
// FusionContext
// ---------------------------------------------------------------------------

pub struct FusionContext {
    // -- Timing --
    /// Timestamp of the event being handled.
    pub now: Timestamp,
    /// Start of the current no-charge interval while an EV is parked.
    pub charging_timer: Option<Timestamp>,

    // -- Configuration --
    pub config: SpotConfig,

    // -- Episodes --
    /// Indexed by `AlertKind as usize`.
    pub episodes: [Option<AlertEpisode>; AlertKind::COUNT],

    // -- Evidence --
    /// Frame that confirmed the latest classification.
    pub last_frame: Option<FrameRef>,

    // -- Outputs --
    pub arm: ArmCommands,
    pub outbox: Vec<Alert>,
}

impl FusionContext {
    pub fn new(config: SpotConfig) -> Self {
        Self {
            now: Timestamp::ZERO,
            charging_timer: None,
            config,
            episodes: [None; AlertKind::COUNT],
            last_frame: None,
            arm: ArmCommands::default(),
            outbox: Vec::new(),
        }
    }

    pub fn episode(&self, kind: AlertKind) -> Option<&AlertEpisode> {
        self.episodes[kind as usize].as_ref()
    }

    pub fn episode_active(&self, kind: AlertKind) -> bool {
        self.episodes[kind as usize].is_some()
    }

    /// Open an episode of `kind` and queue its alert, unless one is
    /// already active.  Returns `true` if an alert was queued.
    pub fn raise(&mut self, kind: AlertKind, message: String) -> bool {
        let slot = &mut self.episodes[kind as usize];
        if let Some(active) = slot {
            debug!(
                "FUSION: {} suppressed, episode active since {} ms",
                kind.name(),
                active.started_at.as_millis()
            );
            return false;
        }
        *slot = Some(AlertEpisode {
            kind,
            started_at: self.now,
            last_notified_at: self.now,
        });
        info!("FUSION: raising {}: {message}", kind.name());
        self.outbox.push(Alert {
            kind,
            raised_at: self.now,
            message,
            image: self.last_frame.clone(),
        });
        true
    }

    /// Re-arm `kind` once its condition has resolved.
    pub fn clear_episode(&mut self, kind: AlertKind) {
        if self.episodes[kind as usize].take().is_some() {
            info!("FUSION: {} episode cleared", kind.name());
        }
    }

    pub fn clear_all_episodes(&mut self) {
        for kind in AlertKind::ALL {
            self.clear_episode(kind);
        }
    }

    /// Seconds the parked EV has gone without charging current.
    pub fn secs_without_charge(&self) -> u64 {
        self.charging_timer
            .map_or(0, |since| self.now.since(since).as_secs())
    }
}
