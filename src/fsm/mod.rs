//! Function-pointer finite state machine engine for spot-state fusion.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                         │
//! │  ┌─────────────────┬──────────┬──────────┬───────────────────────┐  │
//! │  │ StateId         │ on_enter │ on_exit  │ on_event              │  │
//! │  ├─────────────────┼──────────┼──────────┼───────────────────────┤  │
//! │  │ Empty           │ fn(ctx)  │    —     │ fn(ctx, ev)->Option<> │  │
//! │  │ Unclassified    │ fn(ctx)  │    —     │ fn(ctx, ev)->Option<> │  │
//! │  │ NonEv           │ fn(ctx)  │    —     │ fn(ctx, ev)->Option<> │  │
//! │  │ ChargingActive  │ fn(ctx)  │    —     │ fn(ctx, ev)->Option<> │  │
//! │  │ ChargingStalled │ fn(ctx)  │ fn(ctx)  │ fn(ctx, ev)->Option<> │  │
//! │  └─────────────────┴──────────┴──────────┴───────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! For every accepted event the engine calls `on_event` for the
//! **current** state.  If it returns `Some(next_id)`, the engine runs
//! `on_exit` for the current state, then `on_enter` for the next, and
//! updates the current pointer.  Afterwards the outputs the handlers left
//! in [`FusionContext`] (queued alerts and channel arming) are applied to
//! the [`AlertSink`] and [`ChannelControl`] ports.
//!
//! The engine is owned by the single consumer thread; nothing else ever
//! mutates the spot state.

pub mod context;
pub mod states;

use context::{ArmCommands, FusionContext};
use log::{debug, info, warn};

use crate::app::ports::{AlertSink, ChannelControl};
use crate::config::SpotConfig;
use crate::events::{Channel, SensorEvent, Timestamp};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Spot state.  `Unclassified` is "occupied, classification pending";
/// an EV classification enters `ChargingActive` directly.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Empty = 0,
    Unclassified = 1,
    NonEv = 2,
    ChargingActive = 3,
    ChargingStalled = 4,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 5;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Empty` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Empty,
            1 => Self::Unclassified,
            2 => Self::NonEv,
            3 => Self::ChargingActive,
            4 => Self::ChargingStalled,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Empty
            }
        }
    }

    pub fn is_occupied(self) -> bool {
        self != Self::Empty
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut FusionContext);

/// Signature for the per-event handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateEventFn = fn(&mut FusionContext, &SensorEvent) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_event: StateEventFn,
}

// ---------------------------------------------------------------------------
// Event validation
// ---------------------------------------------------------------------------

/// Why an event was dropped before reaching the state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DistanceOutOfRange,
    ElectricalOutOfRange,
    ConfidenceOutOfRange,
    BadBoundingBox,
}

impl Rejection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DistanceOutOfRange => "distance out of range",
            Self::ElectricalOutOfRange => "electrical reading out of range",
            Self::ConfidenceOutOfRange => "confidence out of range",
            Self::BadBoundingBox => "bounding box not finite",
        }
    }
}

/// Reject malformed or physically impossible events.
///
/// Distances past `max_distance_cm` are not rejected here; the sensor
/// reports them for an open bay, so [`clamp_range`] folds them to the
/// rated maximum instead.
pub fn validate(event: &SensorEvent) -> Result<(), Rejection> {
    match event {
        SensorEvent::Distance(d) => {
            if !(d.distance_cm.is_finite() && d.distance_cm >= 0.0) {
                return Err(Rejection::DistanceOutOfRange);
            }
        }
        SensorEvent::Power(s) => {
            let ok = s.current_a.is_finite()
                && s.current_a >= 0.0
                && s.voltage_v.is_finite()
                && s.voltage_v >= 0.0;
            if !ok {
                return Err(Rejection::ElectricalOutOfRange);
            }
        }
        SensorEvent::Vision(v) => {
            if !(0.0..=1.0).contains(&v.confidence) {
                return Err(Rejection::ConfidenceOutOfRange);
            }
            if !v.bbox.is_finite() {
                return Err(Rejection::BadBoundingBox);
            }
        }
    }
    Ok(())
}

/// Clamp a distance beyond the rated range to `max_distance_cm`.
pub fn clamp_range(event: &mut SensorEvent, config: &SpotConfig) {
    if let SensorEvent::Distance(d) = event {
        if d.distance_cm > config.max_distance_cm {
            debug!(
                "FUSION: {:.1} cm beyond rated range, treating as {:.1} cm",
                d.distance_cm, config.max_distance_cm
            );
            d.distance_cm = config.max_distance_cm;
        }
    }
}

// ---------------------------------------------------------------------------
// Fusion engine
// ---------------------------------------------------------------------------

pub struct FusionEngine {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    ctx: FusionContext,
    /// Arming last pushed to the [`ChannelControl`] port.
    applied: Option<ArmCommands>,
    /// Last accepted event per channel, indexed by `Channel as usize`.
    last_seen: [Option<Timestamp>; Channel::COUNT],
    silence_warned: [bool; Channel::COUNT],
    accepted: u64,
    rejected: u64,
    transitions: u64,
}

impl FusionEngine {
    /// Build an engine in `Empty`.  Call [`start`](Self::start) before the
    /// first event.
    pub fn new(config: SpotConfig) -> Self {
        Self {
            table: states::build_state_table(),
            current: StateId::Empty as usize,
            ctx: FusionContext::new(config),
            applied: None,
            last_seen: [None; Channel::COUNT],
            silence_warned: [false; Channel::COUNT],
            accepted: 0,
            rejected: 0,
            transitions: 0,
        }
    }

    /// Run the initial `on_enter` and push the initial channel arming.
    pub fn start(&mut self, now: Timestamp, control: &mut impl ChannelControl) {
        info!("FUSION starting in state: {}", self.table[self.current].name);
        self.ctx.now = now;
        self.last_seen[Channel::Distance as usize] = Some(now);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(&mut self.ctx);
        }
        self.apply_arming(control);
    }

    /// Feed one event through the state table.
    ///
    /// Invalid events are dropped with a warning and leave the state
    /// unchanged.  Returns the state after handling.
    pub fn handle(
        &mut self,
        mut event: SensorEvent,
        sink: &mut impl AlertSink,
        control: &mut impl ChannelControl,
    ) -> StateId {
        if let Err(why) = validate(&event) {
            self.rejected += 1;
            warn!(
                "FUSION: dropping {} event: {} ({} rejected so far)",
                event.channel().name(),
                why.as_str(),
                self.rejected
            );
            return self.current_state();
        }
        clamp_range(&mut event, &self.ctx.config);
        self.accepted += 1;

        let channel = event.channel() as usize;
        self.last_seen[channel] = Some(event.timestamp());
        if self.silence_warned[channel] {
            info!("FUSION: {} channel active again", event.channel().name());
            self.silence_warned[channel] = false;
        }

        self.ctx.now = event.timestamp();
        if let SensorEvent::Vision(v) = &event {
            if v.frame.is_some() {
                self.ctx.last_frame = v.frame.clone();
            }
        }

        if let Some(next) = (self.table[self.current].on_event)(&mut self.ctx, &event) {
            if next as usize != self.current {
                self.transition(next);
            }
        }

        for alert in self.ctx.outbox.drain(..) {
            sink.raise(alert);
        }
        self.apply_arming(control);
        self.current_state()
    }

    /// Warn once about every armed channel that has been silent longer
    /// than `channel_silence_s`.  Never changes state.  Returns the
    /// channels that were newly reported.
    pub fn check_liveness(&mut self, now: Timestamp) -> Vec<Channel> {
        let limit = self.ctx.config.channel_silence();
        let mut newly_silent = Vec::new();
        for channel in Channel::ALL {
            let idx = channel as usize;
            if !self.is_armed(channel) || self.silence_warned[idx] {
                continue;
            }
            let Some(seen) = self.last_seen[idx] else {
                continue;
            };
            let silent = now.since(seen);
            if silent > limit {
                warn!(
                    "FUSION: no {} events for {} s, keeping state {}",
                    channel.name(),
                    silent.as_secs(),
                    self.table[self.current].name
                );
                self.silence_warned[idx] = true;
                newly_silent.push(channel);
            }
        }
        newly_silent
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn state_name(&self) -> &'static str {
        self.table[self.current].name
    }

    pub fn context(&self) -> &FusionContext {
        &self.ctx
    }

    pub fn accepted_events(&self) -> u64 {
        self.accepted
    }

    pub fn rejected_events(&self) -> u64 {
        self.rejected
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn is_armed(&self, channel: Channel) -> bool {
        match channel {
            Channel::Distance => true,
            Channel::Vision => self.ctx.arm.vision,
            Channel::Power => self.ctx.arm.power,
        }
    }

    fn transition(&mut self, next_id: StateId) {
        let next_idx = next_id as usize;

        info!(
            "FUSION transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(&mut self.ctx);
        }

        self.current = next_idx;
        self.transitions += 1;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(&mut self.ctx);
        }
    }

    fn apply_arming(&mut self, control: &mut impl ChannelControl) {
        let want = self.ctx.arm;
        let had = self.applied;
        if had.map(|a| a.vision) != Some(want.vision) {
            control.set_armed(Channel::Vision, want.vision);
            if want.vision {
                self.last_seen[Channel::Vision as usize] = Some(self.ctx.now);
                self.silence_warned[Channel::Vision as usize] = false;
            }
        }
        if had.map(|a| a.power) != Some(want.power) {
            control.set_armed(Channel::Power, want.power);
            if want.power {
                self.last_seen[Channel::Power as usize] = Some(self.ctx.now);
                self.silence_warned[Channel::Power as usize] = false;
            }
        }
        self.applied = Some(want);
    }
}
