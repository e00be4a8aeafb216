//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers: no closures, no
//! dynamic dispatch.
//!
//! ```text
//!  EMPTY ──[dist ≤ thr]──▶ UNCLASSIFIED ──[vision: EV]──────▶ CHARGING_ACTIVE
//!    ▲                          │                              │      ▲
//!    │                   [vision: non-EV]          [no charge > timeout]  [I > thr]
//!    │                          ▼                              ▼      │
//!    │                        NON_EV ◀──[vision: non-EV]── CHARGING_STALLED
//!    │
//!  any occupied state ──[dist > thr]──▶ EMPTY
//! ```
//!
//! `NonEv` also moves to `ChargingActive` on a later EV classification,
//! and both charging states move to `NonEv` on a non-EV classification.
//!
//! Episodes outlive reclassification.  `NonEVDetected` is cleared only
//! when the spot empties; `EVNotCharging` when the spot empties or
//! charging current is seen again.

use log::info;

use super::context::FusionContext;
use super::{StateDescriptor, StateId};
use crate::app::events::AlertKind;
use crate::events::{ElectricalSample, SensorEvent};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once per engine.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Empty
        StateDescriptor {
            id: StateId::Empty,
            name: "Empty",
            on_enter: Some(empty_enter),
            on_exit: None,
            on_event: empty_event,
        },
        // Index 1: Unclassified
        StateDescriptor {
            id: StateId::Unclassified,
            name: "Unclassified",
            on_enter: Some(unclassified_enter),
            on_exit: None,
            on_event: unclassified_event,
        },
        // Index 2: NonEv
        StateDescriptor {
            id: StateId::NonEv,
            name: "NonEv",
            on_enter: Some(non_ev_enter),
            on_exit: None,
            on_event: non_ev_event,
        },
        // Index 3: ChargingActive
        StateDescriptor {
            id: StateId::ChargingActive,
            name: "ChargingActive",
            on_enter: Some(charging_active_enter),
            on_exit: None,
            on_event: charging_active_event,
        },
        // Index 4: ChargingStalled
        StateDescriptor {
            id: StateId::ChargingStalled,
            name: "ChargingStalled",
            on_enter: Some(charging_stalled_enter),
            on_exit: Some(charging_stalled_exit),
            on_event: charging_stalled_event,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared guards
// ═══════════════════════════════════════════════════════════════════════════

/// Vehicle has left: averaged distance beyond the presence threshold.
fn departed(ctx: &FusionContext, event: &SensorEvent) -> bool {
    matches!(event, SensorEvent::Distance(d) if d.distance_cm > ctx.config.presence_threshold_cm)
}

fn is_charging(ctx: &FusionContext, sample: &ElectricalSample) -> bool {
    sample.current_a > ctx.config.charge_current_threshold_a
}

/// Reclassification shared by every classified state.
fn classified_as(event: &SensorEvent) -> Option<bool> {
    match event {
        SensorEvent::Vision(v) => Some(v.is_ev),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  EMPTY
// ═══════════════════════════════════════════════════════════════════════════

fn empty_enter(ctx: &mut FusionContext) {
    ctx.clear_all_episodes();
    ctx.charging_timer = None;
    ctx.last_frame = None;
    ctx.arm.vision = false;
    ctx.arm.power = false;
    info!("EMPTY: spot free");
}

fn empty_event(ctx: &mut FusionContext, event: &SensorEvent) -> Option<StateId> {
    match event {
        SensorEvent::Distance(d) if d.distance_cm <= ctx.config.presence_threshold_cm => {
            info!("EMPTY: vehicle at {:.1} cm", d.distance_cm);
            Some(StateId::Unclassified)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  UNCLASSIFIED: occupied, waiting for a stable vision verdict
// ═══════════════════════════════════════════════════════════════════════════

fn unclassified_enter(ctx: &mut FusionContext) {
    ctx.arm.vision = true;
    info!(
        "UNCLASSIFIED: starting vision detection ({} s stability window)",
        ctx.config.detection_stability_s
    );
}

fn unclassified_event(ctx: &mut FusionContext, event: &SensorEvent) -> Option<StateId> {
    if departed(ctx, event) {
        return Some(StateId::Empty);
    }
    match classified_as(event)? {
        true => Some(StateId::ChargingActive),
        false => Some(StateId::NonEv),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  NON_EV: a regular car is blocking the charger
// ═══════════════════════════════════════════════════════════════════════════

fn non_ev_enter(ctx: &mut FusionContext) {
    ctx.arm.power = false;
    ctx.charging_timer = None;
    ctx.raise(
        AlertKind::NonEvDetected,
        "Non-EV vehicle detected in EV charging spot".to_owned(),
    );
}

fn non_ev_event(ctx: &mut FusionContext, event: &SensorEvent) -> Option<StateId> {
    if departed(ctx, event) {
        return Some(StateId::Empty);
    }
    match classified_as(event) {
        Some(true) => {
            info!("NON_EV: reclassified as EV");
            Some(StateId::ChargingActive)
        }
        // Repeated non-EV confirmations are expected once per window.
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CHARGING_ACTIVE: EV parked, charging or within its grace period
// ═══════════════════════════════════════════════════════════════════════════

fn charging_active_enter(ctx: &mut FusionContext) {
    ctx.charging_timer = Some(ctx.now);
    ctx.arm.power = true;
    info!(
        "CHARGING_ACTIVE: monitoring current (threshold {:.2} A, timeout {} s)",
        ctx.config.charge_current_threshold_a, ctx.config.charging_timeout_s
    );
}

fn charging_active_event(ctx: &mut FusionContext, event: &SensorEvent) -> Option<StateId> {
    if departed(ctx, event) {
        return Some(StateId::Empty);
    }
    match event {
        SensorEvent::Power(sample) if is_charging(ctx, sample) => {
            ctx.charging_timer = Some(ctx.now);
            // A stall carried over from an earlier classification ends here.
            ctx.clear_episode(AlertKind::EvNotCharging);
            None
        }
        SensorEvent::Power(sample) => {
            let since = *ctx.charging_timer.get_or_insert(ctx.now);
            if ctx.now.since(since) > ctx.config.charging_timeout() {
                info!(
                    "CHARGING_ACTIVE: {:.3} A for {} s, stalled",
                    sample.current_a,
                    ctx.secs_without_charge()
                );
                return Some(StateId::ChargingStalled);
            }
            None
        }
        SensorEvent::Vision(v) if !v.is_ev => Some(StateId::NonEv),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CHARGING_STALLED: EV parked without drawing current
// ═══════════════════════════════════════════════════════════════════════════

fn charging_stalled_enter(ctx: &mut FusionContext) {
    let secs = ctx.secs_without_charge();
    ctx.raise(
        AlertKind::EvNotCharging,
        format!("EV in charging spot has not been charging for {secs} s"),
    );
}

fn charging_stalled_exit(ctx: &mut FusionContext) {
    info!(
        "CHARGING_STALLED: leaving after {} s without charge",
        ctx.secs_without_charge()
    );
}

fn charging_stalled_event(ctx: &mut FusionContext, event: &SensorEvent) -> Option<StateId> {
    if departed(ctx, event) {
        return Some(StateId::Empty);
    }
    match event {
        SensorEvent::Power(sample) if is_charging(ctx, sample) => {
            info!("CHARGING_STALLED: charging resumed at {:.3} A", sample.current_a);
            ctx.clear_episode(AlertKind::EvNotCharging);
            Some(StateId::ChargingActive)
        }
        SensorEvent::Vision(v) if !v.is_ev => Some(StateId::NonEv),
        _ => None,
    }
}
