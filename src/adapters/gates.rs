//! Channel arming flags.
//!
//! Implements [`ChannelControl`] for the fusion thread and is polled by
//! the vision and power loops.  Lock-free: one atomic per channel.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::app::ports::ChannelControl;
use crate::events::Channel;

/// Cheaply clonable handle; every clone sees the same flags.
#[derive(Clone, Default)]
pub struct ChannelGates {
    armed: Arc<[AtomicBool; Channel::COUNT]>,
}

impl ChannelGates {
    /// Distance armed, vision and power disarmed.
    pub fn new() -> Self {
        let gates = Self::default();
        gates.armed[Channel::Distance as usize].store(true, Ordering::Release);
        gates
    }

    pub fn is_armed(&self, channel: Channel) -> bool {
        self.armed[channel as usize].load(Ordering::Acquire)
    }
}

impl ChannelControl for ChannelGates {
    fn set_armed(&mut self, channel: Channel, armed: bool) {
        let was = self.armed[channel as usize].swap(armed, Ordering::AcqRel);
        if was != armed {
            info!(
                "GATES: {} channel {}",
                channel.name(),
                if armed { "armed" } else { "disarmed" }
            );
        }
    }
}

impl core::fmt::Debug for ChannelGates {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelGates")
            .field("distance", &self.is_armed(Channel::Distance))
            .field("vision", &self.is_armed(Channel::Vision))
            .field("power", &self.is_armed(Channel::Power))
            .finish()
    }
}
