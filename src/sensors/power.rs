//! Power-meter channel: polls the link supervisor at a fixed cadence.
//!
//! Garbled frames are skipped; link failures trigger a reconnect that
//! blocks this thread (and only this thread) until the meter is back or
//! shutdown is requested.

use core::time::Duration;

use log::{error, info, warn};

use crate::adapters::gates::ChannelGates;
use crate::app::ports::Clock;
use crate::events::{Channel, ElectricalSample, EventBus, SensorEvent};
use crate::meter::link::LinkSupervisor;
use crate::meter::transport::Connector;
use crate::shutdown::Shutdown;

pub struct PowerChannel<K: Connector, C: Clock> {
    link: LinkSupervisor<K, C>,
    interval: Duration,
    discarded: u64,
}

impl<K: Connector, C: Clock> PowerChannel<K, C> {
    pub fn new(link: LinkSupervisor<K, C>, interval: Duration) -> Self {
        Self {
            link,
            interval,
            discarded: 0,
        }
    }

    /// One poll.  Returns a sample, or `None` after logging why not.
    pub fn step(&mut self, shutdown: &Shutdown) -> Option<ElectricalSample> {
        match self.link.poll() {
            Ok(sample) => {
                if sample.alarm {
                    warn!("POWER: meter over-power alarm set");
                }
                Some(sample)
            }
            Err(e) if !e.requires_reconnect() => {
                self.discarded += 1;
                warn!("POWER: discarding sample: {e}");
                None
            }
            Err(e) => {
                error!("POWER: link lost: {e}");
                self.link.reconnect(shutdown);
                None
            }
        }
    }

    /// Poll while armed until shutdown, then close the link.
    /// Hands the closed supervisor back to the caller.
    pub fn run(
        mut self,
        bus: &EventBus,
        gates: &ChannelGates,
        shutdown: &Shutdown,
    ) -> LinkSupervisor<K, C> {
        info!("POWER: started (every {} s)", self.interval.as_secs());
        loop {
            if gates.is_armed(Channel::Power) {
                if let Some(sample) = self.step(shutdown) {
                    bus.push(SensorEvent::Power(sample));
                }
            }
            if shutdown.wait(self.interval) {
                break;
            }
        }
        self.link.close();
        info!("POWER: stopped ({} garbled frames discarded)", self.discarded);
        self.link
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn link(&self) -> &LinkSupervisor<K, C> {
        &self.link
    }
}
