//! Link supervisor: owns the meter handle and runs request/response cycles.
//!
//! ```text
//!   connect() ──▶ poll() ──ok──▶ ElectricalSample
//!                   │
//!                   ├─ Decode(..) ──▶ discard, poll again next cycle
//!                   └─ Timeout / Io ─▶ reconnect() ──▶ poll()
//! ```
//!
//! The cumulative energy baseline lives here, not in a global, and is
//! cleared on every (re)connection so no stale reading crosses a reconnect.

use core::time::Duration;

use log::{debug, error, info, warn};

use crate::app::ports::Clock;
use crate::error::LinkError;
use crate::events::ElectricalSample;
use crate::shutdown::Shutdown;

use super::frame::{self, MAX_RESPONSE_LEN, ProtocolVariant};
use super::transport::{Connector, Transport};

// ---------------------------------------------------------------------------
// Energy baseline
// ---------------------------------------------------------------------------

/// Previous cumulative energy reading of one link instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnergyBaseline {
    previous: Option<u32>,
}

impl EnergyBaseline {
    /// Record `energy_wh` and return the delta to the previous reading.
    ///
    /// Zero on the first reading.  A counter that went backwards (wrap or
    /// meter reset) also yields zero and re-anchors on the new value.
    pub fn advance(&mut self, energy_wh: u32) -> i64 {
        let delta = match self.previous {
            None => 0,
            Some(prev) if energy_wh >= prev => i64::from(energy_wh - prev),
            Some(prev) => {
                warn!("METER: energy counter went backwards ({prev} -> {energy_wh} Wh), treating as reset");
                0
            }
        };
        self.previous = Some(energy_wh);
        delta
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn previous(&self) -> Option<u32> {
        self.previous
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct LinkSupervisor<K: Connector, C: Clock> {
    connector: K,
    link: Option<K::Link>,
    variant: ProtocolVariant,
    clock: C,
    response_timeout: Duration,
    backoff: Duration,
    baseline: EnergyBaseline,
    reconnects: u32,
}

impl<K: Connector, C: Clock> LinkSupervisor<K, C> {
    /// Build an unconnected supervisor.  Call [`connect`](Self::connect)
    /// before the first poll.
    pub fn new(
        connector: K,
        variant: ProtocolVariant,
        clock: C,
        response_timeout: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            connector,
            link: None,
            variant,
            clock,
            response_timeout,
            backoff,
            baseline: EnergyBaseline::default(),
            reconnects: 0,
        }
    }

    /// Open the device once.  Used at startup, where failure is fatal.
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if self.link.is_some() {
            return Ok(());
        }
        let link = self.connector.open()?;
        info!(
            "METER: connected to {} ({:?} query)",
            self.connector.describe(),
            self.variant
        );
        self.link = Some(link);
        self.baseline.reset();
        Ok(())
    }

    /// One request/response exchange.
    ///
    /// The returned sample carries the read time and the energy delta
    /// against the previous successful read on this connection.
    pub fn poll(&mut self) -> Result<ElectricalSample, LinkError> {
        let link = self.link.as_mut().ok_or(LinkError::NotConnected)?;

        let expected = self.variant.response_len();
        let mut buf = [0u8; MAX_RESPONSE_LEN];
        let received = exchange(
            link,
            &self.variant.request(),
            &mut buf[..expected],
            &self.clock,
            self.response_timeout,
        )?;
        if received == 0 {
            return Err(LinkError::Timeout);
        }

        let sample = frame::decode(&buf[..received])?;
        let delta = self.baseline.advance(sample.energy_wh);
        debug!(
            "METER: {:.1} V {:.3} A {:.1} W E={} Wh (+{delta})",
            sample.voltage_v, sample.current_a, sample.power_w, sample.energy_wh
        );
        Ok(sample.stamped(self.clock.now(), delta))
    }

    /// Drop the handle and retry opening it until it succeeds.
    ///
    /// Waits the fixed backoff between attempts and never gives up on its
    /// own.  Returns `false` only when `shutdown` fires first.
    pub fn reconnect(&mut self, shutdown: &Shutdown) -> bool {
        self.close();
        let mut attempt: u32 = 0;
        loop {
            if shutdown.is_triggered() {
                return false;
            }
            attempt = attempt.saturating_add(1);
            info!(
                "METER: reconnect attempt {attempt} on {}",
                self.connector.describe()
            );
            match self.connector.open() {
                Ok(link) => {
                    self.link = Some(link);
                    self.baseline.reset();
                    self.reconnects = self.reconnects.saturating_add(1);
                    info!("METER: reconnected after {attempt} attempt(s)");
                    return true;
                }
                Err(e) => {
                    error!("METER: open failed: {e}");
                }
            }
            if shutdown.wait(self.backoff) {
                return false;
            }
        }
    }

    /// Release the device handle.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            info!("METER: closed {}", self.connector.describe());
        }
        self.baseline.reset();
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Successful reconnections since construction.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub fn baseline(&self) -> EnergyBaseline {
        self.baseline
    }
}

/// Write `request`, then read into `response` until it is full, the line
/// goes quiet, or `timeout` passes.  Returns the number of bytes read.
fn exchange<T: Transport, C: Clock>(
    link: &mut T,
    request: &[u8],
    response: &mut [u8],
    clock: &C,
    timeout: Duration,
) -> Result<usize, LinkError> {
    link.clear_input().map_err(Into::into)?;

    let mut sent = 0;
    while sent < request.len() {
        let n = link.write(&request[sent..]).map_err(Into::into)?;
        if n == 0 {
            return Err(LinkError::Io(std::io::ErrorKind::WriteZero));
        }
        sent += n;
    }
    link.flush().map_err(Into::into)?;

    let deadline = clock.now().plus(timeout);
    let mut filled = 0;
    while filled < response.len() {
        let n = link.read(&mut response[filled..]).map_err(Into::into)?;
        if n == 0 {
            break;
        }
        filled += n;
        if clock.now() >= deadline {
            break;
        }
    }
    Ok(filled)
}
