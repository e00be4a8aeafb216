//! Sensor event model and the shared bounded event stream.
//!
//! Events are produced by:
//! - the distance channel (averaged ultrasonic readings)
//! - the vision channel (stability-confirmed classifications)
//! - the power channel (validated meter samples)
//!
//! and consumed, one at a time and in arrival order, by the fusion engine.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Distance thr │────▶│              │     │              │
//! │ Vision thr   │────▶│   EventBus   │────▶│ Fusion thr   │
//! │ Power thr    │────▶│ (drop-oldest)│     │  (consumer)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

use heapless::Deque;
use log::warn;

/// Maximum number of pending sensor events.
/// At a five-second polling cadence overflow means the consumer is stuck.
pub const EVENT_QUEUE_CAP: usize = 32;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Monotonic milliseconds since the monitor's clock epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`; zero if `earlier` is in the future
    /// (events from different channels may arrive slightly out of order).
    pub fn since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    pub fn plus(self, d: Duration) -> Self {
        Self(self.0.saturating_add(d.as_millis() as u64))
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One validated power-meter reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectricalSample {
    /// RMS voltage (V).
    pub voltage_v: f64,
    /// RMS current (A).
    pub current_a: f64,
    /// Active power (W).  Forced to zero when current reads zero.
    pub power_w: f64,
    /// Cumulative energy counter (Wh).
    pub energy_wh: u32,
    /// Energy since the previous reading on the same link (Wh).
    pub energy_delta_wh: i64,
    /// Line frequency (Hz).
    pub frequency_hz: f64,
    /// Power factor (0.00 – 1.00).
    pub power_factor: f64,
    /// Meter over-power alarm raised.
    pub alarm: bool,
    pub timestamp: Timestamp,
}

impl ElectricalSample {
    /// Attach link-level context to a freshly decoded sample.
    pub fn stamped(self, timestamp: Timestamp, energy_delta_wh: i64) -> Self {
        Self {
            timestamp,
            energy_delta_wh,
            ..self
        }
    }
}

/// Averaged ultrasonic distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    pub distance_cm: f64,
    pub timestamp: Timestamp,
}

/// Axis-aligned box in image pixels, `(x1, y1)` top-left, `(x2, y2)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Largest absolute displacement of any edge between two boxes.
    pub fn max_shift(&self, other: &BoundingBox) -> f32 {
        (self.x1 - other.x1)
            .abs()
            .max((self.y1 - other.y1).abs())
            .max((self.x2 - other.x2).abs())
            .max((self.y2 - other.y2).abs())
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

/// Opaque, cheaply clonable handle to an encoded camera frame.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameRef(Arc<[u8]>);

impl FrameRef {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FrameRef({} bytes)", self.0.len())
    }
}

/// A classification that survived the stability window.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionEvent {
    pub is_ev: bool,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub timestamp: Timestamp,
    pub frame: Option<FrameRef>,
}

// ---------------------------------------------------------------------------
// SensorEvent
// ---------------------------------------------------------------------------

/// Which producer an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Channel {
    Distance = 0,
    Vision = 1,
    Power = 2,
}

impl Channel {
    pub const COUNT: usize = 3;
    pub const ALL: [Channel; Self::COUNT] = [Self::Distance, Self::Vision, Self::Power];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Distance => "distance",
            Self::Vision => "vision",
            Self::Power => "power",
        }
    }
}

/// Unit of transport on the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Power(ElectricalSample),
    Distance(DistanceSample),
    Vision(VisionEvent),
}

impl SensorEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Power(s) => s.timestamp,
            Self::Distance(s) => s.timestamp,
            Self::Vision(v) => v.timestamp,
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            Self::Power(_) => Channel::Power,
            Self::Distance(_) => Channel::Distance,
            Self::Vision(_) => Channel::Vision,
        }
    }
}

// ---------------------------------------------------------------------------
// Bounded multi-producer / single-consumer queue
// ---------------------------------------------------------------------------

/// Fixed-capacity FIFO shared between threads.
///
/// Producers never block: when the queue is full the oldest entry is
/// evicted and counted.  The consumer blocks with a timeout so it can run
/// periodic checks and notice shutdown.
pub struct BoundedQueue<T, const N: usize> {
    name: &'static str,
    items: Mutex<Deque<T, N>>,
    ready: Condvar,
    dropped: AtomicU64,
}

/// The sensor event stream.
pub type EventBus = BoundedQueue<SensorEvent, EVENT_QUEUE_CAP>;

impl<T, const N: usize> BoundedQueue<T, N> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: Mutex::new(Deque::new()),
            ready: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an item.  Returns the evicted oldest item if the queue was full.
    pub fn push(&self, item: T) -> Option<T> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let evicted = if items.is_full() { items.pop_front() } else { None };
        if evicted.is_some() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("{}: queue full, dropped oldest entry ({} dropped so far)", self.name, total);
        }
        // Cannot fail: a slot was freed above if the deque was full.
        let _ = items.push_back(item);
        drop(items);
        self.ready.notify_one();
        evicted
    }

    /// Take the oldest item without waiting.
    pub fn try_recv(&self) -> Option<T> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(items, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            items = guard;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of entries evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
