//! Mock collaborators for integration tests.
//!
//! Every mock records what it was asked to do so tests can assert on the
//! full history without touching a serial port, camera or speaker.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use evspot::app::events::Alert;
use evspot::app::ports::{
    AlertSink, AudioPlayer, ChannelControl, Clock, Notifier, RangeFinder,
};
use evspot::error::{LinkError, NotifyError};
use evspot::events::{Channel, Timestamp};
use evspot::meter::frame;
use evspot::meter::transport::{Connector, Transport};

// ── Manual clock ──────────────────────────────────────────────

/// Clock advanced only by the test.  Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

#[allow(dead_code)]
impl ManualClock {
    pub fn at_secs(secs: u64) -> Self {
        let clock = Self::default();
        clock.set_secs(secs);
        clock
    }

    pub fn set_secs(&self, secs: u64) {
        self.0.store(secs * 1000, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.0.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.0.load(Ordering::SeqCst))
    }
}

// ── Range finder ──────────────────────────────────────────────

/// Returns scripted readings, then repeats the last one.
pub struct ScriptedRange {
    readings: VecDeque<Option<f64>>,
    last: Option<f64>,
}

#[allow(dead_code)]
impl ScriptedRange {
    pub fn new(readings: &[Option<f64>]) -> Self {
        Self {
            readings: readings.iter().copied().collect(),
            last: None,
        }
    }

    pub fn constant(cm: f64) -> Self {
        Self {
            readings: VecDeque::new(),
            last: Some(cm),
        }
    }
}

impl RangeFinder for ScriptedRange {
    fn read_once(&mut self) -> Option<f64> {
        if let Some(r) = self.readings.pop_front() {
            self.last = r;
            return r;
        }
        self.last
    }
}

// ── Power meter ───────────────────────────────────────────────

/// One scripted meter behaviour for a single request.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Reply {
    Frame(Vec<u8>),
    Silence,
    Fail(io::ErrorKind),
}

/// Extended-query response with the given current and energy counter.
pub fn meter_frame(current_ma: u16, energy_wh: u32) -> Vec<u8> {
    let mut f = [0u8; 25];
    f[0] = frame::DEVICE_ADDRESS;
    f[1] = frame::FN_READ_INPUT_REGISTERS;
    f[2] = 0x14;
    f[3..5].copy_from_slice(&2300u16.to_be_bytes());
    f[5..7].copy_from_slice(&current_ma.to_be_bytes());
    let power_dw = u32::from(current_ma) * 23 / 10;
    f[7..11].copy_from_slice(&power_dw.to_be_bytes());
    f[11..15].copy_from_slice(&energy_wh.to_be_bytes());
    f[15..17].copy_from_slice(&500u16.to_be_bytes());
    f[17..19].copy_from_slice(&1000u16.to_be_bytes());
    frame::seal(&mut f);
    f.to_vec()
}

#[derive(Default)]
struct MeterState {
    replies: VecDeque<Reply>,
    /// Reply used once the script runs out.
    idle: Option<Reply>,
    failed_opens_left: usize,
    opens: usize,
    requests: Vec<Vec<u8>>,
}

/// Shared handle to a scripted meter; hand out `connector()`s to the
/// code under test and inspect the history here.
#[derive(Clone, Default)]
pub struct MockMeter {
    state: Arc<Mutex<MeterState>>,
    open_links: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockMeter {
    pub fn new(replies: Vec<Reply>) -> Self {
        let meter = Self::default();
        meter.state.lock().unwrap().replies = replies.into();
        meter
    }

    pub fn idle_reply(self, reply: Reply) -> Self {
        self.state.lock().unwrap().idle = Some(reply);
        self
    }

    pub fn fail_next_opens(&self, n: usize) {
        self.state.lock().unwrap().failed_opens_left = n;
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            meter: self.clone(),
        }
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn open_links(&self) -> usize {
        self.open_links.load(Ordering::SeqCst)
    }
}

pub struct MockConnector {
    meter: MockMeter,
}

impl Connector for MockConnector {
    type Link = MockLink;

    fn open(&mut self) -> Result<MockLink, LinkError> {
        let mut state = self.meter.state.lock().unwrap();
        if state.failed_opens_left > 0 {
            state.failed_opens_left -= 1;
            return Err(LinkError::NoDevice);
        }
        state.opens += 1;
        self.meter.open_links.fetch_add(1, Ordering::SeqCst);
        Ok(MockLink {
            meter: self.meter.clone(),
            pending: Vec::new(),
        })
    }

    fn describe(&self) -> &str {
        "mock-meter"
    }
}

pub struct MockLink {
    meter: MockMeter,
    pending: Vec<u8>,
}

impl Transport for MockLink {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, io::Error> {
        let mut state = self.meter.state.lock().unwrap();
        state.requests.push(data.to_vec());
        let reply = state.replies.pop_front().or_else(|| state.idle.clone());
        match reply {
            Some(Reply::Frame(bytes)) => self.pending = bytes,
            Some(Reply::Fail(kind)) => return Err(io::Error::from(kind)),
            Some(Reply::Silence) | None => self.pending.clear(),
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), io::Error> {
        self.pending.clear();
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.meter.open_links.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Fusion outputs ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub alerts: Vec<Alert>,
}

impl AlertSink for RecordingSink {
    fn raise(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }
}

#[derive(Default)]
pub struct RecordingControl {
    pub calls: Vec<(Channel, bool)>,
}

#[allow(dead_code)]
impl RecordingControl {
    pub fn is_armed(&self, channel: Channel) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|(c, armed)| (*c == channel).then_some(*armed))
            .unwrap_or(false)
    }
}

impl ChannelControl for RecordingControl {
    fn set_armed(&mut self, channel: Channel, armed: bool) {
        self.calls.push((channel, armed));
    }
}

// ── Notification gateway ──────────────────────────────────────

#[derive(Default)]
pub struct RecordingGateway {
    pub messages: Mutex<Vec<(String, bool)>>,
    pub clips: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingGateway {
    pub fn messages(&self) -> Vec<(String, bool)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn clips(&self) -> Vec<String> {
        self.clips.lock().unwrap().clone()
    }
}

impl Notifier for RecordingGateway {
    fn notify(&self, message: &str, image: Option<&[u8]>) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_owned(), image.is_some()));
        Ok(())
    }
}

impl AudioPlayer for RecordingGateway {
    fn play(&self, clip: &str) -> Result<(), NotifyError> {
        self.clips.lock().unwrap().push(clip.to_owned());
        Ok(())
    }
}
