//! Bounded notification worker pool.
//!
//! ```text
//!   FusionEngine ──raise()──▶ AlertQueue ──▶ [ worker 0 ]──▶ Notifier + AudioPlayer
//!                             (cap 8, drop  [ worker 1 ]
//!                              oldest)      [   ...    ]
//! ```
//!
//! The engine only enqueues alert intents and never waits on delivery.
//! Delivery is best effort: failures are logged and not retried.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::app::events::Alert;
use crate::app::ports::{AlertSink, AudioPlayer, Notifier};
use crate::events::{BoundedQueue, FrameRef};
use crate::shutdown::Shutdown;

/// Pending alert intents.  Alerts are rare, so overflow means the
/// gateway is hanging.
pub const ALERT_QUEUE_CAP: usize = 8;

const WORKER_POLL: Duration = Duration::from_millis(100);

type Queue = BoundedQueue<Alert, ALERT_QUEUE_CAP>;

/// Producer handle given to the fusion engine.
#[derive(Clone)]
pub struct AlertQueue {
    queue: Arc<Queue>,
}

impl AlertSink for AlertQueue {
    fn raise(&mut self, alert: Alert) {
        if let Some(evicted) = self.queue.push(alert) {
            warn!(
                "DISPATCH: alert {} from {} ms never delivered",
                evicted.kind.name(),
                evicted.raised_at.as_millis()
            );
        }
    }
}

pub struct AlertDispatcher {
    queue: Arc<Queue>,
    stop: Shutdown,
    workers: Vec<JoinHandle<()>>,
    delivered: Arc<AtomicU64>,
}

impl AlertDispatcher {
    /// Spawn `workers` delivery threads.
    pub fn start<N, A>(workers: usize, notifier: Arc<N>, audio: Arc<A>) -> anyhow::Result<Self>
    where
        N: Notifier + 'static,
        A: AudioPlayer + 'static,
    {
        let queue: Arc<Queue> = Arc::new(BoundedQueue::new("alerts"));
        let stop = Shutdown::new();
        let delivered = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::with_capacity(workers);

        for i in 0..workers.max(1) {
            let queue = Arc::clone(&queue);
            let done = stop.clone();
            let notifier = Arc::clone(&notifier);
            let audio = Arc::clone(&audio);
            let delivered = Arc::clone(&delivered);
            let handle = std::thread::Builder::new()
                .name(format!("alert-{i}"))
                .spawn(move || {
                    loop {
                        match queue.recv_timeout(WORKER_POLL) {
                            Some(alert) => {
                                deliver(&alert, notifier.as_ref(), audio.as_ref());
                                delivered.fetch_add(1, Ordering::Relaxed);
                            }
                            None if done.is_triggered() => break,
                            None => {}
                        }
                    }
                })
                .map_err(|e| {
                    stop.trigger();
                    anyhow::Error::new(e).context(format!("spawning alert worker {i}"))
                })?;
            handles.push(handle);
        }
        info!("DISPATCH: {} worker(s) ready", handles.len());

        Ok(Self {
            queue,
            stop,
            workers: handles,
            delivered,
        })
    }

    pub fn sink(&self) -> AlertQueue {
        AlertQueue {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Deliver what is queued, then stop the workers.
    /// Returns the number of alerts delivered over the dispatcher's life.
    pub fn shutdown(self) -> u64 {
        self.stop.trigger();
        for handle in self.workers {
            if handle.join().is_err() {
                warn!("DISPATCH: worker panicked");
            }
        }
        let delivered = self.delivered.load(Ordering::Relaxed);
        info!("DISPATCH: stopped after {delivered} alert(s)");
        delivered
    }
}

fn deliver<N: Notifier + ?Sized, A: AudioPlayer + ?Sized>(alert: &Alert, notifier: &N, audio: &A) {
    let image = alert.image.as_ref().map(FrameRef::bytes);
    if let Err(e) = notifier.notify(&alert.message, image) {
        warn!("DISPATCH: {} notification failed: {e}", alert.kind.name());
    }
    for clip in alert.kind.clips() {
        if let Err(e) = audio.play(clip) {
            warn!("DISPATCH: {e}");
        }
    }
}
