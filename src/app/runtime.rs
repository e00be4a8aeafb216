//! Threaded runtime: one thread per channel, one fusion consumer, and the
//! notification worker pool.
//!
//! ```text
//!  ┌──────────┐
//!  │ distance │──┐
//!  ├──────────┤  │   ┌──────────┐   ┌────────┐   ┌─────────────────┐
//!  │ vision   │──┼──▶│ EventBus │──▶│ fusion │──▶│ AlertDispatcher │
//!  ├──────────┤  │   └──────────┘   └───┬────┘   └─────────────────┘
//!  │ power    │──┘                      │
//!  └────▲─────┘         ChannelGates ◀──┘ (arm / disarm)
//!       └────────────────────┘
//! ```
//!
//! Stop order: signal shutdown, join producers (each releases its device
//! on the way out), let the consumer drain the bus, then drain and join
//! the dispatcher.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, anyhow};
use embedded_hal::delay::DelayNs;
use log::{error, info};

use super::ports::{AudioPlayer, Camera, Classifier, Clock, Notifier, RangeFinder};
use crate::adapters::dispatch::AlertDispatcher;
use crate::adapters::gates::ChannelGates;
use crate::config::SpotConfig;
use crate::events::{BoundedQueue, EventBus};
use crate::fsm::{FusionEngine, StateId};
use crate::meter::transport::Connector;
use crate::sensors::{DistanceChannel, PowerChannel, VisionChannel};
use crate::shutdown::Shutdown;

/// What the monitor did over its lifetime, returned by [`SpotMonitor::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorReport {
    pub final_state: StateId,
    pub accepted_events: u64,
    pub rejected_events: u64,
    /// Events evicted from the full bus.
    pub dropped_events: u64,
    pub alerts_delivered: u64,
}

type Producer = Box<dyn FnOnce() + Send>;

pub struct SpotMonitor {
    shutdown: Shutdown,
    drain: Shutdown,
    bus: Arc<EventBus>,
    gates: ChannelGates,
    producers: Vec<(&'static str, JoinHandle<()>)>,
    consumer: JoinHandle<FusionEngine>,
    dispatcher: AlertDispatcher,
}

impl SpotMonitor {
    /// Spawn every thread and start monitoring.
    #[allow(clippy::too_many_arguments)]
    pub fn start<R, D, Cam, Cls, K, C, N, A>(
        config: &SpotConfig,
        distance: DistanceChannel<R, D, C>,
        vision: VisionChannel<Cam, Cls, C>,
        power: PowerChannel<K, C>,
        clock: C,
        notifier: Arc<N>,
        audio: Arc<A>,
    ) -> anyhow::Result<Self>
    where
        R: RangeFinder + Send + 'static,
        D: DelayNs + Send + 'static,
        Cam: Camera + Send + 'static,
        Cls: Classifier + Send + 'static,
        K: Connector + Send + 'static,
        K::Link: Send + 'static,
        C: Clock + Send + 'static,
        N: Notifier + 'static,
        A: AudioPlayer + 'static,
    {
        let monitor = Self::with_consumer(config, clock, notifier, audio)?;

        let interval = config.distance_interval();
        let (b, s) = (Arc::clone(&monitor.bus), monitor.shutdown.clone());
        let distance: Producer = Box::new(move || distance.run(&b, &s, interval));

        let (b, g, s) = (Arc::clone(&monitor.bus), monitor.gates.clone(), monitor.shutdown.clone());
        let vision: Producer = Box::new(move || vision.run(&b, &g, &s));

        let (b, g, s) = (Arc::clone(&monitor.bus), monitor.gates.clone(), monitor.shutdown.clone());
        let power: Producer = Box::new(move || {
            power.run(&b, &g, &s);
        });

        let monitor = monitor.launch(
            vec![("distance", distance), ("vision", vision), ("power", power)],
            |name, body| spawn(name, body),
        )?;
        info!("RUNTIME: monitoring started");
        Ok(monitor)
    }

    /// Start the dispatcher and the fusion consumer, with no producers yet.
    fn with_consumer<C, N, A>(
        config: &SpotConfig,
        clock: C,
        notifier: Arc<N>,
        audio: Arc<A>,
    ) -> anyhow::Result<Self>
    where
        C: Clock + Send + 'static,
        N: Notifier + 'static,
        A: AudioPlayer + 'static,
    {
        let shutdown = Shutdown::new();
        let drain = Shutdown::new();
        let bus: Arc<EventBus> = Arc::new(BoundedQueue::new("events"));
        let gates = ChannelGates::new();

        let dispatcher = AlertDispatcher::start(config.alert_workers, notifier, audio)
            .context("starting alert dispatcher")?;

        // Consumer first so the initial arming is in place before any
        // producer looks at its gate.
        let fusion = {
            let bus = Arc::clone(&bus);
            let drain = drain.clone();
            let mut sink = dispatcher.sink();
            let mut control = gates.clone();
            let config = config.clone();
            move || {
                let poll = config.consumer_poll();
                let mut engine = FusionEngine::new(config);
                engine.start(clock.now(), &mut control);
                loop {
                    if drain.is_triggered() && bus.is_empty() {
                        break;
                    }
                    match bus.recv_timeout(poll) {
                        Some(event) => {
                            engine.handle(event, &mut sink, &mut control);
                        }
                        None => {
                            engine.check_liveness(clock.now());
                        }
                    }
                }
                info!("FUSION: consumer stopped in {}", engine.state_name());
                engine
            }
        };
        let consumer = match spawn("fusion", fusion) {
            Ok(handle) => handle,
            Err(e) => {
                dispatcher.shutdown();
                return Err(anyhow::Error::new(e).context("spawning fusion thread"));
            }
        };

        Ok(Self {
            shutdown,
            drain,
            bus,
            gates,
            producers: Vec::with_capacity(3),
            consumer,
            dispatcher,
        })
    }

    /// Spawn each producer in turn.  If one cannot be spawned, everything
    /// already running is stopped in order before the error is returned.
    fn launch<S>(mut self, producers: Vec<(&'static str, Producer)>, mut spawner: S) -> anyhow::Result<Self>
    where
        S: FnMut(&'static str, Producer) -> io::Result<JoinHandle<()>>,
    {
        for (name, body) in producers {
            match spawner(name, body) {
                Ok(handle) => self.producers.push((name, handle)),
                Err(e) => {
                    error!("RUNTIME: cannot spawn {name} thread, stopping: {e}");
                    if let Err(stop) = self.stop() {
                        error!("RUNTIME: {stop:#}");
                    }
                    return Err(anyhow::Error::new(e).context(format!("spawning {name} thread")));
                }
            }
        }
        Ok(self)
    }

    /// Token that stops every producer loop when triggered (e.g. from a
    /// Ctrl-C handler).  Call [`stop`](Self::stop) afterwards to join.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn gates(&self) -> &ChannelGates {
        &self.gates
    }

    pub fn dropped_events(&self) -> u64 {
        self.bus.dropped()
    }

    /// Stop in order and join every thread.
    pub fn stop(self) -> anyhow::Result<MonitorReport> {
        info!("RUNTIME: stopping");
        self.shutdown.trigger();

        let mut panicked = Vec::new();
        for (name, handle) in self.producers {
            if handle.join().is_err() {
                error!("RUNTIME: {name} thread panicked");
                panicked.push(name);
            }
        }

        self.drain.trigger();
        let engine = self.consumer.join();
        let alerts_delivered = self.dispatcher.shutdown();
        let engine = engine.map_err(|_| anyhow!("fusion thread panicked"))?;
        if !panicked.is_empty() {
            return Err(anyhow!("channel thread(s) panicked: {}", panicked.join(", ")));
        }

        let report = MonitorReport {
            final_state: engine.current_state(),
            accepted_events: engine.accepted_events(),
            rejected_events: engine.rejected_events(),
            dropped_events: self.bus.dropped(),
            alerts_delivered,
        };
        info!("RUNTIME: stopped {report:?}");
        Ok(report)
    }
}

fn spawn<T, F>(name: &'static str, body: F) -> io::Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new().name(name.to_owned()).spawn(body)
}
