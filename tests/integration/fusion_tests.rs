//! End-to-end fusion scenarios: channels feeding the engine through the
//! event bus, with recording sinks on the output side.

use evspot::adapters::sim::{SimCamera, SimClassifier, SimScene, Vehicle};
use evspot::app::events::AlertKind;
use evspot::config::SpotConfig;
use evspot::events::{
    BoundingBox, Channel, DistanceSample, ElectricalSample, EventBus, SensorEvent, Timestamp,
    VisionEvent,
};
use evspot::fsm::{FusionEngine, StateId};
use evspot::sensors::{DistanceChannel, VisionChannel};

use crate::mock_hw::{ManualClock, RecordingControl, RecordingSink, ScriptedRange};

struct Harness {
    engine: FusionEngine,
    sink: RecordingSink,
    control: RecordingControl,
}

impl Harness {
    fn new(config: SpotConfig) -> Self {
        let mut h = Self {
            engine: FusionEngine::new(config),
            sink: RecordingSink::default(),
            control: RecordingControl::default(),
        };
        h.engine.start(Timestamp::ZERO, &mut h.control);
        h
    }

    fn feed(&mut self, event: SensorEvent) -> StateId {
        self.engine.handle(event, &mut self.sink, &mut self.control)
    }

    fn drain(&mut self, bus: &EventBus) {
        while let Some(event) = bus.try_recv() {
            self.feed(event);
        }
    }

    fn alerts(&self, kind: AlertKind) -> usize {
        self.sink.alerts.iter().filter(|a| a.kind == kind).count()
    }
}

fn distance(cm: f64, secs: u64) -> SensorEvent {
    SensorEvent::Distance(DistanceSample {
        distance_cm: cm,
        timestamp: Timestamp::from_secs(secs),
    })
}

fn vision(is_ev: bool, secs: u64) -> SensorEvent {
    SensorEvent::Vision(VisionEvent {
        is_ev,
        confidence: 0.85,
        bbox: BoundingBox::new(100.0, 100.0, 400.0, 300.0),
        timestamp: Timestamp::from_secs(secs),
        frame: None,
    })
}

fn current(amps: f64, secs: u64) -> SensorEvent {
    SensorEvent::Power(ElectricalSample {
        voltage_v: 229.8,
        current_a: amps,
        power_w: 229.8 * amps,
        energy_wh: 0,
        energy_delta_wh: 0,
        frequency_hz: 50.0,
        power_factor: 0.99,
        alarm: false,
        timestamp: Timestamp::from_secs(secs),
    })
}

#[test]
fn non_ev_yields_exactly_one_alert() {
    let mut h = Harness::new(SpotConfig::default());
    h.feed(distance(10.0, 0));
    h.feed(vision(false, 5));
    h.feed(vision(false, 10));
    h.feed(distance(12.0, 11));
    h.feed(vision(false, 15));
    assert_eq!(h.alerts(AlertKind::NonEvDetected), 1);
    assert_eq!(h.engine.current_state(), StateId::NonEv);
}

#[test]
fn flapping_classifier_alerts_once_per_visit() {
    let mut h = Harness::new(SpotConfig::default());
    h.feed(distance(10.0, 1));
    let mut t = 1;
    for _ in 0..6 {
        t += 5;
        h.feed(vision(false, t));
        t += 5;
        h.feed(vision(true, t));
    }
    assert_eq!(h.alerts(AlertKind::NonEvDetected), 1);

    // A new visit opens a new episode.
    h.feed(distance(500.0, t + 1));
    h.feed(distance(10.0, t + 2));
    h.feed(vision(false, t + 7));
    assert_eq!(h.alerts(AlertKind::NonEvDetected), 2);
}

#[test]
fn long_bay_reading_ends_the_visit() {
    let mut h = Harness::new(SpotConfig::default());
    h.feed(distance(10.0, 0));
    h.feed(vision(false, 5));
    assert_eq!(h.feed(distance(620.0, 10)), StateId::Empty);
    assert_eq!(h.engine.rejected_events(), 0);
}

#[test]
fn ev_stall_alerts_once_and_rearms_after_charging() {
    let config = SpotConfig::default();
    let timeout = config.charging_timeout_s;
    let mut h = Harness::new(config);

    h.feed(distance(10.0, 0));
    h.feed(vision(true, 5));
    assert!(h.control.is_armed(Channel::Power));

    let mut t = 5;
    while t <= 5 + timeout + 60 {
        t += 5;
        h.feed(current(0.2, t));
    }
    assert_eq!(h.alerts(AlertKind::EvNotCharging), 0);

    let stall_from = t;
    while t <= stall_from + timeout * 2 {
        t += 5;
        h.feed(current(0.01, t));
    }
    assert_eq!(h.alerts(AlertKind::EvNotCharging), 1);

    t += 5;
    assert_eq!(h.feed(current(5.0, t)), StateId::ChargingActive);

    let stall_from = t;
    while t <= stall_from + timeout + 5 {
        t += 5;
        h.feed(current(0.01, t));
    }
    assert_eq!(h.alerts(AlertKind::EvNotCharging), 2);
}

#[test]
fn silent_vision_keeps_last_classification_until_departure() {
    let mut h = Harness::new(SpotConfig::default());
    h.feed(distance(10.0, 0));
    h.feed(vision(false, 5));
    for s in (10..2000).step_by(10) {
        h.feed(distance(10.0, s));
    }
    let silent = h.engine.check_liveness(Timestamp::from_secs(2000));
    assert_eq!(silent, vec![Channel::Vision]);
    assert_eq!(h.engine.current_state(), StateId::NonEv);
    assert_eq!(h.feed(distance(300.0, 2010)), StateId::Empty);
    assert!(!h.control.is_armed(Channel::Vision));
}

#[test]
fn out_of_order_channel_interleaving_is_tolerated() {
    let mut h = Harness::new(SpotConfig::default());
    h.feed(distance(10.0, 100));
    // Vision event stamped before the distance event that occupied the spot.
    h.feed(vision(true, 99));
    assert_eq!(h.engine.current_state(), StateId::ChargingActive);
    h.feed(current(0.0, 98));
    assert_eq!(h.engine.current_state(), StateId::ChargingActive);
}

#[test]
fn channels_through_bus_into_engine() {
    let clock = ManualClock::at_secs(0);
    let config = SpotConfig::default();
    let bus = EventBus::new("events");
    let mut h = Harness::new(config.clone());

    let mut range = DistanceChannel::new(
        ScriptedRange::constant(60.0),
        NoDelay,
        clock.clone(),
        config.distance_averaging_n,
        config.distance_sample_spacing_ms,
    );
    let scene = SimScene::new();
    scene.park(Vehicle::Car);
    let mut camera = VisionChannel::new(
        SimCamera::new(scene.clone()),
        SimClassifier::new(scene.clone(), 2, 80),
        clock.clone(),
        config.clone(),
    );

    bus.push(SensorEvent::Distance(range.sample().unwrap()));
    h.drain(&bus);
    assert_eq!(h.engine.current_state(), StateId::Unclassified);
    assert!(h.control.is_armed(Channel::Vision));

    for _ in 0..=config.detection_stability_s {
        if let Some(event) = camera.step().unwrap() {
            bus.push(SensorEvent::Vision(event));
        }
        clock.advance_secs(1);
    }
    h.drain(&bus);
    assert_eq!(h.engine.current_state(), StateId::NonEv);
    assert_eq!(h.sink.alerts.len(), 1);
    assert!(h.sink.alerts[0].image.is_some());
}

#[test]
fn bus_overflow_keeps_newest_events() {
    let bus = EventBus::new("events");
    for s in 0..40 {
        bus.push(distance(300.0, s));
    }
    assert_eq!(bus.dropped(), 8);
    assert_eq!(bus.try_recv().map(|e| e.timestamp()), Some(Timestamp::from_secs(8)));
}

struct NoDelay;

impl embedded_hal::delay::DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
