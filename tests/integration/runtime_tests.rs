//! Threaded runtime: real channel threads over simulated collaborators
//! and the scripted meter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use evspot::adapters::sim::{SimCamera, SimClassifier, SimRangeFinder, SimScene, Vehicle};
use evspot::adapters::time::{MonotonicClock, StdDelay};
use evspot::app::runtime::SpotMonitor;
use evspot::config::SpotConfig;
use evspot::events::Channel;
use evspot::fsm::StateId;
use evspot::meter::{LinkSupervisor, ProtocolVariant};
use evspot::sensors::{DistanceChannel, PowerChannel, VisionChannel};

use crate::mock_hw::{MockMeter, RecordingGateway, Reply, meter_frame};

fn fast_config() -> SpotConfig {
    SpotConfig {
        distance_averaging_n: 2,
        distance_sample_spacing_ms: 1,
        distance_interval_ms: 20,
        detection_stability_s: 0,
        frame_interval_ms: 10,
        power_poll_interval_s: 1,
        reconnect_backoff_s: 60,
        consumer_poll_ms: 20,
        ..SpotConfig::default()
    }
}

fn start(
    config: &SpotConfig,
    scene: &SimScene,
    meter: &MockMeter,
    gateway: &Arc<RecordingGateway>,
    connect: bool,
) -> SpotMonitor {
    let clock = MonotonicClock::new();
    let mut link = LinkSupervisor::new(
        meter.connector(),
        ProtocolVariant::Extended,
        clock,
        config.response_timeout(),
        config.reconnect_backoff(),
    );
    if connect {
        link.connect().unwrap();
    }
    SpotMonitor::start(
        config,
        DistanceChannel::new(
            SimRangeFinder::new(scene.clone()),
            StdDelay,
            clock,
            config.distance_averaging_n,
            config.distance_sample_spacing_ms,
        ),
        VisionChannel::new(
            SimCamera::new(scene.clone()),
            SimClassifier::new(scene.clone(), 2, 80),
            clock,
            config.clone(),
        ),
        PowerChannel::new(link, config.power_poll_interval()),
        clock,
        Arc::clone(gateway),
        Arc::clone(gateway),
    )
    .unwrap()
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

#[test]
fn parked_car_raises_one_notification() {
    let config = fast_config();
    let scene = SimScene::new();
    let meter = MockMeter::new(vec![]).idle_reply(Reply::Frame(meter_frame(0, 0)));
    let gateway = Arc::new(RecordingGateway::default());

    scene.park(Vehicle::Car);
    let monitor = start(&config, &scene, &meter, &gateway, true);

    assert!(wait_until(Duration::from_secs(5), || !gateway.messages().is_empty()));
    // Let the vision channel re-confirm a few more times.
    std::thread::sleep(Duration::from_millis(200));

    let report = monitor.stop().unwrap();
    assert_eq!(report.final_state, StateId::NonEv);
    assert_eq!(report.alerts_delivered, 1);

    let messages = gateway.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1, "notification carries the confirming frame");
    assert_eq!(gateway.clips(), vec!["alert".to_owned(), "warning".to_owned()]);
    assert!(meter.requests().is_empty(), "power stays disarmed for a non-EV");
    assert_eq!(meter.open_links(), 0);
}

#[test]
fn parked_ev_arms_power_channel() {
    let config = fast_config();
    let scene = SimScene::new();
    let meter = MockMeter::new(vec![]).idle_reply(Reply::Frame(meter_frame(16_000, 100)));
    let gateway = Arc::new(RecordingGateway::default());

    let monitor = start(&config, &scene, &meter, &gateway, true);
    assert!(!monitor.gates().is_armed(Channel::Vision));
    scene.park(Vehicle::Ev);

    assert!(wait_until(Duration::from_secs(5), || monitor.gates().is_armed(Channel::Power)));
    assert!(wait_until(Duration::from_secs(5), || !meter.requests().is_empty()));

    scene.leave();
    assert!(wait_until(Duration::from_secs(5), || !monitor.gates().is_armed(Channel::Power)));

    let report = monitor.stop().unwrap();
    assert_eq!(report.final_state, StateId::Empty);
    assert_eq!(report.alerts_delivered, 0);
    assert!(gateway.messages().is_empty());
    assert_eq!(meter.open_links(), 0);
}

#[test]
fn stop_interrupts_reconnect_backoff() {
    let config = fast_config();
    let scene = SimScene::new();
    let meter = MockMeter::new(vec![]);
    meter.fail_next_opens(usize::MAX);
    let gateway = Arc::new(RecordingGateway::default());

    scene.park(Vehicle::Ev);
    let monitor = start(&config, &scene, &meter, &gateway, false);
    assert!(wait_until(Duration::from_secs(5), || monitor.gates().is_armed(Channel::Power)));
    // Give the power thread time to enter its 60 s backoff.
    std::thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let report = monitor.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.final_state, StateId::ChargingActive);
    assert_eq!(meter.opens(), 0);
}
