//! Link supervisor and power channel against the scripted meter.

use std::io;
use std::time::Duration;

use evspot::error::LinkError;
use evspot::events::{Channel, EventBus, SensorEvent, Timestamp};
use evspot::adapters::gates::ChannelGates;
use evspot::app::ports::ChannelControl;
use evspot::meter::{LinkSupervisor, ProtocolVariant};
use evspot::sensors::PowerChannel;
use evspot::shutdown::Shutdown;

use crate::mock_hw::{ManualClock, MockConnector, MockMeter, Reply, meter_frame};

fn supervisor(meter: &MockMeter, clock: ManualClock) -> LinkSupervisor<MockConnector, ManualClock> {
    LinkSupervisor::new(
        meter.connector(),
        ProtocolVariant::Extended,
        clock,
        Duration::from_secs(1),
        Duration::from_millis(1),
    )
}

#[test]
fn energy_deltas_across_reconnect() {
    let meter = MockMeter::new(vec![
        Reply::Frame(meter_frame(1000, 1000)),
        Reply::Frame(meter_frame(1000, 1000)),
        Reply::Frame(meter_frame(1000, 1200)),
    ]);
    let mut link = supervisor(&meter, ManualClock::at_secs(10));
    link.connect().unwrap();

    let first = link.poll().unwrap();
    assert!(link.reconnect(&Shutdown::new()));
    let second = link.poll().unwrap();
    let third = link.poll().unwrap();

    assert_eq!(
        [first.energy_delta_wh, second.energy_delta_wh, third.energy_delta_wh],
        [0, 0, 200]
    );
    assert_eq!(first.timestamp, Timestamp::from_secs(10));
    assert_eq!(meter.opens(), 2);
    assert_eq!(meter.open_links(), 1);
}

#[test]
fn every_request_is_the_extended_query() {
    let meter = MockMeter::new(vec![]).idle_reply(Reply::Frame(meter_frame(0, 0)));
    let mut link = supervisor(&meter, ManualClock::default());
    link.connect().unwrap();
    for _ in 0..3 {
        link.poll().unwrap();
    }
    for request in meter.requests() {
        assert_eq!(request, ProtocolVariant::Extended.request().to_vec());
    }
}

#[test]
fn silent_meter_times_out() {
    let meter = MockMeter::new(vec![Reply::Silence]);
    let mut link = supervisor(&meter, ManualClock::default());
    link.connect().unwrap();
    assert_eq!(link.poll(), Err(LinkError::Timeout));
}

#[test]
fn io_failure_requires_reconnect() {
    let meter = MockMeter::new(vec![Reply::Fail(io::ErrorKind::BrokenPipe)]);
    let mut link = supervisor(&meter, ManualClock::default());
    link.connect().unwrap();
    let err = link.poll().unwrap_err();
    assert_eq!(err, LinkError::Io(io::ErrorKind::BrokenPipe));
    assert!(err.requires_reconnect());
}

#[test]
fn truncated_frame_is_non_fatal() {
    let mut short = meter_frame(500, 10);
    short.truncate(20);
    let meter = MockMeter::new(vec![Reply::Frame(short), Reply::Frame(meter_frame(500, 10))]);
    let mut link = supervisor(&meter, ManualClock::default());
    link.connect().unwrap();
    let err = link.poll().unwrap_err();
    assert!(matches!(err, LinkError::Decode(_)));
    assert!(!err.requires_reconnect());
    assert!((link.poll().unwrap().current_a - 0.5).abs() < 1e-9);
    assert_eq!(meter.opens(), 1);
}

#[test]
fn reconnect_survives_failed_opens() {
    let meter = MockMeter::new(vec![]);
    meter.fail_next_opens(3);
    let mut link = supervisor(&meter, ManualClock::default());
    assert!(link.connect().is_err());
    assert!(link.reconnect(&Shutdown::new()));
    assert!(link.is_connected());
    assert_eq!(meter.opens(), 1);
}

#[test]
fn power_channel_skips_garbled_frames_and_reconnects_on_io_error() {
    let mut garbled = meter_frame(200, 5);
    garbled[24] ^= 0x01;
    let meter = MockMeter::new(vec![
        Reply::Frame(garbled),
        Reply::Fail(io::ErrorKind::BrokenPipe),
        Reply::Frame(meter_frame(200, 5)),
    ]);
    let mut link = supervisor(&meter, ManualClock::default());
    link.connect().unwrap();
    let mut channel = PowerChannel::new(link, Duration::from_secs(5));
    let shutdown = Shutdown::new();

    assert!(channel.step(&shutdown).is_none());
    assert_eq!(channel.discarded(), 1);
    assert_eq!(meter.opens(), 1);

    assert!(channel.step(&shutdown).is_none());
    assert_eq!(meter.opens(), 2);

    let sample = channel.step(&shutdown).unwrap();
    assert!((sample.current_a - 0.2).abs() < 1e-9);
    assert_eq!(sample.energy_delta_wh, 0);
}

#[test]
fn power_channel_run_only_polls_when_armed_and_closes_link() {
    let meter = MockMeter::new(vec![]).idle_reply(Reply::Frame(meter_frame(3000, 1)));
    let mut link = supervisor(&meter, ManualClock::default());
    link.connect().unwrap();
    let channel = PowerChannel::new(link, Duration::from_secs(60));

    let bus = EventBus::new("events");
    let shutdown = Shutdown::new();
    shutdown.trigger();

    let gates = ChannelGates::new();
    let link = channel.run(&bus, &gates, &shutdown);
    assert!(bus.is_empty());
    assert!(meter.requests().is_empty());
    assert!(!link.is_connected());
    assert_eq!(meter.open_links(), 0);

    let mut link = link;
    link.connect().unwrap();
    let mut armed = gates.clone();
    armed.set_armed(Channel::Power, true);
    PowerChannel::new(link, Duration::from_secs(60)).run(&bus, &gates, &shutdown);
    assert!(matches!(bus.try_recv(), Some(SensorEvent::Power(s)) if s.current_a == 3.0));
    assert_eq!(meter.open_links(), 0);
}

#[test]
fn legacy_meter_answers_the_short_query() {
    let meter = MockMeter::new(vec![Reply::Frame(vec![0xA0, 0x08, 0xFD, 0x01, 0xF4, 0x04, 0xD2])]);
    let mut link = LinkSupervisor::new(
        meter.connector(),
        ProtocolVariant::Legacy,
        ManualClock::at_secs(3),
        Duration::from_secs(1),
        Duration::from_millis(1),
    );
    link.connect().unwrap();

    let sample = link.poll().unwrap();
    assert!((sample.voltage_v - 230.1).abs() < 1e-9);
    assert!((sample.current_a - 5.0).abs() < 1e-9);
    assert!((sample.power_w - 123.4).abs() < 1e-9);
    assert_eq!(sample.energy_delta_wh, 0);
    assert_eq!(
        meter.requests(),
        vec![vec![0xB0, 0xC0, 0xA8, 0x01, 0x01, 0x00, 0x01, 0x5A]]
    );
}
