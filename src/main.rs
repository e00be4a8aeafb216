//! EvSpot bench runner.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SerialConnector   SimScene (range / camera / classifier)      │
//! │  LogNotifier       LogAudio        MonotonicClock   StdDelay   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  SpotMonitor: channels · FusionEngine · dispatcher     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `evspot [config.json]`, then type `park ev`, `park car` or
//! `leave` on stdin.  Ctrl-C stops the monitor gracefully.
#![deny(unused_must_use)]

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use evspot::adapters::log_sink::{LogAudio, LogNotifier};
use evspot::adapters::serial::SerialConnector;
use evspot::adapters::sim::{SimCamera, SimClassifier, SimRangeFinder, SimScene, Vehicle};
use evspot::adapters::time::{MonotonicClock, StdDelay};
use evspot::app::runtime::SpotMonitor;
use evspot::config::SpotConfig;
use evspot::meter::LinkSupervisor;
use evspot::sensors::{DistanceChannel, PowerChannel, VisionChannel};
use evspot::shutdown::Shutdown;

// ── Bench console ─────────────────────────────────────────────

fn spawn_console(scene: SimScene, shutdown: Shutdown) -> Result<()> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "park ev" => scene.park(Vehicle::Ev),
                    "park car" => scene.park(Vehicle::Car),
                    "leave" => scene.leave(),
                    "quit" => {
                        shutdown.trigger();
                        break;
                    }
                    "" => {}
                    other => warn!("CONSOLE: unknown command '{other}' (park ev | park car | leave | quit)"),
                }
            }
        })
        .context("spawning console thread")?;
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    info!("╔══════════════════════════════════════╗");
    info!("║  EvSpot v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration (fatal on error) ─────────────────────
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => SpotConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            info!("No config file given, using defaults");
            SpotConfig::default()
        }
    };

    // ── 3. Power meter (unroutable device path is fatal) ──────
    let clock = MonotonicClock::new();
    let mut link = LinkSupervisor::new(
        SerialConnector::new(config.serial_device.clone(), config.response_timeout()),
        config.meter_variant,
        clock,
        config.response_timeout(),
        config.reconnect_backoff(),
    );
    link.connect()
        .with_context(|| format!("opening power meter on {}", config.serial_device))?;

    // ── 4. Simulated spot for distance / vision ───────────────
    let scene = SimScene::new();
    let distance = DistanceChannel::new(
        SimRangeFinder::new(scene.clone()),
        StdDelay,
        clock,
        config.distance_averaging_n,
        config.distance_sample_spacing_ms,
    );
    let vehicle_class = config.vehicle_class_ids.first().copied().unwrap_or_default();
    let ev_class = config.ev_class_ids.first().copied().unwrap_or_default();
    let vision = VisionChannel::new(
        SimCamera::new(scene.clone()),
        SimClassifier::new(scene.clone(), vehicle_class, ev_class),
        clock,
        config.clone(),
    );
    let power = PowerChannel::new(link, config.power_poll_interval());

    // ── 5. Run ────────────────────────────────────────────────
    let monitor = SpotMonitor::start(
        &config,
        distance,
        vision,
        power,
        clock,
        Arc::new(LogNotifier),
        Arc::new(LogAudio),
    )?;

    let shutdown = monitor.shutdown_handle();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger()).context("installing Ctrl-C handler")?;
    }
    spawn_console(scene, shutdown.clone())?;

    while !shutdown.wait(Duration::from_secs(60)) {
        info!("RUNTIME: up {} s", clock.uptime_secs());
    }

    let report = monitor.stop()?;
    info!(
        "Shutdown complete: state={:?} events={} rejected={} dropped={} alerts={}",
        report.final_state,
        report.accepted_events,
        report.rejected_events,
        report.dropped_events,
        report.alerts_delivered
    );
    Ok(())
}
