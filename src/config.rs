//! System configuration parameters
//!
//! All tunable parameters for the charging-spot monitor.  Loaded once at
//! startup from an optional JSON file; any key the file omits keeps its
//! default.

use core::time::Duration;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::meter::frame::ProtocolVariant;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotConfig {
    // --- Presence ---
    /// Averaged distance at or below which the spot counts as occupied (cm)
    pub presence_threshold_cm: f64,
    /// Rated sensor range; longer readings count as this distance (cm)
    pub max_distance_cm: f64,
    /// Point readings averaged into one distance sample
    pub distance_averaging_n: usize,
    /// Delay between point readings (milliseconds)
    pub distance_sample_spacing_ms: u32,
    /// Distance sample cadence (milliseconds)
    pub distance_interval_ms: u64,

    // --- Vision ---
    /// A detection must hold still this long before it is confirmed (seconds)
    pub detection_stability_s: u64,
    /// Largest bounding-box edge movement still counted as "still" (pixels)
    pub bbox_tolerance_px: f32,
    /// Detections below this confidence are ignored
    pub min_confidence: f32,
    /// Model class ids that denote a generic (non-EV) vehicle
    pub vehicle_class_ids: Vec<u32>,
    /// Model class ids that denote an electric vehicle
    pub ev_class_ids: Vec<u32>,
    /// Frame cadence (milliseconds)
    pub frame_interval_ms: u64,
    /// Wait before reopening a failed camera (seconds)
    pub camera_retry_s: u64,

    // --- Power ---
    /// Current above which the EV counts as charging (A)
    #[serde(rename = "charge_current_threshold_A")]
    pub charge_current_threshold_a: f64,
    /// How long an EV may sit without charging before an alert (seconds)
    pub charging_timeout_s: u64,
    /// Serial device of the power meter
    pub serial_device: String,
    /// Which query the meter answers
    pub meter_variant: ProtocolVariant,
    /// Serial response timeout (milliseconds)
    pub response_timeout_ms: u64,
    /// Meter poll cadence (seconds)
    pub power_poll_interval_s: u64,
    /// Fixed wait between reconnect attempts (seconds)
    pub reconnect_backoff_s: u64,

    // --- Supervision ---
    /// Warn when a channel stays silent this long (seconds)
    pub channel_silence_s: u64,
    /// Fusion consumer receive timeout (milliseconds)
    pub consumer_poll_ms: u64,
    /// Notification worker threads
    pub alert_workers: usize,
}

impl Default for SpotConfig {
    fn default() -> Self {
        Self {
            // Presence
            presence_threshold_cm: 150.0,
            max_distance_cm: 450.0, // HC-SR04 rated range
            distance_averaging_n: 5,
            distance_sample_spacing_ms: 100,
            distance_interval_ms: 1000,

            // Vision
            detection_stability_s: 5,
            bbox_tolerance_px: 15.0,
            min_confidence: 0.5,
            vehicle_class_ids: vec![2],
            ev_class_ids: vec![80],
            frame_interval_ms: 100, // 10 fps
            camera_retry_s: 5,

            // Power
            charge_current_threshold_a: 0.1,
            charging_timeout_s: 600, // 10 min
            serial_device: "/dev/ttyUSB0".to_owned(),
            meter_variant: ProtocolVariant::Extended,
            response_timeout_ms: 1000,
            power_poll_interval_s: 5,
            reconnect_backoff_s: 5,

            // Supervision
            channel_silence_s: 120,
            consumer_poll_ms: 500,
            alert_workers: 2,
        }
    }
}

impl SpotConfig {
    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.kind()))?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the state machine meaningless.
    /// Values are not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.presence_threshold_cm.is_finite() && self.presence_threshold_cm > 0.0) {
            return Err(ConfigError::Invalid("presence_threshold_cm"));
        }
        if !(self.max_distance_cm.is_finite() && self.max_distance_cm > self.presence_threshold_cm)
        {
            return Err(ConfigError::Invalid("max_distance_cm"));
        }
        if self.distance_averaging_n == 0 {
            return Err(ConfigError::Invalid("distance_averaging_n"));
        }
        if self.distance_interval_ms == 0 {
            return Err(ConfigError::Invalid("distance_interval_ms"));
        }
        if !(self.bbox_tolerance_px.is_finite() && self.bbox_tolerance_px >= 0.0) {
            return Err(ConfigError::Invalid("bbox_tolerance_px"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid("min_confidence"));
        }
        if self.ev_class_ids.is_empty() {
            return Err(ConfigError::Invalid("ev_class_ids"));
        }
        if self.ev_class_ids.iter().any(|id| self.vehicle_class_ids.contains(id)) {
            return Err(ConfigError::Invalid("vehicle_class_ids"));
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid("frame_interval_ms"));
        }
        if !(self.charge_current_threshold_a.is_finite() && self.charge_current_threshold_a >= 0.0)
        {
            return Err(ConfigError::Invalid("charge_current_threshold_A"));
        }
        if self.charging_timeout_s == 0 {
            return Err(ConfigError::Invalid("charging_timeout_s"));
        }
        if self.serial_device.trim().is_empty() {
            return Err(ConfigError::Invalid("serial_device"));
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid("response_timeout_ms"));
        }
        if self.power_poll_interval_s == 0 {
            return Err(ConfigError::Invalid("power_poll_interval_s"));
        }
        if self.consumer_poll_ms == 0 {
            return Err(ConfigError::Invalid("consumer_poll_ms"));
        }
        if self.alert_workers == 0 {
            return Err(ConfigError::Invalid("alert_workers"));
        }
        Ok(())
    }

    pub fn charging_timeout(&self) -> Duration {
        Duration::from_secs(self.charging_timeout_s)
    }

    pub fn detection_stability(&self) -> Duration {
        Duration::from_secs(self.detection_stability_s)
    }

    pub fn distance_interval(&self) -> Duration {
        Duration::from_millis(self.distance_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn camera_retry(&self) -> Duration {
        Duration::from_secs(self.camera_retry_s)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn power_poll_interval(&self) -> Duration {
        Duration::from_secs(self.power_poll_interval_s)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_s)
    }

    pub fn channel_silence(&self) -> Duration {
        Duration::from_secs(self.channel_silence_s)
    }

    pub fn consumer_poll(&self) -> Duration {
        Duration::from_millis(self.consumer_poll_ms)
    }
}
