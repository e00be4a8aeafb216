//! In-memory simulated parking spot.
//!
//! Drives the distance, camera and classifier ports from one shared
//! scene so the bench binary (and tests) can park and remove vehicles
//! without hardware.
//!
//! ```text
//!   SimScene ──▶ SimRangeFinder  (80 cm occupied / 400 cm empty)
//!      │    ──▶ SimCamera       (placeholder JPEG bytes)
//!      └──── ──▶ SimClassifier   (one detection for the parked vehicle)
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use log::info;

use crate::app::ports::{Camera, Classifier, Detection, RangeFinder};
use crate::error::SensorError;
use crate::events::{BoundingBox, FrameRef};

pub const OCCUPIED_CM: f64 = 80.0;
pub const EMPTY_CM: f64 = 400.0;

/// JPEG start/end-of-image markers; enough for "an image" downstream.
const PLACEHOLDER_FRAME: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vehicle {
    Ev,
    Car,
}

#[derive(Debug, Default)]
struct Scene {
    occupant: Option<Vehicle>,
    camera_fault: bool,
}

/// Shared handle to the simulated spot.
#[derive(Debug, Clone, Default)]
pub struct SimScene {
    inner: Arc<Mutex<Scene>>,
}

impl SimScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn park(&self, vehicle: Vehicle) {
        info!("SIM: {vehicle:?} parks");
        self.with(|s| s.occupant = Some(vehicle));
    }

    pub fn leave(&self) {
        info!("SIM: spot vacated");
        self.with(|s| s.occupant = None);
    }

    pub fn occupant(&self) -> Option<Vehicle> {
        self.with(|s| s.occupant)
    }

    /// Make the camera fail until cleared.
    pub fn set_camera_fault(&self, fault: bool) {
        self.with(|s| s.camera_fault = fault);
    }

    fn with<T>(&self, f: impl FnOnce(&mut Scene) -> T) -> T {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub struct SimRangeFinder {
    scene: SimScene,
}

impl SimRangeFinder {
    pub fn new(scene: SimScene) -> Self {
        Self { scene }
    }
}

impl RangeFinder for SimRangeFinder {
    fn read_once(&mut self) -> Option<f64> {
        Some(match self.scene.occupant() {
            Some(_) => OCCUPIED_CM,
            None => EMPTY_CM,
        })
    }
}

pub struct SimCamera {
    scene: SimScene,
    open: bool,
}

impl SimCamera {
    pub fn new(scene: SimScene) -> Self {
        Self { scene, open: false }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Camera for SimCamera {
    fn capture(&mut self) -> Result<FrameRef, SensorError> {
        if self.scene.with(|s| s.camera_fault) {
            return Err(SensorError::CameraUnavailable);
        }
        self.open = true;
        Ok(FrameRef::new(PLACEHOLDER_FRAME.to_vec()))
    }

    fn release(&mut self) {
        self.open = false;
    }
}

/// Reports the parked vehicle under the configured class ids.
pub struct SimClassifier {
    scene: SimScene,
    vehicle_class: u32,
    ev_class: u32,
}

impl SimClassifier {
    pub fn new(scene: SimScene, vehicle_class: u32, ev_class: u32) -> Self {
        Self {
            scene,
            vehicle_class,
            ev_class,
        }
    }
}

impl Classifier for SimClassifier {
    fn classify(&mut self, _frame: &FrameRef) -> Result<Vec<Detection>, SensorError> {
        let class_id = match self.scene.occupant() {
            Some(Vehicle::Ev) => self.ev_class,
            Some(Vehicle::Car) => self.vehicle_class,
            None => return Ok(Vec::new()),
        };
        Ok(vec![Detection {
            class_id,
            confidence: 0.9,
            bbox: BoundingBox::new(120.0, 80.0, 520.0, 400.0),
        }])
    }
}
