//! Sensing channels: one per physical sensor, each with its own debounce.
//!
//! | Channel    | Collaborator            | Debounce                        |
//! |------------|-------------------------|---------------------------------|
//! | `distance` | `RangeFinder`           | mean of N point readings        |
//! | `vision`   | `Camera` + `Classifier` | bbox stability window           |
//! | `power`    | `LinkSupervisor`        | CRC-validated frames only       |
//!
//! Every channel exposes a `run` loop meant for its own thread; the loops
//! push into the shared [`EventBus`](crate::events::EventBus) and sleep
//! through [`Shutdown::wait`](crate::shutdown::Shutdown::wait).

pub mod distance;
pub mod power;
pub mod vision;

pub use distance::DistanceChannel;
pub use power::PowerChannel;
pub use vision::{StabilityFilter, VisionChannel};
