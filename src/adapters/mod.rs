//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                      | Connects to               |
//! |------------|---------------------------------|---------------------------|
//! | `dispatch` | AlertSink                       | Notifier + AudioPlayer    |
//! | `gates`    | ChannelControl                  | vision / power loops      |
//! | `log_sink` | Notifier, AudioPlayer           | `log` output              |
//! | `serial`   | Connector, Transport            | USB serial meter adapter  |
//! | `sim`      | RangeFinder, Camera, Classifier | in-memory parking spot    |
//! | `time`     | Clock, DelayNs                  | `std::time::Instant`      |

pub mod dispatch;
pub mod gates;
pub mod log_sink;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;
pub mod time;
