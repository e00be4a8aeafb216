//! Application layer: collaborator ports, alert intents and the threaded
//! runtime that wires channels, the fusion engine and notification
//! dispatch together.
//!
//! All interaction with devices happens through **port traits** defined
//! in [`ports`], keeping the core testable without real peripherals.

pub mod events;
pub mod ports;
pub mod runtime;
