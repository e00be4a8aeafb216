//! EV charging-spot monitor library.
//!
//! Exposes the sensor-fusion core (meter frame decoder, link supervisor,
//! sensing channels, fusion state machine) and the threaded runtime for
//! integration testing.  Serial-port access is behind the `hardware`
//! feature.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod meter;
pub mod sensors;
pub mod shutdown;
