//! PZEM-004T power meter: wire format, transport port and link supervision.

pub mod frame;
pub mod link;
pub mod transport;

pub use frame::{ProtocolVariant, decode};
pub use link::{EnergyBaseline, LinkSupervisor};
pub use transport::{Connector, Transport};
