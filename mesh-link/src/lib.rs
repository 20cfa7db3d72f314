//! Minimal client for the Meshtastic serial API.
//!
//! Covers what an operator console needs: stream framing, the config
//! handshake, the node registry, text messages, owner names and a position
//! broadcast. Routing, encryption and the rest of the protocol stay on the
//! device.

pub mod error;
pub mod framing;
pub mod interface;
pub mod nodes;
pub mod proto;
pub mod transport;

pub use error::{LinkError, Result};
pub use interface::{LinkConfig, MeshInterface, ReceiveCallback, SerialInterface};
pub use nodes::{NodeDb, NodeEntry};
pub use proto::{MeshPacket, PortNum};

#[cfg(feature = "serial")]
pub use transport::serial::available_ports;
