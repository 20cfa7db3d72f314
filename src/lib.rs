pub mod connection;
pub mod error;
pub mod inbound;
pub mod receive;
pub mod relay;
pub mod tui;

pub use connection::{ConnectionManager, Connector, SerialConnector};
pub use error::{ConsoleError, Result};
pub use inbound::InboundQueue;
