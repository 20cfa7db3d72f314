use mesh_link::LinkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Connection failed: {0}")]
    Connection(#[source] LinkError),

    #[error("Failed to send message: {0}")]
    Send(#[source] LinkError),

    #[error("Name update failed: {0}")]
    Identity(#[source] LinkError),

    #[error("Receive error: {0}")]
    Decode(String),

    #[error("Port scan failed: {0}")]
    PortScan(#[source] LinkError),

    #[error("Not connected to device")]
    NotConnected,

    #[error("No serial port selected")]
    NoPortSelected,

    #[error("Both names required")]
    NamesRequired,

    #[error("Short name must be 4 characters")]
    ShortNameLength,
}

impl ConsoleError {
    /// Title for the notification popup.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Send(_) => "Send Error",
            Self::Identity(_) => "Device Settings",
            Self::Decode(_) => "Receive Error",
            Self::PortScan(_) => "Serial Ports",
            Self::NotConnected | Self::NoPortSelected | Self::NamesRequired | Self::ShortNameLength => {
                "Error"
            }
        }
    }

    /// Input problems caught before the radio was touched. These only raise a
    /// notification; link failures are also written to the console log.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::NoPortSelected | Self::NamesRequired | Self::ShortNameLength
        )
    }
}
