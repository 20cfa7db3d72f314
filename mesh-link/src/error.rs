use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[cfg(feature = "serial")]
    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout waiting for the device configuration")]
    Timeout,

    #[error("frame of {0} bytes exceeds the 512 byte limit")]
    FrameTooLarge(usize),

    #[error("payload of {0} bytes exceeds the 233 byte limit")]
    PayloadTooLarge(usize),

    #[error("malformed protobuf: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to encode protobuf: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("local node number is not known yet")]
    NotConfigured,

    #[error("interface is closed")]
    Closed,
}
