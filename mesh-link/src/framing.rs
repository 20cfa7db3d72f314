use crate::error::{LinkError, Result};

/// First byte of a stream frame header.
pub const START1: u8 = 0x94;
/// Second byte of a stream frame header. Also used as the wake-up filler.
pub const START2: u8 = 0xC3;
/// Largest protobuf payload the device accepts in one frame.
pub const MAX_FRAME_PAYLOAD: usize = 512;
/// Header length: START1 START2 len_hi len_lo.
pub const HEADER_LEN: usize = 4;

/// Wrap an encoded protobuf in a stream frame.
///
/// Wire format: `94 C3 <len_hi> <len_lo> <payload...>`
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(LinkError::FrameTooLarge(payload.len()));
    }
    let len = payload.len() as u16;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.push(START1);
    bytes.push(START2);
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Something pulled out of the serial byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// A complete framed protobuf payload.
    Frame(Vec<u8>),
    /// Bytes that were not part of any frame (device debug console output).
    Text(Vec<u8>),
}

/// Incremental deframer for the serial byte stream.
///
/// The device interleaves framed protobufs with plain log text, so anything
/// before a `94 C3` header is handed back as [`Chunk::Text`].
#[derive(Debug, Default)]
pub struct Deframer {
    buf: Vec<u8>,
}

impl Deframer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_FRAME_PAYLOAD + HEADER_LEN),
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes buffered but not yet returned.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next chunk, or `None` if more bytes are needed.
    pub fn next_chunk(&mut self) -> Option<Chunk> {
        if self.buf.is_empty() {
            return None;
        }

        let start = self.buf.iter().position(|&b| b == START1);
        match start {
            None => return Some(Chunk::Text(std::mem::take(&mut self.buf))),
            Some(0) => {}
            Some(pos) => return Some(Chunk::Text(self.buf.drain(..pos).collect())),
        }

        // buf[0] == START1 from here on.
        if self.buf.len() < 2 {
            return None;
        }
        if self.buf[1] != START2 {
            // A lone 0x94 in the log text.
            return Some(Chunk::Text(self.buf.drain(..1).collect()));
        }
        if self.buf.len() < HEADER_LEN {
            return None;
        }

        let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_PAYLOAD {
            // Corrupt header; resync past it.
            return Some(Chunk::Text(self.buf.drain(..2).collect()));
        }
        if self.buf.len() < HEADER_LEN + len {
            return None;
        }

        let frame: Vec<u8> = self.buf.drain(..HEADER_LEN + len).skip(HEADER_LEN).collect();
        Some(Chunk::Frame(frame))
    }
}
