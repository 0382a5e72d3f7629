use thiserror::Error;

/// A request payload was too large to fit a one-byte SHDLC length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("payload of {len} bytes exceeds the 255 byte SHDLC length field")]
pub struct EncodeError {
    pub len: usize,
}

/// A byte sequence does not form a well-structured SHDLC frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// `frame[position]` should have been `expected` but was `got`.
    #[error("frame sentinel at position {position}: expected {expected:#04x}, got {got:#04x}")]
    Sentinel {
        position: usize,
        expected: u8,
        got: u8,
    },
    /// The interior of the frame ended on an escape marker with no byte
    /// following it.
    #[error("dangling escape byte at end of frame")]
    DanglingEscape,
    /// The frame is shorter than its own `LEN` field claims, or has no
    /// checksum byte following the payload.
    #[error("frame truncated: declared {declared} bytes of payload, {available} available")]
    Truncated { declared: usize, available: usize },
    /// The recomputed checksum does not match the one carried on the wire.
    #[error("checksum mismatch: expected {expected:#04x}, got {got:#04x}")]
    Checksum { expected: u8, got: u8 },
}
