//! Error type shared by the ASCII and binary decoders.

/// Error type for Memcache parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The buffer ends before a complete frame. Buffer more and retry.
    #[error("incomplete data")]
    Incomplete,

    /// Invalid protocol format (static message).
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// Invalid number format.
    #[error("invalid number")]
    InvalidNumber,

    /// Unknown opcode in binary protocol.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Invalid magic byte in binary protocol.
    #[error("invalid magic byte: {0:#04x}")]
    InvalidMagic(u8),
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}
