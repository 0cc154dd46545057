//! Memcache binary protocol headers.
//!
//! The binary protocol uses fixed 24-byte headers for both requests and responses.
//! This module provides types for parsing and encoding these headers.

use crate::error::ParseError;

/// Magic byte for binary request packets.
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte for binary response packets.
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Minimum header size for binary protocol.
pub const HEADER_SIZE: usize = 24;

/// Binary protocol opcodes used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    Flush = 0x08,
    GetQ = 0x09,
    Noop = 0x0A,
    Version = 0x0B,
    GetK = 0x0C,
    GetKQ = 0x0D,
    Append = 0x0E,
    Prepend = 0x0F,
    Stat = 0x10,
    Touch = 0x1C,
    Gat = 0x1D,
    GatQ = 0x1E,
    SaslListMechs = 0x20,
    SaslAuth = 0x21,
    SaslStep = 0x22,
    GatK = 0x23,
    GatKQ = 0x24,
    TapConnect = 0x40,
    TapMutation = 0x41,
    TapDelete = 0x42,
    TapFlush = 0x43,
    TapOpaque = 0x44,
    TapVbucketSet = 0x45,
    TapCheckpointStart = 0x46,
    TapCheckpointEnd = 0x47,
    GetConfig = 0x60,
    SetConfig = 0x64,
    DeleteConfig = 0x66,
    GetReplica = 0x83,
    GetLocked = 0x94,
}

impl Opcode {
    /// Try to convert a byte to an opcode.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Get),
            0x01 => Some(Opcode::Set),
            0x02 => Some(Opcode::Add),
            0x03 => Some(Opcode::Replace),
            0x04 => Some(Opcode::Delete),
            0x05 => Some(Opcode::Increment),
            0x06 => Some(Opcode::Decrement),
            0x07 => Some(Opcode::Quit),
            0x08 => Some(Opcode::Flush),
            0x09 => Some(Opcode::GetQ),
            0x0A => Some(Opcode::Noop),
            0x0B => Some(Opcode::Version),
            0x0C => Some(Opcode::GetK),
            0x0D => Some(Opcode::GetKQ),
            0x0E => Some(Opcode::Append),
            0x0F => Some(Opcode::Prepend),
            0x10 => Some(Opcode::Stat),
            0x1C => Some(Opcode::Touch),
            0x1D => Some(Opcode::Gat),
            0x1E => Some(Opcode::GatQ),
            0x20 => Some(Opcode::SaslListMechs),
            0x21 => Some(Opcode::SaslAuth),
            0x22 => Some(Opcode::SaslStep),
            0x23 => Some(Opcode::GatK),
            0x24 => Some(Opcode::GatKQ),
            0x40 => Some(Opcode::TapConnect),
            0x41 => Some(Opcode::TapMutation),
            0x42 => Some(Opcode::TapDelete),
            0x43 => Some(Opcode::TapFlush),
            0x44 => Some(Opcode::TapOpaque),
            0x45 => Some(Opcode::TapVbucketSet),
            0x46 => Some(Opcode::TapCheckpointStart),
            0x47 => Some(Opcode::TapCheckpointEnd),
            0x60 => Some(Opcode::GetConfig),
            0x64 => Some(Opcode::SetConfig),
            0x66 => Some(Opcode::DeleteConfig),
            0x83 => Some(Opcode::GetReplica),
            0x94 => Some(Opcode::GetLocked),
            _ => None,
        }
    }

    /// Returns true for the opcodes a server sends on a TAP stream.
    pub fn is_tap_message(&self) -> bool {
        matches!(
            self,
            Opcode::TapMutation
                | Opcode::TapDelete
                | Opcode::TapFlush
                | Opcode::TapOpaque
                | Opcode::TapVbucketSet
                | Opcode::TapCheckpointStart
                | Opcode::TapCheckpointEnd
        )
    }

    /// Returns true for the SASL handshake opcodes.
    pub fn is_sasl(&self) -> bool {
        matches!(
            self,
            Opcode::SaslListMechs | Opcode::SaslAuth | Opcode::SaslStep
        )
    }
}

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    NoError = 0x0000,
    KeyNotFound = 0x0001,
    KeyExists = 0x0002,
    ValueTooLarge = 0x0003,
    InvalidArguments = 0x0004,
    ItemNotStored = 0x0005,
    NonNumericValue = 0x0006,
    WrongVbucket = 0x0007,
    AuthError = 0x0020,
    AuthContinue = 0x0021,
    OutOfRange = 0x0022,
    UnknownCommand = 0x0081,
    OutOfMemory = 0x0082,
    NotSupported = 0x0083,
    InternalError = 0x0084,
    Busy = 0x0085,
    TempFailure = 0x0086,
}

impl Status {
    /// Try to convert a u16 to a status.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Status::NoError),
            0x0001 => Some(Status::KeyNotFound),
            0x0002 => Some(Status::KeyExists),
            0x0003 => Some(Status::ValueTooLarge),
            0x0004 => Some(Status::InvalidArguments),
            0x0005 => Some(Status::ItemNotStored),
            0x0006 => Some(Status::NonNumericValue),
            0x0007 => Some(Status::WrongVbucket),
            0x0020 => Some(Status::AuthError),
            0x0021 => Some(Status::AuthContinue),
            0x0022 => Some(Status::OutOfRange),
            0x0081 => Some(Status::UnknownCommand),
            0x0082 => Some(Status::OutOfMemory),
            0x0083 => Some(Status::NotSupported),
            0x0084 => Some(Status::InternalError),
            0x0085 => Some(Status::Busy),
            0x0086 => Some(Status::TempFailure),
            _ => None,
        }
    }

    /// Returns true if this status indicates success.
    pub fn is_success(&self) -> bool {
        *self == Status::NoError
    }

    /// Returns the status as a short description.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NoError => "No error",
            Status::KeyNotFound => "Key not found",
            Status::KeyExists => "Key exists",
            Status::ValueTooLarge => "Value too large",
            Status::InvalidArguments => "Invalid arguments",
            Status::ItemNotStored => "Item not stored",
            Status::NonNumericValue => "Incr/Decr on non-numeric value",
            Status::WrongVbucket => "Wrong vbucket",
            Status::AuthError => "Authentication error",
            Status::AuthContinue => "Authentication continue",
            Status::OutOfRange => "Out of range",
            Status::UnknownCommand => "Unknown command",
            Status::OutOfMemory => "Out of memory",
            Status::NotSupported => "Not supported",
            Status::InternalError => "Internal error",
            Status::Busy => "Busy",
            Status::TempFailure => "Temporary failure",
        }
    }
}

/// Binary protocol request header (24 bytes).
///
/// Format:
/// ```text
/// Byte/     0       |       1       |       2       |       3       |
///    /              |               |               |               |
///   |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///   +---------------+---------------+---------------+---------------+
///  0| Magic         | Opcode        | Key length                    |
///   +---------------+---------------+---------------+---------------+
///  4| Extras length | Data type     | vbucket id                    |
///   +---------------+---------------+---------------+---------------+
///  8| Total body length                                             |
///   +---------------+---------------+---------------+---------------+
/// 12| Opaque                                                        |
///   +---------------+---------------+---------------+---------------+
/// 16| CAS                                                           |
///   |                                                               |
///   +---------------+---------------+---------------+---------------+
/// ```
///
/// Servers reuse this layout for the messages they push on a TAP stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Magic byte (should be REQUEST_MAGIC)
    pub magic: u8,
    /// Command opcode
    pub opcode: Opcode,
    /// Key length in bytes
    pub key_length: u16,
    /// Length of extras (flags, expiration, etc.)
    pub extras_length: u8,
    /// Data type (reserved, should be 0)
    pub data_type: u8,
    /// Virtual bucket ID (reserved, usually 0)
    pub vbucket_id: u16,
    /// Total body length = extras_length + key_length + value_length
    pub total_body_length: u32,
    /// Opaque value (passed back in response)
    pub opaque: u32,
    /// CAS value for compare-and-swap operations
    pub cas: u64,
}

impl RequestHeader {
    /// Create a new request header.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: REQUEST_MAGIC,
            opcode,
            key_length: 0,
            extras_length: 0,
            data_type: 0,
            vbucket_id: 0,
            total_body_length: 0,
            opaque: 0,
            cas: 0,
        }
    }

    /// Parse a request header from a byte buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HEADER_SIZE {
            return Err(ParseError::Incomplete);
        }

        if data[0] != REQUEST_MAGIC {
            return Err(ParseError::InvalidMagic(data[0]));
        }

        let opcode = Opcode::from_u8(data[1]).ok_or(ParseError::UnknownOpcode(data[1]))?;

        Ok(Self {
            magic: data[0],
            opcode,
            key_length: u16::from_be_bytes([data[2], data[3]]),
            extras_length: data[4],
            data_type: data[5],
            vbucket_id: u16::from_be_bytes([data[6], data[7]]),
            total_body_length: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            opaque: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
            cas: read_u64(&data[16..24]),
        })
    }

    /// Encode the header into a byte buffer.
    ///
    /// Returns HEADER_SIZE (24).
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.magic;
        buf[1] = self.opcode as u8;
        buf[2..4].copy_from_slice(&self.key_length.to_be_bytes());
        buf[4] = self.extras_length;
        buf[5] = self.data_type;
        buf[6..8].copy_from_slice(&self.vbucket_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.total_body_length.to_be_bytes());
        buf[12..16].copy_from_slice(&self.opaque.to_be_bytes());
        buf[16..24].copy_from_slice(&self.cas.to_be_bytes());
        HEADER_SIZE
    }

    /// Calculate the value length from the header fields.
    pub fn value_length(&self) -> Result<usize, ParseError> {
        body_value_length(self.total_body_length, self.extras_length, self.key_length)
    }
}

/// Binary protocol response header (24 bytes).
///
/// Same layout as the request header, with the vbucket field carrying the
/// response status. The status is kept as the raw wire value so codes this
/// crate does not know about survive decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Magic byte (should be RESPONSE_MAGIC)
    pub magic: u8,
    /// Command opcode (echoed from request)
    pub opcode: Opcode,
    /// Key length in bytes
    pub key_length: u16,
    /// Length of extras (flags for GET responses)
    pub extras_length: u8,
    /// Data type (reserved, should be 0)
    pub data_type: u8,
    /// Raw response status
    pub status: u16,
    /// Total body length = extras_length + key_length + value_length
    pub total_body_length: u32,
    /// Opaque value (echoed from request)
    pub opaque: u32,
    /// CAS value
    pub cas: u64,
}

impl ResponseHeader {
    /// Create a new response header with the given opcode and status.
    pub fn new(opcode: Opcode, status: Status) -> Self {
        Self {
            magic: RESPONSE_MAGIC,
            opcode,
            key_length: 0,
            extras_length: 0,
            data_type: 0,
            status: status as u16,
            total_body_length: 0,
            opaque: 0,
            cas: 0,
        }
    }

    /// Parse a response header from a byte buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HEADER_SIZE {
            return Err(ParseError::Incomplete);
        }

        if data[0] != RESPONSE_MAGIC {
            return Err(ParseError::InvalidMagic(data[0]));
        }

        let opcode = Opcode::from_u8(data[1]).ok_or(ParseError::UnknownOpcode(data[1]))?;

        Ok(Self {
            magic: data[0],
            opcode,
            key_length: u16::from_be_bytes([data[2], data[3]]),
            extras_length: data[4],
            data_type: data[5],
            status: u16::from_be_bytes([data[6], data[7]]),
            total_body_length: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            opaque: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
            cas: read_u64(&data[16..24]),
        })
    }

    /// Encode the header into a byte buffer.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.magic;
        buf[1] = self.opcode as u8;
        buf[2..4].copy_from_slice(&self.key_length.to_be_bytes());
        buf[4] = self.extras_length;
        buf[5] = self.data_type;
        buf[6..8].copy_from_slice(&self.status.to_be_bytes());
        buf[8..12].copy_from_slice(&self.total_body_length.to_be_bytes());
        buf[12..16].copy_from_slice(&self.opaque.to_be_bytes());
        buf[16..24].copy_from_slice(&self.cas.to_be_bytes());
        HEADER_SIZE
    }

    /// The status as a known [`Status`], if this crate recognizes it.
    pub fn known_status(&self) -> Option<Status> {
        Status::from_u16(self.status)
    }

    /// Calculate the value length from the header fields.
    pub fn value_length(&self) -> Result<usize, ParseError> {
        body_value_length(self.total_body_length, self.extras_length, self.key_length)
    }
}

fn body_value_length(total: u32, extras: u8, key: u16) -> Result<usize, ParseError> {
    (total as usize)
        .checked_sub(extras as usize + key as usize)
        .ok_or(ParseError::Protocol("body shorter than extras and key"))
}

fn read_u64(data: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[..8]);
    u64::from_be_bytes(bytes)
}
