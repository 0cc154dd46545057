//! Client-side binary protocol response parsing.
//!
//! A server answers with response packets (magic `0x81`). On a TAP stream it
//! also pushes request-magic packets carrying mutations; both are decoded into
//! [`Packet`] so a single reader can handle either.

use super::header::{HEADER_SIZE, Opcode, REQUEST_MAGIC, RESPONSE_MAGIC, RequestHeader, ResponseHeader};
use crate::error::ParseError;

/// One decoded packet with its body split into extras, key and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<'a> {
    /// Packet magic (`REQUEST_MAGIC` or `RESPONSE_MAGIC`).
    pub magic: u8,
    /// Command opcode.
    pub opcode: Opcode,
    /// Raw status for responses, vbucket id for server-pushed requests.
    pub status: u16,
    /// Opaque correlation token.
    pub opaque: u32,
    /// CAS value.
    pub cas: u64,
    /// Extras section.
    pub extras: &'a [u8],
    /// Key section.
    pub key: &'a [u8],
    /// Value section.
    pub value: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Parse one complete packet from `data`.
    ///
    /// Returns the packet and the number of bytes consumed, or
    /// [`ParseError::Incomplete`] if more data is needed.
    pub fn parse(data: &'a [u8]) -> Result<(Self, usize), ParseError> {
        let first = *data.first().ok_or(ParseError::Incomplete)?;
        let (opcode, key_length, extras_length, status, total, opaque, cas) = match first {
            RESPONSE_MAGIC => {
                let h = ResponseHeader::parse(data)?;
                (h.opcode, h.key_length, h.extras_length, h.status, h.total_body_length, h.opaque, h.cas)
            }
            REQUEST_MAGIC => {
                let h = RequestHeader::parse(data)?;
                (h.opcode, h.key_length, h.extras_length, h.vbucket_id, h.total_body_length, h.opaque, h.cas)
            }
            other => return Err(ParseError::InvalidMagic(other)),
        };

        let total = total as usize;
        let extras_end = extras_length as usize;
        let key_end = extras_end + key_length as usize;
        if key_end > total {
            return Err(ParseError::Protocol("body shorter than extras and key"));
        }
        if data.len() < HEADER_SIZE + total {
            return Err(ParseError::Incomplete);
        }

        let body = &data[HEADER_SIZE..HEADER_SIZE + total];
        Ok((
            Packet {
                magic: first,
                opcode,
                status,
                opaque,
                cas,
                extras: &body[..extras_end],
                key: &body[extras_end..key_end],
                value: &body[key_end..],
            },
            HEADER_SIZE + total,
        ))
    }

    /// Returns true if this packet is a server response.
    pub fn is_response(&self) -> bool {
        self.magic == RESPONSE_MAGIC
    }

    /// The item flags carried in the first four bytes of extras, or 0.
    pub fn flags(&self) -> u32 {
        if self.extras.len() >= 4 {
            u32::from_be_bytes([self.extras[0], self.extras[1], self.extras[2], self.extras[3]])
        } else {
            0
        }
    }

    /// The value interpreted as a big-endian counter (INCR/DECR responses).
    pub fn counter(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.value.get(..8)?.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }
}
