//! Memcache binary protocol implementation (client side).
//!
//! # Protocol Overview
//!
//! The Memcache binary protocol uses fixed 24-byte headers for both requests
//! and responses.
//!
//! - Request magic: 0x80
//! - Response magic: 0x81
//!
//! SASL authentication runs over three opcodes: LIST_MECHS (`0x20`), AUTH
//! (`0x21`) and STEP (`0x22`). A status of `0x21` on AUTH or STEP means the
//! server wants another round.
//!
//! # Example
//!
//! ```
//! use protocol_memcache::binary::{BinaryRequest, Opcode, Packet};
//!
//! let request = BinaryRequest::get("mykey", 1).to_bytes();
//! assert_eq!(request[1], Opcode::Get as u8);
//!
//! // A server pushing a TAP message reuses the request layout.
//! let (packet, consumed) = Packet::parse(&request).unwrap();
//! assert_eq!(consumed, request.len());
//! assert!(!packet.is_response());
//! assert_eq!(packet.key, b"mykey");
//! ```

mod header;
mod request;
mod response;

pub use header::{
    HEADER_SIZE, Opcode, REQUEST_MAGIC, RESPONSE_MAGIC, RequestHeader, ResponseHeader, Status,
};
pub use request::{BinaryRequest, TAP_FLAG_BACKFILL, TAP_FLAG_DUMP, TAP_FLAG_SUPPORT_ACK};
pub use response::Packet;
