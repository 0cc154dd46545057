//! Client-side Memcache wire codec.
//!
//! Encoders for every request a memcache client issues and decoders for the
//! responses a server sends back, for both the ASCII text protocol and the
//! 24-byte-header binary protocol.
//!
//! # ASCII Protocol
//!
//! ```
//! use protocol_memcache::{Request, Response};
//!
//! let keys: &[&[u8]] = &[b"mykey"];
//! let bytes = Request::get(keys).to_bytes();
//! assert_eq!(&bytes[..], b"get mykey\r\n");
//!
//! let response_data = b"VALUE mykey 0 5\r\nhello\r\nEND\r\n";
//! let (response, consumed) = Response::parse(response_data).unwrap();
//! assert_eq!(consumed, response_data.len());
//! assert!(!response.is_miss());
//! ```
//!
//! # Binary Protocol
//!
//! See the [`binary`] module. SASL authentication is only available there.

mod error;
mod request;
mod response;

pub mod binary;

pub use error::ParseError;
pub use request::{Request, Retrieval, Storage};
pub use response::{Response, Value};

/// Maximum key length accepted by memcached servers.
pub const MAX_KEY_LEN: usize = 250;
