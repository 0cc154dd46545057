//! Operation factories.
//!
//! A factory maps one logical command to a protocol-specific operation. It
//! never performs I/O: the returned operation is handed to a
//! [`Connection`](crate::Connection), which drives it.

mod ascii;
mod binary;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use protocol_memcache::MAX_KEY_LEN;
use protocol_memcache::binary::Opcode;

pub use ascii::AsciiOperationFactory;
pub use binary::BinaryOperationFactory;

use crate::callback::{
    Callback, ConfigCallback, GetCallback, GetsCallback, MultiGetCallback, MultiGetsCallback,
    MultiReplicaGetCallback, OperationCallback, ReplicaGetCallback, StatsCallback, StoreCallback,
    TapCallback,
};
use crate::error::Error;
use crate::operation::{ConcatenationType, Mutator, Operation, StoreType};
use crate::sasl::SharedMechanism;

/// Wire protocol spoken by a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Ascii,
    Binary,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ascii => f.write_str("ascii"),
            Protocol::Binary => f.write_str("binary"),
        }
    }
}

/// What a TAP stream should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapRequest {
    /// TAP connect flags (`TAP_FLAG_*`).
    pub flags: u32,
    /// Flag-specific payload, e.g. the backfill date.
    pub payload: Bytes,
}

pub type OperationResult = Result<Box<dyn Operation>, Error>;

/// Builds operations for one protocol.
///
/// Keys are validated synchronously; a malformed key or an unsupported
/// command is an error, never a callback status.
pub trait OperationFactory: Send + Sync {
    fn protocol(&self) -> Protocol;

    fn get(&self, key: &[u8], cb: Arc<dyn GetCallback>) -> OperationResult;

    /// One operation retrieving every key in `keys`.
    fn get_multi(&self, keys: &[&[u8]], cb: Arc<dyn GetCallback>) -> OperationResult;

    fn gets(&self, key: &[u8], cb: Arc<dyn GetsCallback>) -> OperationResult;

    /// Get a value and update its expiration.
    fn get_and_touch(&self, key: &[u8], expiration: u32, cb: Arc<dyn GetsCallback>)
    -> OperationResult;

    /// Get a value and lock it for `expiration` seconds.
    fn getl(&self, key: &[u8], expiration: u32, cb: Arc<dyn GetsCallback>) -> OperationResult;

    fn replica_get(
        &self,
        key: &[u8],
        index: u16,
        cb: Arc<dyn ReplicaGetCallback>,
    ) -> OperationResult;

    fn replica_gets(&self, key: &[u8], index: u16, cb: Arc<dyn GetsCallback>) -> OperationResult;

    fn delete(&self, key: &[u8], cb: Arc<dyn OperationCallback>) -> OperationResult;

    fn delete_cas(&self, key: &[u8], cas: u64, cb: Arc<dyn OperationCallback>) -> OperationResult;

    fn store(
        &self,
        store_type: StoreType,
        key: &[u8],
        flags: u32,
        expiration: u32,
        data: Bytes,
        cb: Arc<dyn StoreCallback>,
    ) -> OperationResult;

    /// Store only if the item's CAS still equals `cas`. A `cas` of 0 stores
    /// unconditionally.
    #[allow(clippy::too_many_arguments)]
    fn cas(
        &self,
        store_type: StoreType,
        key: &[u8],
        cas: u64,
        flags: u32,
        expiration: u32,
        data: Bytes,
        cb: Arc<dyn StoreCallback>,
    ) -> OperationResult;

    /// Append or prepend `data`.
    fn cat(
        &self,
        cat_type: ConcatenationType,
        cas: u64,
        key: &[u8],
        data: Bytes,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult;

    fn touch(&self, key: &[u8], expiration: u32, cb: Arc<dyn OperationCallback>)
    -> OperationResult;

    /// Increment or decrement a counter. The new value arrives as the
    /// status message. `default` and `expiration` only apply to the binary
    /// protocol, which can create missing counters.
    fn mutate(
        &self,
        mutator: Mutator,
        key: &[u8],
        by: u64,
        default: u64,
        expiration: u32,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult;

    fn flush(&self, delay: u32, cb: Arc<dyn OperationCallback>) -> OperationResult;

    /// The server version arrives as the status message.
    fn version(&self, cb: Arc<dyn OperationCallback>) -> OperationResult;

    fn noop(&self, cb: Arc<dyn OperationCallback>) -> OperationResult;

    fn stats(&self, arg: Option<&str>, cb: Arc<dyn StatsCallback>) -> OperationResult;

    /// Stats for a single key.
    fn key_stats(&self, key: &[u8], cb: Arc<dyn StatsCallback>) -> OperationResult;

    fn get_config(&self, config_type: &str, cb: Arc<dyn ConfigCallback>) -> OperationResult;

    fn set_config(
        &self,
        config_type: &str,
        flags: u32,
        data: Bytes,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult;

    fn delete_config(&self, config_type: &str, cb: Arc<dyn OperationCallback>)
    -> OperationResult;

    fn refresh_certificate(&self, cb: Arc<dyn OperationCallback>) -> OperationResult;

    /// Stream items changed since `since` (seconds since the epoch).
    fn tap_backfill(&self, id: Option<&str>, since: u64, cb: Arc<dyn TapCallback>)
    -> OperationResult;

    fn tap_custom(
        &self,
        id: Option<&str>,
        request: TapRequest,
        cb: Arc<dyn TapCallback>,
    ) -> OperationResult;

    /// Acknowledge a TAP message carrying `opcode` and `opaque`.
    fn tap_ack(&self, opcode: Opcode, opaque: u32, cb: Arc<dyn OperationCallback>)
    -> OperationResult;

    /// Stream every item, then end the stream.
    fn tap_dump(&self, id: Option<&str>, cb: Arc<dyn TapCallback>) -> OperationResult;

    /// List the server's SASL mechanisms. The space-separated list arrives
    /// as the status message.
    fn sasl_mechs(&self, cb: Arc<dyn OperationCallback>) -> OperationResult;

    fn sasl_auth(&self, mechanism: SharedMechanism, cb: Arc<dyn OperationCallback>)
    -> OperationResult;

    fn sasl_step(
        &self,
        mechanism: SharedMechanism,
        challenge: Bytes,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult;

    /// Split a multi-key get into one operation per key.
    ///
    /// All clones share one aggregating callback that completes the original
    /// callback once. `Get` callbacks fan out as `get`, `ReplicaGet` callbacks
    /// as `replica_get` with the original replica index, and every other
    /// shape as `gets`. Only retrieval operations can be split.
    fn clone_get(&self, op: &dyn Operation) -> Result<Vec<Box<dyn Operation>>, Error> {
        if !op.kind().is_retrieval() {
            return Err(Error::InvalidArgument(format!(
                "clone_get requires a retrieval operation, got {:?}",
                op.kind()
            )));
        }
        let keys = op.keys();
        if keys.is_empty() {
            return Err(Error::InvalidArgument(
                "clone_get requires an operation with keys".into(),
            ));
        }

        match op.callback() {
            Callback::Get(cb) => {
                let multi = Arc::new(MultiGetCallback::new(cb.clone(), keys.len()));
                keys.iter().map(|key| self.get(key, multi.clone())).collect()
            }
            Callback::ReplicaGet(cb) => {
                let index = op.replica_index().unwrap_or(0);
                let multi = Arc::new(MultiReplicaGetCallback::new(cb.clone(), keys.len()));
                keys.iter()
                    .map(|key| self.replica_get(key, index, multi.clone()))
                    .collect()
            }
            other => {
                let multi = Arc::new(MultiGetsCallback::new(other.clone().into_gets(), keys.len()));
                keys.iter().map(|key| self.gets(key, multi.clone())).collect()
            }
        }
    }
}

/// Check a key for length. ASCII keys must also be free of whitespace and
/// control bytes.
pub(crate) fn validate_key(key: &[u8], protocol: Protocol) -> Result<Bytes, Error> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidArgument(format!(
            "key is {} bytes, maximum is {MAX_KEY_LEN}",
            key.len()
        )));
    }
    if protocol == Protocol::Ascii
        && let Some(pos) = key.iter().position(|b| b.is_ascii_whitespace() || b.is_ascii_control())
    {
        return Err(Error::InvalidArgument(format!(
            "key contains an invalid byte {:#04x} at {pos}",
            key[pos]
        )));
    }
    Ok(Bytes::copy_from_slice(key))
}

pub(crate) fn validate_keys(keys: &[&[u8]], protocol: Protocol) -> Result<Vec<Bytes>, Error> {
    if keys.is_empty() {
        return Err(Error::InvalidArgument("at least one key is required".into()));
    }
    keys.iter().map(|key| validate_key(key, protocol)).collect()
}

pub(crate) fn unsupported(command: &'static str, protocol: Protocol) -> Error {
    Error::Unsupported { command, protocol }
}
