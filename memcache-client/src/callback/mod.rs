//! Callback shapes through which operations report results.
//!
//! Every operation reports zero or more data items, then exactly one
//! [`OperationStatus`], then `complete()`. The data items depend on the
//! command, so each command family has its own callback trait; the closed
//! [`Callback`] enum carries whichever one an operation was built with.

mod multi;

use std::sync::Arc;

use bytes::Bytes;
use protocol_memcache::binary::Opcode;

pub use multi::{MultiCallback, MultiGetCallback, MultiGetsCallback, MultiReplicaGetCallback};

use crate::status::OperationStatus;

/// Base callback: a final status followed by completion.
pub trait OperationCallback: Send + Sync {
    fn received_status(&self, status: OperationStatus);

    /// Called exactly once, after the final status.
    fn complete(&self);
}

/// Receives values from `get`.
pub trait GetCallback: OperationCallback {
    fn got_data(&self, key: &[u8], flags: u32, data: Bytes);
}

/// Receives values with their CAS token from `gets`, `gat`, `getl` and
/// `replica_gets`.
pub trait GetsCallback: OperationCallback {
    fn got_data(&self, key: &[u8], flags: u32, cas: u64, data: Bytes);
}

/// Receives values read from a replica.
pub trait ReplicaGetCallback: OperationCallback {
    fn got_data(&self, key: &[u8], flags: u32, data: Bytes);
}

/// Receives the CAS assigned by a successful binary store.
pub trait StoreCallback: OperationCallback {
    fn got_data(&self, key: &[u8], cas: u64);
}

/// Receives one `name value` pair per stat.
pub trait StatsCallback: OperationCallback {
    fn got_stat(&self, name: &str, value: &str);
}

/// Receives the configuration blob from `get_config`.
pub trait ConfigCallback: OperationCallback {
    fn got_config(&self, flags: u32, data: Bytes);
}

/// A message pushed by the server on a TAP stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapMessage {
    pub opcode: Opcode,
    pub opaque: u32,
    pub vbucket: u16,
    pub cas: u64,
    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl TapMessage {
    /// TAP engine flag asking the client to acknowledge this message.
    pub const FLAG_ACK: u16 = 0x01;

    /// TAP flags from the engine-specific part of the extras.
    pub fn tap_flags(&self) -> u16 {
        match self.extras.get(2..4) {
            Some(b) => u16::from_be_bytes([b[0], b[1]]),
            None => 0,
        }
    }

    /// True when the server expects a `tap_ack` for this message.
    pub fn needs_ack(&self) -> bool {
        self.tap_flags() & Self::FLAG_ACK != 0
    }
}

/// Receives messages from a TAP stream.
pub trait TapCallback: OperationCallback {
    fn got_message(&self, message: TapMessage);
}

/// Discriminant of [`Callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackShape {
    Status,
    Get,
    Gets,
    ReplicaGet,
    Store,
    Stats,
    Config,
    Tap,
}

/// The callback an operation was built with.
#[derive(Clone)]
pub enum Callback {
    Status(Arc<dyn OperationCallback>),
    Get(Arc<dyn GetCallback>),
    Gets(Arc<dyn GetsCallback>),
    ReplicaGet(Arc<dyn ReplicaGetCallback>),
    Store(Arc<dyn StoreCallback>),
    Stats(Arc<dyn StatsCallback>),
    Config(Arc<dyn ConfigCallback>),
    Tap(Arc<dyn TapCallback>),
}

impl Callback {
    pub fn shape(&self) -> CallbackShape {
        match self {
            Callback::Status(_) => CallbackShape::Status,
            Callback::Get(_) => CallbackShape::Get,
            Callback::Gets(_) => CallbackShape::Gets,
            Callback::ReplicaGet(_) => CallbackShape::ReplicaGet,
            Callback::Store(_) => CallbackShape::Store,
            Callback::Stats(_) => CallbackShape::Stats,
            Callback::Config(_) => CallbackShape::Config,
            Callback::Tap(_) => CallbackShape::Tap,
        }
    }

    pub fn received_status(&self, status: OperationStatus) {
        match self {
            Callback::Status(cb) => cb.received_status(status),
            Callback::Get(cb) => cb.received_status(status),
            Callback::Gets(cb) => cb.received_status(status),
            Callback::ReplicaGet(cb) => cb.received_status(status),
            Callback::Store(cb) => cb.received_status(status),
            Callback::Stats(cb) => cb.received_status(status),
            Callback::Config(cb) => cb.received_status(status),
            Callback::Tap(cb) => cb.received_status(status),
        }
    }

    pub fn complete(&self) {
        match self {
            Callback::Status(cb) => cb.complete(),
            Callback::Get(cb) => cb.complete(),
            Callback::Gets(cb) => cb.complete(),
            Callback::ReplicaGet(cb) => cb.complete(),
            Callback::Store(cb) => cb.complete(),
            Callback::Stats(cb) => cb.complete(),
            Callback::Config(cb) => cb.complete(),
            Callback::Tap(cb) => cb.complete(),
        }
    }

    /// Deliver one retrieved value. Shapes that carry no values ignore it.
    pub(crate) fn got_value(&self, key: &[u8], flags: u32, cas: Option<u64>, data: Bytes) {
        match self {
            Callback::Get(cb) => cb.got_data(key, flags, data),
            Callback::Gets(cb) => cb.got_data(key, flags, cas.unwrap_or(0), data),
            Callback::ReplicaGet(cb) => cb.got_data(key, flags, data),
            _ => {}
        }
    }

    pub(crate) fn got_cas(&self, key: &[u8], cas: u64) {
        if let Callback::Store(cb) = self {
            cb.got_data(key, cas);
        }
    }

    pub(crate) fn got_stat(&self, name: &str, value: &str) {
        if let Callback::Stats(cb) = self {
            cb.got_stat(name, value);
        }
    }

    pub(crate) fn got_config(&self, flags: u32, data: Bytes) {
        if let Callback::Config(cb) = self {
            cb.got_config(flags, data);
        }
    }

    pub(crate) fn got_tap_message(&self, message: TapMessage) {
        if let Callback::Tap(cb) = self {
            cb.got_message(message);
        }
    }

    /// View this callback as a [`GetsCallback`].
    ///
    /// A `Gets` callback is returned as is; any other shape is wrapped so
    /// that values reach it through [`Callback::got_value`].
    pub fn into_gets(self) -> Arc<dyn GetsCallback> {
        match self {
            Callback::Gets(cb) => cb,
            other => Arc::new(GetsAdapter(other)),
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Callback").field(&self.shape()).finish()
    }
}

struct GetsAdapter(Callback);

impl OperationCallback for GetsAdapter {
    fn received_status(&self, status: OperationStatus) {
        self.0.received_status(status);
    }

    fn complete(&self) {
        self.0.complete();
    }
}

impl GetsCallback for GetsAdapter {
    fn got_data(&self, key: &[u8], flags: u32, cas: u64, data: Bytes) {
        self.0.got_value(key, flags, Some(cas), data);
    }
}
