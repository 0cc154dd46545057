//! Operations and their life cycle.
//!
//! An operation is created by an [`OperationFactory`](crate::OperationFactory),
//! handed to a [`Connection`](crate::Connection) and driven through
//!
//! ```text
//! Initialize -> Writing -> Reading -> Complete
//!      \___________\__________\_____> Cancelled
//! ```
//!
//! Exactly one terminal transition happens. Its status and `complete()` are
//! delivered to the callback under the operation's state lock, so a
//! concurrent [`OperationHandle::cancel`] and a response decode never both
//! report.

mod ascii;
mod binary;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use protocol_memcache::ParseError;

pub(crate) use ascii::AsciiOperation;
pub(crate) use binary::BinaryOperation;

use crate::callback::Callback;
use crate::error::Error;
use crate::status::OperationStatus;

/// Storage command variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreType {
    Set,
    Add,
    Replace,
}

/// Append or prepend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcatenationType {
    Append,
    Prepend,
}

/// Counter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutator {
    Incr,
    Decr,
}

/// What an operation does on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Get,
    Gets,
    GetAndTouch,
    GetLocked,
    ReplicaGet,
    ReplicaGets,
    Delete,
    Store(StoreType),
    Cas,
    Concatenate(ConcatenationType),
    Touch,
    Mutate(Mutator),
    Flush,
    Version,
    Noop,
    Stats,
    KeyStats,
    GetConfig,
    SetConfig,
    DeleteConfig,
    RefreshCertificate,
    TapBackfill,
    TapCustom,
    TapAck,
    TapDump,
    SaslMechs,
    SaslAuth,
    SaslStep,
}

impl OperationKind {
    /// Returns true for the kinds that retrieve values by key.
    pub fn is_retrieval(&self) -> bool {
        matches!(
            self,
            OperationKind::Get
                | OperationKind::Gets
                | OperationKind::GetAndTouch
                | OperationKind::GetLocked
                | OperationKind::ReplicaGet
                | OperationKind::ReplicaGets
        )
    }

    /// Returns true for the TAP stream kinds that receive pushed messages.
    pub fn is_tap_stream(&self) -> bool {
        matches!(
            self,
            OperationKind::TapBackfill | OperationKind::TapCustom | OperationKind::TapDump
        )
    }
}

/// Life cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    Initialize,
    Writing,
    Reading,
    Complete,
    Cancelled,
}

impl OperationState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Complete | OperationState::Cancelled)
    }
}

/// A single request/response exchange with one server.
pub trait Operation: Send {
    fn kind(&self) -> OperationKind;

    /// Correlation token carried in binary request headers.
    fn opaque(&self) -> u32;

    fn state(&self) -> OperationState;

    /// Build the wire request and move to `Writing`.
    fn initialize(&mut self) -> Result<(), Error>;

    /// The serialized request. Empty before `initialize`.
    fn write_buffer(&self) -> &[u8];

    /// The request has been fully written; move to `Reading`.
    fn writing_complete(&mut self);

    /// Decode response bytes, returning how many were consumed.
    ///
    /// [`ParseError::Incomplete`] means nothing was consumed and more bytes
    /// are needed.
    fn read_from(&mut self, data: &[u8]) -> Result<usize, ParseError>;

    /// A handle that can cancel or inspect this operation from any thread.
    fn handle(&self) -> OperationHandle;

    fn keys(&self) -> &[Bytes];

    fn callback(&self) -> &Callback;

    /// Replica index for replica reads.
    fn replica_index(&self) -> Option<u16> {
        None
    }

    fn cancel(&self) {
        self.handle().cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.handle().is_cancelled()
    }

    /// Raw binary status of the response, once a header has been parsed.
    fn error_code(&self) -> Option<u16> {
        self.handle().error_code()
    }
}

static NEXT_OPAQUE: AtomicU32 = AtomicU32::new(1);

/// Next process-wide opaque value.
pub(crate) fn next_opaque() -> u32 {
    NEXT_OPAQUE.fetch_add(1, Ordering::Relaxed)
}

struct Shared {
    kind: OperationKind,
    opaque: u32,
    callback: Callback,
    inner: Mutex<Inner>,
}

struct Inner {
    state: OperationState,
    error_code: Option<u16>,
}

/// Cloneable, thread-safe view of an operation.
#[derive(Clone)]
pub struct OperationHandle {
    shared: Arc<Shared>,
}

impl OperationHandle {
    pub fn kind(&self) -> OperationKind {
        self.shared.kind
    }

    pub fn opaque(&self) -> u32 {
        self.shared.opaque
    }

    pub fn state(&self) -> OperationState {
        self.shared.inner.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == OperationState::Cancelled
    }

    pub fn error_code(&self) -> Option<u16> {
        self.shared.inner.lock().error_code
    }

    /// Cancel the operation. If it was not yet terminal, the callback
    /// receives a `Cancelled` status and `complete()`.
    pub fn cancel(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.state = OperationState::Cancelled;
        self.shared.callback.received_status(OperationStatus::cancelled());
        self.shared.callback.complete();
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("kind", &self.shared.kind)
            .field("opaque", &self.shared.opaque)
            .field("state", &self.state())
            .finish()
    }
}

/// State shared by every operation implementation.
pub(crate) struct OperationCore {
    shared: Arc<Shared>,
    keys: Vec<Bytes>,
    buffer: Bytes,
}

impl OperationCore {
    pub(crate) fn new(kind: OperationKind, keys: Vec<Bytes>, callback: Callback) -> Self {
        Self::with_opaque(kind, next_opaque(), keys, callback)
    }

    pub(crate) fn with_opaque(
        kind: OperationKind,
        opaque: u32,
        keys: Vec<Bytes>,
        callback: Callback,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                kind,
                opaque,
                callback,
                inner: Mutex::new(Inner {
                    state: OperationState::Initialize,
                    error_code: None,
                }),
            }),
            keys,
            buffer: Bytes::new(),
        }
    }

    pub(crate) fn kind(&self) -> OperationKind {
        self.shared.kind
    }

    pub(crate) fn opaque(&self) -> u32 {
        self.shared.opaque
    }

    pub(crate) fn state(&self) -> OperationState {
        self.shared.inner.lock().state
    }

    pub(crate) fn keys(&self) -> &[Bytes] {
        &self.keys
    }

    pub(crate) fn callback(&self) -> &Callback {
        &self.shared.callback
    }

    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn handle(&self) -> OperationHandle {
        OperationHandle {
            shared: self.shared.clone(),
        }
    }

    /// Install the serialized request and move to `Writing`. A cancelled
    /// operation keeps its state and gets no buffer.
    pub(crate) fn begin_writing(&mut self, buffer: Bytes) -> Result<(), Error> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            OperationState::Initialize => {
                inner.state = OperationState::Writing;
                drop(inner);
                self.buffer = buffer;
                Ok(())
            }
            OperationState::Cancelled => Ok(()),
            state => Err(Error::InvalidArgument(format!(
                "operation {} initialized twice (state {state:?})",
                self.shared.opaque
            ))),
        }
    }

    pub(crate) fn writing_complete(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == OperationState::Writing {
            inner.state = OperationState::Reading;
        }
    }

    pub(crate) fn set_error_code(&self, code: u16) {
        self.shared.inner.lock().error_code = Some(code);
    }

    /// Run `deliver` against the callback unless the operation is terminal.
    ///
    /// The callback runs with the state lock held and must not call back
    /// into this operation.
    pub(crate) fn deliver(&self, deliver: impl FnOnce(&Callback)) -> bool {
        let inner = self.shared.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        deliver(&self.shared.callback);
        true
    }

    /// Report the final status and complete, unless already terminal.
    pub(crate) fn finish(&self, status: OperationStatus) {
        let mut inner = self.shared.inner.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.state = OperationState::Complete;
        self.shared.callback.received_status(status);
        self.shared.callback.complete();
    }
}
