//! Command and authentication core of a memcached client.
//!
//! This crate turns logical cache commands into protocol operations and
//! authenticates server nodes. It performs no I/O of its own: a transport
//! implements [`Connection`] and drives each [`Operation`] through
//! `initialize`, `write_buffer` / `writing_complete` and `read_from` until it
//! reaches a terminal state. Results are delivered through callbacks.
//!
//! - [`AsciiOperationFactory`] and [`BinaryOperationFactory`] build
//!   operations for the text and binary protocols.
//! - [`OperationFactory::clone_get`] splits a multi-key get into single-key
//!   operations whose results are merged back into one callback.
//! - [`AuthThreadMonitor`] runs one authentication task per node, using SASL
//!   on the binary protocol.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use memcache_client::{
//!     AsciiOperationFactory, GetCallback, OperationCallback, OperationFactory, OperationStatus,
//! };
//!
//! struct Print;
//!
//! impl OperationCallback for Print {
//!     fn received_status(&self, status: OperationStatus) {
//!         println!("{status}");
//!     }
//!
//!     fn complete(&self) {}
//! }
//!
//! impl GetCallback for Print {
//!     fn got_data(&self, key: &[u8], _flags: u32, data: Bytes) {
//!         println!("{:?} = {:?}", key, data);
//!     }
//! }
//!
//! let factory = AsciiOperationFactory::new();
//! let mut op = factory.get(b"mykey", Arc::new(Print)).unwrap();
//! op.initialize().unwrap();
//! assert_eq!(op.write_buffer(), b"get mykey\r\n");
//! ```

pub mod auth;
pub mod callback;
pub mod factory;
pub mod operation;
pub mod sasl;

mod config;
mod connection;
mod error;
mod status;

pub use auth::{AuthDescriptor, AuthHandle, AuthOutcome, AuthThreadMonitor};
pub use callback::{
    Callback, CallbackShape, ConfigCallback, GetCallback, GetsCallback, MultiCallback,
    MultiGetCallback, MultiGetsCallback, MultiReplicaGetCallback, OperationCallback,
    ReplicaGetCallback, StatsCallback, StoreCallback, TapCallback, TapMessage,
};
pub use config::AuthConfig;
pub use connection::{Connection, Node, NodeId};
pub use error::{Error, SaslError};
pub use factory::{
    AsciiOperationFactory, BinaryOperationFactory, OperationFactory, OperationResult, Protocol,
    TapRequest,
};
pub use operation::{
    ConcatenationType, Mutator, Operation, OperationHandle, OperationKind, OperationState,
    StoreType,
};
pub use sasl::{
    CredentialCallback, MechanismRegistry, MechanismRequest, PlainCredentials, PlainMechanism,
    PlainProvider, SaslMechanism, SaslMechanismProvider, SharedMechanism,
};
pub use status::{OperationStatus, StatusCode};
