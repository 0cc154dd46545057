use std::io;

use thiserror::Error;

use crate::factory::Protocol;

/// Errors returned synchronously by factories, operations and the auth monitor.
///
/// Server-side failures never surface here; they reach the operation's
/// callback as an [`OperationStatus`](crate::OperationStatus).
#[derive(Debug, Error)]
pub enum Error {
    /// The command has no encoding in the selected protocol.
    #[error("{command} is not supported by the {protocol} protocol")]
    Unsupported {
        command: &'static str,
        protocol: Protocol,
    },
    /// A malformed key or argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// SASL mechanism lookup or evaluation failed.
    #[error("sasl: {0}")]
    Sasl(#[from] SaslError),
    /// Response bytes could not be decoded.
    #[error("protocol error: {0}")]
    Parse(#[from] protocol_memcache::ParseError),
    /// The authentication thread could not be started.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while selecting or running a SASL mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaslError {
    /// No provider produced a client for the requested mechanisms.
    #[error("SaslClientFactory implementation not found")]
    MechanismUnavailable,
    /// A provider failed while creating a mechanism.
    #[error("provider error: {0}")]
    Provider(String),
    /// The mechanism could not answer a challenge.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}
