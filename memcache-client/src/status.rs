//! Operation status delivered to callbacks.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use protocol_memcache::Response;
use protocol_memcache::binary::Status;

/// Classified outcome of a server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    /// SASL handshake needs another round; the message carries the challenge.
    AuthContinue,
    NotFound,
    Exists,
    TooBig,
    InvalidArguments,
    NotStored,
    DeltaBadValue,
    NotMyVbucket,
    AuthError,
    Range,
    UnknownCommand,
    OutOfMemory,
    NotSupported,
    Internal,
    Busy,
    TemporaryFailure,
    ClientError,
    ServerError,
    Cancelled,
    /// A binary status this client does not know.
    Other(u16),
}

impl StatusCode {
    /// Map a raw binary protocol status.
    pub fn from_binary(status: u16) -> Self {
        match Status::from_u16(status) {
            Some(Status::NoError) => StatusCode::Success,
            Some(Status::KeyNotFound) => StatusCode::NotFound,
            Some(Status::KeyExists) => StatusCode::Exists,
            Some(Status::ValueTooLarge) => StatusCode::TooBig,
            Some(Status::InvalidArguments) => StatusCode::InvalidArguments,
            Some(Status::ItemNotStored) => StatusCode::NotStored,
            Some(Status::NonNumericValue) => StatusCode::DeltaBadValue,
            Some(Status::WrongVbucket) => StatusCode::NotMyVbucket,
            Some(Status::AuthError) => StatusCode::AuthError,
            Some(Status::AuthContinue) => StatusCode::AuthContinue,
            Some(Status::OutOfRange) => StatusCode::Range,
            Some(Status::UnknownCommand) => StatusCode::UnknownCommand,
            Some(Status::OutOfMemory) => StatusCode::OutOfMemory,
            Some(Status::NotSupported) => StatusCode::NotSupported,
            Some(Status::InternalError) => StatusCode::Internal,
            Some(Status::Busy) => StatusCode::Busy,
            Some(Status::TempFailure) => StatusCode::TemporaryFailure,
            None => StatusCode::Other(status),
        }
    }
}

/// Status reported to an [`OperationCallback`](crate::OperationCallback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    success: bool,
    code: StatusCode,
    message: Bytes,
}

impl OperationStatus {
    pub fn new(success: bool, code: StatusCode, message: impl Into<Bytes>) -> Self {
        Self {
            success,
            code,
            message: message.into(),
        }
    }

    /// A successful status carrying `message`.
    pub fn success(message: impl Into<Bytes>) -> Self {
        Self::new(true, StatusCode::Success, message)
    }

    /// A failed status.
    pub fn failure(code: StatusCode, message: impl Into<Bytes>) -> Self {
        Self::new(false, code, message)
    }

    /// The status delivered when an operation is cancelled.
    pub fn cancelled() -> Self {
        Self::failure(StatusCode::Cancelled, Bytes::from_static(b"cancelled"))
    }

    /// Status for a binary response. Failures without a body are described
    /// by the status table text.
    pub fn from_binary(status: u16, body: &[u8]) -> Self {
        let code = StatusCode::from_binary(status);
        match code {
            StatusCode::Success => Self::success(Bytes::copy_from_slice(body)),
            StatusCode::AuthContinue => Self::new(true, code, Bytes::copy_from_slice(body)),
            _ if !body.is_empty() => Self::failure(code, Bytes::copy_from_slice(body)),
            _ => {
                let text = Status::from_u16(status).map_or("Unknown status", |s| s.as_str());
                Self::failure(code, Bytes::from_static(text.as_bytes()))
            }
        }
    }

    /// Failure status for an ASCII response that is not the expected success.
    /// Returns `None` for responses without a failure meaning.
    pub fn from_ascii_failure(response: &Response) -> Option<Self> {
        let status = match response {
            Response::NotFound => Self::failure(StatusCode::NotFound, "NOT_FOUND"),
            Response::NotStored => Self::failure(StatusCode::NotStored, "NOT_STORED"),
            Response::Exists => Self::failure(StatusCode::Exists, "EXISTS"),
            Response::Error => Self::failure(StatusCode::UnknownCommand, "ERROR"),
            Response::ClientError(msg) => {
                Self::failure(StatusCode::ClientError, Bytes::copy_from_slice(msg))
            }
            Response::ServerError(msg) => {
                Self::failure(StatusCode::ServerError, Bytes::copy_from_slice(msg))
            }
            _ => return None,
        };
        Some(status)
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.success
    }

    #[inline]
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// Raw message bytes (a SASL challenge, a version string, a counter...).
    #[inline]
    pub fn message(&self) -> &Bytes {
        &self.message
    }

    /// The message as text, replacing invalid UTF-8.
    pub fn message_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{OperationStatus success={} code={:?}: {}}}",
            self.success,
            self.code,
            self.message_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_binary_known_and_unknown() {
        assert_eq!(StatusCode::from_binary(0x0000), StatusCode::Success);
        assert_eq!(StatusCode::from_binary(0x0001), StatusCode::NotFound);
        assert_eq!(StatusCode::from_binary(0x0020), StatusCode::AuthError);
        assert_eq!(StatusCode::from_binary(0x0021), StatusCode::AuthContinue);
        assert_eq!(StatusCode::from_binary(0x0086), StatusCode::TemporaryFailure);
        assert_eq!(StatusCode::from_binary(0x1234), StatusCode::Other(0x1234));
    }

    #[test]
    fn test_auth_continue_is_success_with_payload() {
        let status = OperationStatus::from_binary(0x21, b"challenge");
        assert!(status.is_success());
        assert_eq!(status.code(), StatusCode::AuthContinue);
        assert_eq!(&status.message()[..], b"challenge");
    }

    #[test]
    fn test_failure_without_body_uses_status_text() {
        let status = OperationStatus::from_binary(0x01, b"");
        assert!(!status.is_success());
        assert_eq!(status.message_str(), "Key not found");

        let status = OperationStatus::from_binary(0x20, b"Auth failure");
        assert_eq!(status.code(), StatusCode::AuthError);
        assert_eq!(status.message_str(), "Auth failure");
    }

    #[test]
    fn test_ascii_failures() {
        let status = OperationStatus::from_ascii_failure(&Response::Exists).unwrap();
        assert_eq!(status.code(), StatusCode::Exists);
        let status =
            OperationStatus::from_ascii_failure(&Response::ServerError(b"oom".to_vec())).unwrap();
        assert_eq!(status.code(), StatusCode::ServerError);
        assert_eq!(status.message_str(), "oom");
        assert!(OperationStatus::from_ascii_failure(&Response::Stored).is_none());
    }

    #[test]
    fn test_cancelled() {
        let status = OperationStatus::cancelled();
        assert!(!status.is_success());
        assert_eq!(status.code(), StatusCode::Cancelled);
    }
}
