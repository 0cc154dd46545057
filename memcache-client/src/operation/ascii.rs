//! ASCII protocol operations.

use bytes::Bytes;
use protocol_memcache::{ParseError, Response};

use super::{Operation, OperationCore, OperationHandle, OperationKind, OperationState};
use crate::callback::Callback;
use crate::error::Error;
use crate::status::{OperationStatus, StatusCode};

/// One ASCII command. The response is decoded according to the kind.
pub(crate) struct AsciiOperation {
    core: OperationCore,
    request: Bytes,
}

impl AsciiOperation {
    pub(crate) fn new(
        kind: OperationKind,
        keys: Vec<Bytes>,
        request: Bytes,
        callback: Callback,
    ) -> Self {
        Self {
            core: OperationCore::new(kind, keys, callback),
            request,
        }
    }

    /// Stats arrive as one `STAT` line per entry followed by `END`.
    fn read_stats(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let mut consumed = 0;
        loop {
            match Response::parse(&data[consumed..]) {
                Ok((Response::Stat { name, value }, n)) => {
                    consumed += n;
                    self.core.deliver(|cb| {
                        cb.got_stat(
                            &String::from_utf8_lossy(&name),
                            &String::from_utf8_lossy(&value),
                        )
                    });
                }
                Ok((response, n)) => {
                    self.handle_response(response)?;
                    return Ok(consumed + n);
                }
                Err(ParseError::Incomplete) if consumed > 0 => return Ok(consumed),
                Err(e) => return Err(e),
            }
        }
    }

    fn handle_response(&self, response: Response) -> Result<(), ParseError> {
        if let Some(status) = OperationStatus::from_ascii_failure(&response) {
            self.core.finish(status);
            return Ok(());
        }

        use OperationKind::*;
        let kind = self.core.kind();
        let status = match (kind, response) {
            (kind, Response::Values(values)) if kind.is_retrieval() => {
                self.core.deliver(|cb| {
                    for value in values {
                        cb.got_value(&value.key, value.flags, value.cas, Bytes::from(value.data));
                    }
                });
                OperationStatus::success("END")
            }
            (Stats, Response::Values(values)) if values.is_empty() => {
                OperationStatus::success("END")
            }
            (GetConfig, Response::Config { flags, data, .. }) => {
                self.core.deliver(|cb| cb.got_config(flags, Bytes::from(data)));
                OperationStatus::success("END")
            }
            (GetConfig, Response::Values(values)) if values.is_empty() => {
                OperationStatus::failure(StatusCode::NotFound, "END")
            }
            (Store(_) | Cas | Concatenate(_) | SetConfig, Response::Stored) => {
                OperationStatus::success("STORED")
            }
            (Delete | DeleteConfig, Response::Deleted) => OperationStatus::success("DELETED"),
            (Touch, Response::Touched) => OperationStatus::success("TOUCHED"),
            (Mutate(_), Response::Numeric(value)) => OperationStatus::success(value.to_string()),
            (Version | Noop, Response::Version(version)) => OperationStatus::success(version),
            (Flush | RefreshCertificate | SetConfig | DeleteConfig, Response::Ok) => {
                OperationStatus::success("OK")
            }
            (kind, response) => {
                tracing::debug!(?kind, ?response, "unexpected ascii response");
                self.core.finish(OperationStatus::failure(
                    StatusCode::ClientError,
                    "unexpected response",
                ));
                return Err(ParseError::Protocol("unexpected response"));
            }
        };
        self.core.finish(status);
        Ok(())
    }
}

impl Operation for AsciiOperation {
    fn kind(&self) -> OperationKind {
        self.core.kind()
    }

    fn opaque(&self) -> u32 {
        self.core.opaque()
    }

    fn state(&self) -> OperationState {
        self.core.state()
    }

    fn initialize(&mut self) -> Result<(), Error> {
        let request = self.request.clone();
        self.core.begin_writing(request)
    }

    fn write_buffer(&self) -> &[u8] {
        self.core.buffer()
    }

    fn writing_complete(&mut self) {
        self.core.writing_complete();
    }

    fn read_from(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        if self.core.kind() == OperationKind::Stats {
            return self.read_stats(data);
        }
        let (response, consumed) = Response::parse(data)?;
        self.handle_response(response)?;
        Ok(consumed)
    }

    fn handle(&self) -> OperationHandle {
        self.core.handle()
    }

    fn keys(&self) -> &[Bytes] {
        self.core.keys()
    }

    fn callback(&self) -> &Callback {
        self.core.callback()
    }
}
