//! SASL AUTH / STEP operation.

use bytes::Bytes;
use protocol_memcache::ParseError;
use protocol_memcache::binary::{BinaryRequest, Opcode, Packet, Status};

use super::SharedMechanism;
use crate::callback::Callback;
use crate::error::Error;
use crate::operation::{Operation, OperationCore, OperationHandle, OperationKind, OperationState};
use crate::status::{OperationStatus, StatusCode};

/// Which half of the handshake an operation carries.
#[derive(Debug, Clone)]
pub(crate) enum SaslStage {
    /// First message: the mechanism's initial response, if any.
    Auth,
    /// Answer to a server challenge.
    Step { challenge: Bytes },
}

/// One round of a SASL handshake.
///
/// A response with status `0x21` completes this operation successfully and
/// carries the next challenge; the task then issues a `Step`. Status `0`
/// ends the handshake.
pub(crate) struct SaslOperation {
    core: OperationCore,
    stage: SaslStage,
    mechanism: SharedMechanism,
}

impl SaslOperation {
    pub(crate) fn new(stage: SaslStage, mechanism: SharedMechanism, callback: Callback) -> Self {
        let kind = match stage {
            SaslStage::Auth => OperationKind::SaslAuth,
            SaslStage::Step { .. } => OperationKind::SaslStep,
        };
        Self {
            core: OperationCore::new(kind, vec![], callback),
            stage,
            mechanism,
        }
    }

    fn opcode(&self) -> Opcode {
        match self.stage {
            SaslStage::Auth => Opcode::SaslAuth,
            SaslStage::Step { .. } => Opcode::SaslStep,
        }
    }
}

impl Operation for SaslOperation {
    fn kind(&self) -> OperationKind {
        self.core.kind()
    }

    fn opaque(&self) -> u32 {
        self.core.opaque()
    }

    fn state(&self) -> OperationState {
        self.core.state()
    }

    /// Evaluate the mechanism and pack its name (key) and response (value).
    /// A failed evaluation also completes the operation with an auth error.
    fn initialize(&mut self) -> Result<(), Error> {
        let (name, response) = {
            let mut mechanism = self.mechanism.lock();
            let response = match &self.stage {
                SaslStage::Auth if mechanism.has_initial_response() => {
                    mechanism.evaluate_challenge(&[])
                }
                SaslStage::Auth => Ok(Vec::new()),
                SaslStage::Step { challenge } => mechanism.evaluate_challenge(challenge),
            };
            (mechanism.mechanism_name().to_string(), response)
        };

        match response {
            Ok(response) => {
                let request = BinaryRequest::sasl(self.opcode(), &name, response, self.opaque());
                self.core.begin_writing(request.to_bytes())
            }
            Err(e) => {
                self.core
                    .finish(OperationStatus::failure(StatusCode::AuthError, e.to_string()));
                Err(e.into())
            }
        }
    }

    fn write_buffer(&self) -> &[u8] {
        self.core.buffer()
    }

    fn writing_complete(&mut self) {
        self.core.writing_complete();
    }

    fn read_from(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let (packet, consumed) = Packet::parse(data)?;
        if !packet.is_response() {
            return Err(ParseError::Protocol("unexpected request packet"));
        }
        if packet.opaque != self.core.opaque() {
            return Err(ParseError::Protocol("opaque mismatch"));
        }
        self.core.set_error_code(packet.status);

        let status = match Status::from_u16(packet.status) {
            Some(Status::AuthContinue) => OperationStatus::new(
                true,
                StatusCode::AuthContinue,
                Bytes::copy_from_slice(packet.value),
            ),
            Some(Status::NoError) => OperationStatus::success(""),
            _ => OperationStatus::from_binary(packet.status, packet.value),
        };
        self.core.finish(status);
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
