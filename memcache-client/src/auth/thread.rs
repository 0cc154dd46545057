//! The authentication task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, select};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{AuthDescriptor, AuthHandle, AuthOutcome};
use crate::callback::{OperationCallback, StoreCallback};
use crate::config::AuthConfig;
use crate::connection::{Connection, Node};
use crate::error::Error;
use crate::factory::{OperationFactory, OperationResult, Protocol};
use crate::operation::{Operation, StoreType};
use crate::sasl::{MechanismRegistry, MechanismRequest, SharedMechanism};
use crate::status::{OperationStatus, StatusCode};

/// Key under which ASCII credentials are stored.
const ASCII_AUTH_KEY: &[u8] = b"ignore";

/// Reports the final status of one operation over a channel.
struct AuthCallback {
    status: Mutex<Option<OperationStatus>>,
    done: Sender<OperationStatus>,
}

impl AuthCallback {
    fn new() -> (Arc<Self>, Receiver<OperationStatus>) {
        let (done, rx) = crossbeam_channel::bounded(1);
        let callback = Arc::new(Self {
            status: Mutex::new(None),
            done,
        });
        (callback, rx)
    }
}

impl OperationCallback for AuthCallback {
    fn received_status(&self, status: OperationStatus) {
        *self.status.lock() = Some(status);
    }

    fn complete(&self) {
        let status = self.status.lock().take().unwrap_or_else(|| {
            OperationStatus::failure(StatusCode::ClientError, "completed without a status")
        });
        let _ = self.done.try_send(status);
    }
}

impl StoreCallback for AuthCallback {
    fn got_data(&self, _key: &[u8], _cas: u64) {}
}

enum Wait {
    Done(OperationStatus),
    Interrupted,
    Shutdown,
}

pub(super) struct AuthTask {
    pub(super) conn: Arc<dyn Connection>,
    pub(super) factory: Arc<dyn OperationFactory>,
    pub(super) descriptor: Arc<AuthDescriptor>,
    pub(super) node: Arc<dyn Node>,
    pub(super) registry: Arc<MechanismRegistry>,
    pub(super) config: AuthConfig,
}

struct Running {
    task: AuthTask,
    interrupted: Arc<AtomicBool>,
    cancel_rx: Receiver<()>,
}

impl AuthTask {
    /// Start the task on a thread named `<prefix>-<node>`.
    pub(super) fn spawn(self) -> Result<AuthHandle, Error> {
        let node = self.node.id().clone();
        let interrupted = Arc::new(AtomicBool::new(false));
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);

        let running = Running {
            interrupted: interrupted.clone(),
            cancel_rx,
            task: self,
        };
        let thread = thread::Builder::new()
            .name(format!("{}-{node}", running.task.config.thread_name_prefix))
            .spawn(move || running.run())?;

        Ok(AuthHandle {
            node,
            interrupted,
            cancel_tx,
            thread,
        })
    }
}

impl Running {
    fn run(self) -> AuthOutcome {
        let node = self.task.node.id().clone();
        let start = Instant::now();

        let outcome = match self.task.factory.protocol() {
            Protocol::Ascii => self.run_ascii(),
            Protocol::Binary => self.run_binary(),
        };
        if outcome == AuthOutcome::Authenticated {
            self.task.node.auth_complete();
        }

        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed >= self.task.config.slow_auth_threshold {
            warn!(node = %node, elapsed_ms, outcome = ?outcome, "slow authentication");
        } else {
            debug!(node = %node, elapsed_ms, outcome = ?outcome, "authentication finished");
        }
        outcome
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Store `"<name> <password>"` under the well-known key.
    fn run_ascii(&self) -> AuthOutcome {
        let credentials = self.task.descriptor.credentials();
        let payload = Bytes::from(format!("{} {}", credentials.name(), credentials.password()));

        let (callback, rx) = AuthCallback::new();
        let op = self
            .task
            .factory
            .store(StoreType::Set, ASCII_AUTH_KEY, 0, 0, payload, callback);
        match self.submit(op, rx) {
            Ok(status) if status.is_success() => AuthOutcome::Authenticated,
            Ok(status) => {
                warn!(node = %self.task.node.id(), status = %status, "authentication failed");
                AuthOutcome::Failed(status)
            }
            Err(outcome) => outcome,
        }
    }

    /// SASL handshakes until one succeeds, the attempt limit is reached or
    /// the task is stopped.
    fn run_binary(&self) -> AuthOutcome {
        loop {
            if self.is_interrupted() {
                return AuthOutcome::Interrupted;
            }
            if self.task.conn.is_shut_down() {
                return AuthOutcome::ConnectionShutdown;
            }

            let status = match self.attempt() {
                Ok(()) => return AuthOutcome::Authenticated,
                Err(AuthOutcome::Failed(status)) => status,
                Err(outcome) => return outcome,
            };

            warn!(node = %self.task.node.id(), status = %status, "authentication failed");
            if self.task.descriptor.auth_threshold_reached() {
                warn!(
                    node = %self.task.node.id(),
                    attempts = self.task.descriptor.failed_attempts(),
                    "authentication attempt limit reached"
                );
                return AuthOutcome::Failed(status);
            }
            if self.pause() {
                return AuthOutcome::Interrupted;
            }
        }
    }

    fn attempt(&self) -> Result<(), AuthOutcome> {
        let mechanisms = match self.task.descriptor.mechanisms() {
            Some(mechanisms) => mechanisms.to_vec(),
            None => self.list_mechanisms()?,
        };

        let server_name = self.task.node.id().to_string();
        let request = MechanismRequest {
            mechanisms: &mechanisms,
            authorization_id: self.task.descriptor.authorization_id(),
            protocol: &self.task.config.protocol,
            server_name: &server_name,
            properties: self.task.descriptor.properties(),
            credentials: self.task.descriptor.credentials(),
        };
        let mechanism = match self.task.registry.create_mechanism(&request) {
            Ok(mechanism) => mechanism,
            Err(e) => {
                warn!(node = %server_name, error = %e, mechanisms = ?mechanisms, "no usable SASL mechanism");
                return Err(AuthOutcome::MechanismUnavailable);
            }
        };
        debug!(node = %server_name, mechanism = mechanism.mechanism_name(), "starting SASL handshake");

        self.handshake(Arc::new(Mutex::new(mechanism)))
    }

    /// Ask the server which mechanisms it offers.
    fn list_mechanisms(&self) -> Result<Vec<String>, AuthOutcome> {
        let (callback, rx) = AuthCallback::new();
        let op = self.task.factory.sasl_mechs(callback);
        let status = self.submit(op, rx)?;
        if !status.is_success() {
            return Err(AuthOutcome::Failed(status));
        }
        let mechanisms: Vec<String> = status
            .message_str()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        trace!(node = %self.task.node.id(), mechanisms = ?mechanisms, "server mechanisms");
        Ok(mechanisms)
    }

    /// AUTH, then one STEP per challenge until the server stops continuing.
    fn handshake(&self, mechanism: SharedMechanism) -> Result<(), AuthOutcome> {
        let (callback, mut rx) = AuthCallback::new();
        let mut op = self.task.factory.sasl_auth(mechanism.clone(), callback);
        loop {
            let status = self.submit(op, rx)?;
            if !status.is_success() {
                return Err(AuthOutcome::Failed(status));
            }
            if status.code() != StatusCode::AuthContinue {
                return Ok(());
            }

            trace!(node = %self.task.node.id(), "server challenge");
            let (callback, next_rx) = AuthCallback::new();
            rx = next_rx;
            op = self
                .task
                .factory
                .sasl_step(mechanism.clone(), status.message().clone(), callback);
        }
    }

    /// Queue an operation and wait for its final status.
    fn submit(
        &self,
        op: OperationResult,
        rx: Receiver<OperationStatus>,
    ) -> Result<OperationStatus, AuthOutcome> {
        let op = op.map_err(|e| {
            AuthOutcome::Failed(OperationStatus::failure(StatusCode::ClientError, e.to_string()))
        })?;
        match self.wait(op, rx) {
            Wait::Done(status) => Ok(status),
            Wait::Interrupted => Err(AuthOutcome::Interrupted),
            Wait::Shutdown => Err(AuthOutcome::ConnectionShutdown),
        }
    }

    fn wait(&self, op: Box<dyn Operation>, rx: Receiver<OperationStatus>) -> Wait {
        let handle = op.handle();
        self.task.conn.insert_operation(&self.task.node, op);

        loop {
            select! {
                recv(rx) -> status => {
                    return Wait::Done(status.unwrap_or_else(|_| {
                        OperationStatus::failure(StatusCode::ClientError, "operation dropped")
                    }));
                }
                recv(self.cancel_rx) -> _ => {
                    handle.cancel();
                    return Wait::Interrupted;
                }
                default(self.task.config.shutdown_poll_interval) => {
                    if self.is_interrupted() {
                        handle.cancel();
                        return Wait::Interrupted;
                    }
                    if self.task.conn.is_shut_down() {
                        handle.cancel();
                        return Wait::Shutdown;
                    }
                }
            }
        }
    }

    /// Sleep for the retry delay. Returns true if interrupted meanwhile.
    fn pause(&self) -> bool {
        select! {
            recv(self.cancel_rx) -> _ => true,
            default(self.task.config.retry_delay) => self.is_interrupted(),
        }
    }
}
