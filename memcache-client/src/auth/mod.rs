//! Per-node authentication.
//!
//! Every node that needs credentials gets an authentication task running on
//! its own named thread. The task submits the handshake operations through
//! the node's [`Connection`](crate::Connection), waits for each to finish and
//! calls [`Node::auth_complete`](crate::Node::auth_complete) on success.
//! [`AuthThreadMonitor`] keeps at most one live task per node.

mod monitor;
mod thread;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

pub use monitor::AuthThreadMonitor;

use crate::connection::NodeId;
use crate::sasl::{CredentialCallback, PlainCredentials, PlainMechanism};
use crate::status::OperationStatus;

/// Credentials and mechanism preferences for authenticating nodes.
///
/// The failure counter is shared by every task using the same descriptor.
pub struct AuthDescriptor {
    mechanisms: Option<Vec<String>>,
    credentials: Arc<dyn CredentialCallback>,
    authorization_id: Option<String>,
    properties: HashMap<String, String>,
    allowed_auth_attempts: Option<u32>,
    failed_attempts: AtomicU32,
}

impl AuthDescriptor {
    /// `mechanisms` of `None` asks the server for its list first.
    pub fn new(mechanisms: Option<Vec<String>>, credentials: Arc<dyn CredentialCallback>) -> Self {
        Self {
            mechanisms,
            credentials,
            authorization_id: None,
            properties: HashMap::new(),
            allowed_auth_attempts: None,
            failed_attempts: AtomicU32::new(0),
        }
    }

    /// `PLAIN` with a fixed name and password.
    pub fn typical(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(
            Some(vec![PlainMechanism::NAME.to_string()]),
            Arc::new(PlainCredentials::new(name, password)),
        )
    }

    pub fn with_authorization_id(mut self, id: impl Into<String>) -> Self {
        self.authorization_id = Some(id.into());
        self
    }

    /// A property passed to mechanism providers.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Stop retrying after `attempts` failed handshakes. Unlimited by default.
    pub fn with_allowed_attempts(mut self, attempts: u32) -> Self {
        self.allowed_auth_attempts = Some(attempts);
        self
    }

    pub fn mechanisms(&self) -> Option<&[String]> {
        self.mechanisms.as_deref()
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialCallback> {
        &self.credentials
    }

    pub fn authorization_id(&self) -> Option<&str> {
        self.authorization_id.as_deref()
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::Acquire)
    }

    /// Count one failed handshake and report whether the limit is reached.
    pub fn auth_threshold_reached(&self) -> bool {
        let failures = self.failed_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        self.allowed_auth_attempts
            .is_some_and(|allowed| failures >= allowed)
    }
}

impl std::fmt::Debug for AuthDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthDescriptor")
            .field("mechanisms", &self.mechanisms)
            .field("authorization_id", &self.authorization_id)
            .field("allowed_auth_attempts", &self.allowed_auth_attempts)
            .field("failed_attempts", &self.failed_attempts())
            .finish_non_exhaustive()
    }
}

/// How an authentication task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The server accepted the credentials.
    Authenticated,
    /// The last handshake was rejected and no retry is allowed.
    Failed(OperationStatus),
    /// The task was interrupted, usually by a newer task for the same node.
    Interrupted,
    /// The connection shut down while the task was waiting.
    ConnectionShutdown,
    /// No provider could create one of the acceptable mechanisms.
    MechanismUnavailable,
}

/// Handle to a running authentication task.
pub struct AuthHandle {
    node: NodeId,
    interrupted: Arc<AtomicBool>,
    cancel_tx: Sender<()>,
    thread: JoinHandle<AuthOutcome>,
}

impl AuthHandle {
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Ask the task to stop. The task cancels its in-flight operation and
    /// exits without retrying.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        let _ = self.cancel_tx.try_send(());
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the task. Returns `None` if the task panicked.
    pub fn join(self) -> Option<AuthOutcome> {
        self.thread.join().ok()
    }
}

impl std::fmt::Debug for AuthHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthHandle")
            .field("node", &self.node)
            .field("interrupted", &self.is_interrupted())
            .field("finished", &self.is_finished())
            .finish()
    }
}
