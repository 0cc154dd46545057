use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::thread::AuthTask;
use super::{AuthDescriptor, AuthHandle, AuthOutcome};
use crate::config::AuthConfig;
use crate::connection::{Connection, Node, NodeId};
use crate::error::Error;
use crate::factory::OperationFactory;
use crate::sasl::MechanismRegistry;

/// Tracks the authentication task of every node.
///
/// Starting a task for a node interrupts the node's previous task. The
/// replacement happens under one lock, so a node never has two live tasks
/// registered.
pub struct AuthThreadMonitor {
    node_map: Mutex<HashMap<NodeId, AuthHandle>>,
    /// Interrupted tasks that may still be running.
    retired: Mutex<Vec<AuthHandle>>,
    registry: Arc<MechanismRegistry>,
    config: AuthConfig,
}

impl AuthThreadMonitor {
    pub fn new() -> Self {
        Self::with_config(AuthConfig::default())
    }

    /// A monitor using the built-in mechanisms.
    pub fn with_config(config: AuthConfig) -> Self {
        Self {
            node_map: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            registry: Arc::new(MechanismRegistry::with_defaults()),
            config,
        }
    }

    /// Replace the mechanism registry used by tasks started from now on.
    pub fn with_registry(mut self, registry: MechanismRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Start authenticating `node`, interrupting any task already running
    /// for it. The handshake follows `factory.protocol()`.
    pub fn auth_connection(
        &self,
        conn: Arc<dyn Connection>,
        factory: Arc<dyn OperationFactory>,
        descriptor: Arc<AuthDescriptor>,
        node: Arc<dyn Node>,
    ) -> Result<(), Error> {
        let id = node.id().clone();
        let mut node_map = self.node_map.lock();

        if let Some(previous) = node_map.remove(&id) {
            debug!(node = %id, "interrupting previous authentication");
            previous.interrupt();
            self.retire(previous);
        }

        let task = AuthTask {
            conn,
            factory,
            descriptor,
            node,
            registry: self.registry.clone(),
            config: self.config.clone(),
        };
        let handle = task.spawn()?;
        debug!(node = %id, "authentication started");
        node_map.insert(id, handle);
        Ok(())
    }

    /// Interrupt every registered task and forget them.
    pub fn interrupt_all_pending_auth(&self) {
        let mut node_map = self.node_map.lock();
        for (id, handle) in node_map.drain() {
            if !handle.is_finished() {
                debug!(node = %id, "interrupting authentication");
            }
            handle.interrupt();
            self.retire(handle);
        }
    }

    /// Number of registered tasks that are still running.
    pub fn pending_count(&self) -> usize {
        self.node_map
            .lock()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub fn is_pending(&self, node: &NodeId) -> bool {
        self.node_map
            .lock()
            .get(node)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for every registered and retired task that has not been
    /// discarded. Tasks that panicked are left out.
    pub fn join_all(&self) -> Vec<(NodeId, AuthOutcome)> {
        let handles: Vec<AuthHandle> = {
            let mut node_map = self.node_map.lock();
            let mut retired = self.retired.lock();
            retired.drain(..).chain(node_map.drain().map(|(_, h)| h)).collect()
        };
        handles
            .into_iter()
            .filter_map(|handle| {
                let id = handle.node().clone();
                handle.join().map(|outcome| (id, outcome))
            })
            .collect()
    }

    /// Keep an interrupted task until it exits. Finished ones are dropped.
    fn retire(&self, handle: AuthHandle) {
        let mut retired = self.retired.lock();
        retired.retain(|h| !h.is_finished());
        retired.push(handle);
    }
}

impl Default for AuthThreadMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AuthThreadMonitor {
    fn drop(&mut self) {
        self.interrupt_all_pending_auth();
    }
}

impl std::fmt::Debug for AuthThreadMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthThreadMonitor")
            .field("pending", &self.pending_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
