//! Collaborator interfaces implemented by the transport layer.

use std::fmt;
use std::sync::Arc;

use crate::operation::Operation;

/// Identity of a server node, used as a registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A server node as seen by the authentication machinery.
pub trait Node: Send + Sync {
    fn id(&self) -> &NodeId;

    /// The node finished authenticating and may release queued operations.
    fn auth_complete(&self);
}

/// The transport owning the per-node operation queues.
pub trait Connection: Send + Sync {
    /// Queue `op` for `node`. The connection initializes, writes and reads
    /// the operation until it reaches a terminal state.
    fn insert_operation(&self, node: &Arc<dyn Node>, op: Box<dyn Operation>);

    fn is_shut_down(&self) -> bool;
}
