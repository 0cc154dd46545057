//! Fan-in callbacks for multi-key gets split into single-key operations.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::{GetCallback, GetsCallback, OperationCallback, ReplicaGetCallback};
use crate::status::OperationStatus;

/// Wraps a callback shared by `expected` constituent operations.
///
/// Values pass straight through. Statuses are folded: the first failure
/// wins, otherwise the last success is kept. The folded status and the
/// wrapped `complete()` are delivered once, after the last constituent
/// completes.
pub struct MultiCallback<C: ?Sized> {
    inner: Arc<C>,
    fan_in: Mutex<FanIn>,
}

pub type MultiGetCallback = MultiCallback<dyn GetCallback>;
pub type MultiGetsCallback = MultiCallback<dyn GetsCallback>;
pub type MultiReplicaGetCallback = MultiCallback<dyn ReplicaGetCallback>;

struct FanIn {
    remaining: usize,
    status: Option<OperationStatus>,
}

impl<C: ?Sized> MultiCallback<C> {
    pub fn new(inner: Arc<C>, expected: usize) -> Self {
        Self {
            inner,
            fan_in: Mutex::new(FanIn {
                remaining: expected,
                status: None,
            }),
        }
    }

    /// Number of constituent completions still outstanding.
    pub fn remaining(&self) -> usize {
        self.fan_in.lock().remaining
    }
}

impl<C: OperationCallback + ?Sized> OperationCallback for MultiCallback<C> {
    fn received_status(&self, status: OperationStatus) {
        let mut fan_in = self.fan_in.lock();
        let keep_previous = fan_in.status.as_ref().is_some_and(|s| !s.is_success());
        if !keep_previous {
            fan_in.status = Some(status);
        }
    }

    fn complete(&self) {
        let status = {
            let mut fan_in = self.fan_in.lock();
            if fan_in.remaining == 0 {
                return;
            }
            fan_in.remaining -= 1;
            if fan_in.remaining > 0 {
                return;
            }
            fan_in.status.take()
        };
        if let Some(status) = status {
            self.inner.received_status(status);
        }
        self.inner.complete();
    }
}

impl GetCallback for MultiCallback<dyn GetCallback> {
    fn got_data(&self, key: &[u8], flags: u32, data: Bytes) {
        self.inner.got_data(key, flags, data);
    }
}

impl GetsCallback for MultiCallback<dyn GetsCallback> {
    fn got_data(&self, key: &[u8], flags: u32, cas: u64, data: Bytes) {
        self.inner.got_data(key, flags, cas, data);
    }
}

impl ReplicaGetCallback for MultiCallback<dyn ReplicaGetCallback> {
    fn got_data(&self, key: &[u8], flags: u32, data: Bytes) {
        self.inner.got_data(key, flags, data);
    }
}
