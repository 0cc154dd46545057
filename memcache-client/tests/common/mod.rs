//! Test doubles for the transport.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use memcache_client::{
    ConfigCallback, Connection, GetCallback, GetsCallback, Node, NodeId, Operation, OperationCallback,
    OperationKind, OperationStatus, ReplicaGetCallback, StoreCallback,
};
use parking_lot::Mutex;
use protocol_memcache::binary::{HEADER_SIZE, Opcode, RequestHeader, ResponseHeader, Status};

/// One request as written by an operation.
#[derive(Debug, Clone)]
pub struct Written {
    pub kind: OperationKind,
    pub opaque: u32,
    pub bytes: Vec<u8>,
}

impl Written {
    pub fn header(&self) -> RequestHeader {
        RequestHeader::parse(&self.bytes).unwrap()
    }

    /// Bytes following the binary header.
    pub fn body(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }
}

type Responder = dyn Fn(&Written) -> Option<Vec<u8>> + Send + Sync;

/// Drives inserted operations in place. The responder returns the bytes
/// the server would send, or `None` to leave the operation waiting.
pub struct MockConnection {
    responder: Box<Responder>,
    shut_down: AtomicBool,
    written: Mutex<Vec<Written>>,
    parked: Mutex<Vec<Box<dyn Operation>>>,
}

impl MockConnection {
    pub fn new(responder: impl Fn(&Written) -> Option<Vec<u8>> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            shut_down: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
            parked: Mutex::new(Vec::new()),
        })
    }

    /// A connection that never answers.
    pub fn silent() -> Arc<Self> {
        Self::new(|_| None)
    }

    pub fn shut_down(&self) {
        self.shut_down.store(true, Ordering::Release);
    }

    pub fn written(&self) -> Vec<Written> {
        self.written.lock().clone()
    }

    pub fn parked_cancelled(&self) -> usize {
        self.parked.lock().iter().filter(|op| op.is_cancelled()).count()
    }
}

impl Connection for MockConnection {
    fn insert_operation(&self, _node: &Arc<dyn Node>, mut op: Box<dyn Operation>) {
        if op.initialize().is_err() {
            return;
        }
        let written = Written {
            kind: op.kind(),
            opaque: op.opaque(),
            bytes: op.write_buffer().to_vec(),
        };
        op.writing_complete();
        self.written.lock().push(written.clone());

        match (self.responder)(&written) {
            Some(response) => {
                let mut offset = 0;
                while offset < response.len() && !op.state().is_terminal() {
                    match op.read_from(&response[offset..]) {
                        Ok(consumed) => offset += consumed,
                        Err(_) => break,
                    }
                }
            }
            None => self.parked.lock().push(op),
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

pub struct MockNode {
    id: NodeId,
    auth_completions: AtomicUsize,
}

impl MockNode {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(id),
            auth_completions: AtomicUsize::new(0),
        })
    }

    pub fn auth_completions(&self) -> usize {
        self.auth_completions.load(Ordering::SeqCst)
    }
}

impl Node for MockNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn auth_complete(&self) {
        self.auth_completions.fetch_add(1, Ordering::SeqCst);
    }
}

/// A binary response packet.
pub fn binary_response(opcode: Opcode, status: u16, opaque: u32, key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut header = ResponseHeader::new(opcode, Status::NoError);
    header.status = status;
    header.opaque = opaque;
    header.key_length = key.len() as u16;
    header.total_body_length = (key.len() + value.len()) as u32;
    let mut buf = vec![0u8; HEADER_SIZE];
    header.encode(&mut buf);
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf
}

/// Records everything delivered to it.
#[derive(Default)]
pub struct Recorder {
    pub values: Mutex<Vec<(Vec<u8>, Bytes)>>,
    pub cas: Mutex<Vec<u64>>,
    pub configs: Mutex<Vec<(u32, Bytes)>>,
    pub statuses: Mutex<Vec<OperationStatus>>,
    pub completions: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn last_status(&self) -> Option<OperationStatus> {
        self.statuses.lock().last().cloned()
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        let mut keys: Vec<Vec<u8>> = self.values.lock().iter().map(|(k, _)| k.clone()).collect();
        keys.sort();
        keys
    }
}

impl OperationCallback for Recorder {
    fn received_status(&self, status: OperationStatus) {
        self.statuses.lock().push(status);
    }

    fn complete(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

impl GetCallback for Recorder {
    fn got_data(&self, key: &[u8], _flags: u32, data: Bytes) {
        self.values.lock().push((key.to_vec(), data));
    }
}

impl GetsCallback for Recorder {
    fn got_data(&self, key: &[u8], _flags: u32, cas: u64, data: Bytes) {
        self.values.lock().push((key.to_vec(), data));
        self.cas.lock().push(cas);
    }
}

impl ReplicaGetCallback for Recorder {
    fn got_data(&self, key: &[u8], _flags: u32, data: Bytes) {
        self.values.lock().push((key.to_vec(), data));
    }
}

impl StoreCallback for Recorder {
    fn got_data(&self, _key: &[u8], cas: u64) {
        self.cas.lock().push(cas);
    }
}

impl ConfigCallback for Recorder {
    fn got_config(&self, flags: u32, data: Bytes) {
        self.configs.lock().push((flags, data));
    }
}

/// A binary response carrying a value with its flags as extras.
pub fn value_response(opcode: Opcode, opaque: u32, key: &[u8], flags: u32, value: &[u8]) -> Vec<u8> {
    let mut header = ResponseHeader::new(opcode, Status::NoError);
    header.opaque = opaque;
    header.extras_length = 4;
    header.key_length = key.len() as u16;
    header.total_body_length = (4 + key.len() + value.len()) as u32;
    let mut buf = vec![0u8; HEADER_SIZE];
    header.encode(&mut buf);
    buf.extend_from_slice(&flags.to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf
}
