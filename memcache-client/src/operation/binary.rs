//! Binary protocol operations.

use bytes::{Bytes, BytesMut};
use protocol_memcache::ParseError;
use protocol_memcache::binary::{BinaryRequest, Opcode, Packet};

use super::{Operation, OperationCore, OperationHandle, OperationKind, OperationState};
use crate::callback::{Callback, TapMessage};
use crate::error::Error;
use crate::status::OperationStatus;

/// One binary request, or a pipeline of quiet requests closed by a NOOP.
/// Responses are matched by opaque and decoded according to the kind.
pub(crate) struct BinaryOperation {
    core: OperationCore,
    requests: Vec<BinaryRequest>,
    replica_index: Option<u16>,
    expects_response: bool,
}

impl BinaryOperation {
    /// Build an operation whose request is created from its opaque.
    pub(crate) fn new(
        kind: OperationKind,
        keys: Vec<Bytes>,
        callback: Callback,
        request: impl FnOnce(u32) -> BinaryRequest,
    ) -> Self {
        let core = OperationCore::new(kind, keys, callback);
        let requests = vec![request(core.opaque())];
        Self {
            core,
            requests,
            replica_index: None,
            expects_response: true,
        }
    }

    /// Build an operation sending several quiet requests followed by a NOOP,
    /// all sharing the operation's opaque. Only the NOOP response ends it.
    pub(crate) fn pipelined(
        kind: OperationKind,
        keys: Vec<Bytes>,
        callback: Callback,
        requests: impl FnOnce(u32) -> Vec<BinaryRequest>,
    ) -> Self {
        let core = OperationCore::new(kind, keys, callback);
        let mut requests = requests(core.opaque());
        requests.push(BinaryRequest::new(Opcode::Noop, core.opaque()));
        Self {
            core,
            requests,
            replica_index: None,
            expects_response: true,
        }
    }

    /// An outbound packet that answers a server message. It completes once
    /// written.
    pub(crate) fn reply(kind: OperationKind, request: BinaryRequest, callback: Callback) -> Self {
        Self {
            core: OperationCore::with_opaque(kind, request.opaque(), vec![], callback),
            requests: vec![request],
            replica_index: None,
            expects_response: false,
        }
    }

    pub(crate) fn with_replica_index(mut self, index: u16) -> Self {
        self.replica_index = Some(index);
        self
    }

    /// Kinds whose response spans several packets.
    fn is_multi_packet(&self) -> bool {
        let kind = self.core.kind();
        self.is_pipelined()
            || kind.is_tap_stream()
            || matches!(kind, OperationKind::Stats | OperationKind::KeyStats)
    }

    fn is_pipelined(&self) -> bool {
        self.requests.len() > 1
    }

    /// Handle one packet. Returns true once the operation is finished.
    fn handle_packet(&self, packet: &Packet<'_>) -> Result<bool, ParseError> {
        let kind = self.core.kind();

        if !packet.is_response() {
            if !kind.is_tap_stream() || !packet.opcode.is_tap_message() {
                return Err(ParseError::Protocol("unexpected request packet"));
            }
            let message = TapMessage {
                opcode: packet.opcode,
                opaque: packet.opaque,
                vbucket: packet.status,
                cas: packet.cas,
                extras: Bytes::copy_from_slice(packet.extras),
                key: Bytes::copy_from_slice(packet.key),
                value: Bytes::copy_from_slice(packet.value),
            };
            self.core.deliver(|cb| cb.got_tap_message(message));
            return Ok(false);
        }

        if packet.opaque != self.core.opaque() {
            return Err(ParseError::Protocol("opaque mismatch"));
        }
        self.core.set_error_code(packet.status);

        if self.is_pipelined() {
            return Ok(self.handle_pipelined(packet));
        }

        if packet.status != 0 {
            self.core
                .finish(OperationStatus::from_binary(packet.status, packet.value));
            return Ok(true);
        }

        use OperationKind::*;
        let status = match kind {
            kind if kind.is_retrieval() => {
                let key = match (packet.key, self.core.keys().first()) {
                    (key, _) if !key.is_empty() => key,
                    (_, Some(requested)) => &requested[..],
                    (key, None) => key,
                };
                let flags = packet.flags();
                let value = Bytes::copy_from_slice(packet.value);
                self.core
                    .deliver(|cb| cb.got_value(key, flags, Some(packet.cas), value));
                OperationStatus::success("")
            }
            Store(_) | Cas | Concatenate(_) => {
                if let Some(key) = self.core.keys().first() {
                    self.core.deliver(|cb| cb.got_cas(key, packet.cas));
                }
                OperationStatus::success("")
            }
            Mutate(_) => {
                let value = packet
                    .counter()
                    .ok_or(ParseError::Protocol("counter response too short"))?;
                OperationStatus::success(value.to_string())
            }
            Stats | KeyStats => {
                if packet.key.is_empty() {
                    OperationStatus::success("")
                } else {
                    let name = String::from_utf8_lossy(packet.key);
                    let value = String::from_utf8_lossy(packet.value);
                    self.core.deliver(|cb| cb.got_stat(&name, &value));
                    return Ok(false);
                }
            }
            GetConfig => {
                let flags = packet.flags();
                let data = Bytes::copy_from_slice(packet.value);
                self.core.deliver(|cb| cb.got_config(flags, data));
                OperationStatus::success("")
            }
            _ => OperationStatus::success(Bytes::copy_from_slice(packet.value)),
        };
        self.core.finish(status);
        Ok(true)
    }

    /// Quiet gets answer only on a hit and carry their key.
    fn handle_pipelined(&self, packet: &Packet<'_>) -> bool {
        match packet.opcode {
            Opcode::Noop => {
                self.core.finish(OperationStatus::success(""));
                true
            }
            _ if packet.status == 0 => {
                let flags = packet.flags();
                let value = Bytes::copy_from_slice(packet.value);
                self.core
                    .deliver(|cb| cb.got_value(packet.key, flags, Some(packet.cas), value));
                false
            }
            opcode => {
                tracing::debug!(?opcode, status = packet.status, "skipping failed quiet get");
                false
            }
        }
    }
}

impl Operation for BinaryOperation {
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
        let mut buf = BytesMut::with_capacity(self.requests.iter().map(|r| r.encoded_len()).sum());
        for request in &self.requests {
            request.encode(&mut buf);
        }
        self.core.begin_writing(buf.freeze())
    }

    fn write_buffer(&self) -> &[u8] {
        self.core.buffer()
    }

    fn writing_complete(&mut self) {
        self.core.writing_complete();
        if !self.expects_response {
            self.core.finish(OperationStatus::success(""));
        }
    }

    fn read_from(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let mut consumed = 0;
        loop {
            let (packet, n) = match Packet::parse(&data[consumed..]) {
                Ok(parsed) => parsed,
                Err(ParseError::Incomplete) if consumed > 0 => return Ok(consumed),
                Err(e) => return Err(e),
            };
            consumed += n;
            if self.handle_packet(&packet)? || !self.is_multi_packet() {
                return Ok(consumed);
            }
        }
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

    fn replica_index(&self) -> Option<u16> {
        self.replica_index
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use protocol_memcache::binary::{HEADER_SIZE, ResponseHeader, Status};

    use super::*;
    use crate::callback::{GetCallback, OperationCallback, StatsCallback, TapCallback};

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<String>>,
    }

    impl OperationCallback for Collect {
        fn received_status(&self, status: OperationStatus) {
            self.events
                .lock()
                .push(format!("{:?}:{}", status.code(), status.message_str()));
        }

        fn complete(&self) {
            self.events.lock().push("complete".into());
        }
    }

    impl GetCallback for Collect {
        fn got_data(&self, key: &[u8], flags: u32, data: Bytes) {
            self.events.lock().push(format!(
                "{}/{flags}/{}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(&data)
            ));
        }
    }

    impl StatsCallback for Collect {
        fn got_stat(&self, name: &str, value: &str) {
            self.events.lock().push(format!("{name}={value}"));
        }
    }

    impl TapCallback for Collect {
        fn got_message(&self, message: TapMessage) {
            self.events
                .lock()
                .push(format!("tap:{}", String::from_utf8_lossy(&message.key)));
        }
    }

    fn response(
        opcode: Opcode,
        status: Status,
        opaque: u32,
        extras: &[u8],
        key: &[u8],
        value: &[u8],
    ) -> Vec<u8> {
        let mut header = ResponseHeader::new(opcode, status);
        header.extras_length = extras.len() as u8;
        header.key_length = key.len() as u16;
        header.total_body_length = (extras.len() + key.len() + value.len()) as u32;
        header.opaque = opaque;
        let mut buf = vec![0u8; HEADER_SIZE];
        header.encode(&mut buf);
        buf.extend_from_slice(extras);
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
        buf
    }

    fn started(mut op: BinaryOperation) -> BinaryOperation {
        op.initialize().unwrap();
        op.writing_complete();
        op
    }

    #[test]
    fn test_get_hit_uses_requested_key() {
        let collect = Arc::new(Collect::default());
        let mut op = started(BinaryOperation::new(
            OperationKind::Get,
            vec![Bytes::from_static(b"foo")],
            Callback::Get(collect.clone()),
            |opaque| BinaryRequest::get(&b"foo"[..], opaque),
        ));
        assert_eq!(op.write_buffer()[1], Opcode::Get as u8);

        let data = response(Opcode::Get, Status::NoError, op.opaque(), &7u32.to_be_bytes(), b"", b"bar");
        assert_eq!(op.read_from(&data).unwrap(), data.len());
        assert_eq!(op.error_code(), Some(0));
        assert_eq!(
            *collect.events.lock(),
            vec!["foo/7/bar", "Success:", "complete"]
        );
    }

    #[test]
    fn test_get_miss() {
        let collect = Arc::new(Collect::default());
        let mut op = started(BinaryOperation::new(
            OperationKind::Get,
            vec![Bytes::from_static(b"foo")],
            Callback::Get(collect.clone()),
            |opaque| BinaryRequest::get(&b"foo"[..], opaque),
        ));
        let data = response(Opcode::Get, Status::KeyNotFound, op.opaque(), b"", b"", b"Not found");
        op.read_from(&data).unwrap();
        assert_eq!(op.error_code(), Some(1));
        assert_eq!(
            *collect.events.lock(),
            vec!["NotFound:Not found", "complete"]
        );
    }

    #[test]
    fn test_opaque_mismatch() {
        let collect = Arc::new(Collect::default());
        let mut op = started(BinaryOperation::new(
            OperationKind::Noop,
            vec![],
            Callback::Status(collect.clone()),
            |opaque| BinaryRequest::new(Opcode::Noop, opaque),
        ));
        let data = response(Opcode::Noop, Status::NoError, op.opaque().wrapping_add(1), b"", b"", b"");
        assert_eq!(
            op.read_from(&data),
            Err(ParseError::Protocol("opaque mismatch"))
        );
        assert_eq!(op.state(), OperationState::Reading);
    }

    #[test]
    fn test_stats_stream_split_across_reads() {
        let collect = Arc::new(Collect::default());
        let mut op = started(BinaryOperation::new(
            OperationKind::Stats,
            vec![],
            Callback::Stats(collect.clone()),
            |opaque| BinaryRequest::stat(None, opaque),
        ));
        let opaque = op.opaque();
        let mut data = BytesMut::new();
        data.extend_from_slice(&response(Opcode::Stat, Status::NoError, opaque, b"", b"pid", b"1"));
        data.extend_from_slice(&response(Opcode::Stat, Status::NoError, opaque, b"", b"", b""));

        let first = op.read_from(&data[..30]).unwrap();
        assert_eq!(first, HEADER_SIZE + 4);
        op.read_from(&data[first..]).unwrap();
        assert_eq!(
            *collect.events.lock(),
            vec!["pid=1", "Success:", "complete"]
        );
    }

    #[test]
    fn test_tap_messages_then_end() {
        let collect = Arc::new(Collect::default());
        let mut op = started(BinaryOperation::new(
            OperationKind::TapDump,
            vec![],
            Callback::Tap(collect.clone()),
            |opaque| BinaryRequest::tap_connect("", 0x02, Bytes::new(), opaque),
        ));
        let pushed = BinaryRequest::new(Opcode::TapMutation, 99)
            .key(&b"k1"[..])
            .to_bytes();
        let mut data = pushed.to_vec();
        data.extend(response(Opcode::TapConnect, Status::NoError, op.opaque(), b"", b"", b""));

        assert_eq!(op.read_from(&data).unwrap(), data.len());
        assert_eq!(
            *collect.events.lock(),
            vec!["tap:k1", "Success:", "complete"]
        );
    }

    #[test]
    fn test_pipelined_multi_get() {
        let collect = Arc::new(Collect::default());
        let mut op = started(BinaryOperation::pipelined(
            OperationKind::Get,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
            Callback::Get(collect.clone()),
            |opaque| {
                vec![
                    BinaryRequest::new(Opcode::GetKQ, opaque).key(&b"a"[..]),
                    BinaryRequest::new(Opcode::GetKQ, opaque).key(&b"b"[..]),
                ]
            },
        ));
        assert_eq!(op.write_buffer().len(), 3 * HEADER_SIZE + 2);

        let opaque = op.opaque();
        let mut data = response(Opcode::GetKQ, Status::NoError, opaque, &[0; 4], b"b", b"2");
        data.extend(response(Opcode::Noop, Status::NoError, opaque, b"", b"", b""));
        assert_eq!(op.read_from(&data).unwrap(), data.len());
        assert_eq!(
            *collect.events.lock(),
            vec!["b/0/2", "Success:", "complete"]
        );
    }

    #[test]
    fn test_reply_completes_when_written() {
        let collect = Arc::new(Collect::default());
        let request = BinaryRequest::new(Opcode::TapMutation, 42).as_response();
        let mut op = BinaryOperation::reply(
            OperationKind::TapAck,
            request,
            Callback::Status(collect.clone()),
        );
        assert_eq!(op.opaque(), 42);
        op.initialize().unwrap();
        assert_eq!(op.write_buffer()[0], protocol_memcache::binary::RESPONSE_MAGIC);
        op.writing_complete();
        assert_eq!(op.state(), OperationState::Complete);
    }
}
