//! Client-side binary protocol request encoding.
//!
//! A [`BinaryRequest`] owns the extras, key and value of one request packet.
//! Constructors exist for every command the client issues; [`encode`] writes
//! the 24-byte header followed by the body.
//!
//! [`encode`]: BinaryRequest::encode

use bytes::{BufMut, Bytes, BytesMut};

use super::header::{HEADER_SIZE, Opcode, RequestHeader};

/// TAP connect flag: stream items changed since a given date.
pub const TAP_FLAG_BACKFILL: u32 = 0x01;
/// TAP connect flag: dump existing items and close the stream.
pub const TAP_FLAG_DUMP: u32 = 0x02;
/// TAP connect flag: the client acknowledges messages.
pub const TAP_FLAG_SUPPORT_ACK: u32 = 0x10;

/// A binary protocol request packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRequest {
    opcode: Opcode,
    magic: u8,
    vbucket_id: u16,
    opaque: u32,
    cas: u64,
    extras: Bytes,
    key: Bytes,
    value: Bytes,
}

impl BinaryRequest {
    /// Create an empty request for `opcode`.
    pub fn new(opcode: Opcode, opaque: u32) -> Self {
        Self {
            opcode,
            magic: super::REQUEST_MAGIC,
            vbucket_id: 0,
            opaque,
            cas: 0,
            extras: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    /// Set the key.
    pub fn key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the extras section.
    pub fn extras(mut self, extras: impl Into<Bytes>) -> Self {
        self.extras = extras.into();
        self
    }

    /// Set the value section.
    pub fn value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = value.into();
        self
    }

    /// Set the CAS field.
    pub fn cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    /// Set the vbucket field (replica index for replica reads).
    pub fn vbucket(mut self, vbucket_id: u16) -> Self {
        self.vbucket_id = vbucket_id;
        self
    }

    /// Encode with the response magic instead of the request magic.
    ///
    /// TAP acknowledgements travel from client to server as responses.
    pub fn as_response(mut self) -> Self {
        self.magic = super::RESPONSE_MAGIC;
        self
    }

    // -- Commands -------------------------------------------------------------

    /// GET request.
    pub fn get(key: impl Into<Bytes>, opaque: u32) -> Self {
        Self::new(Opcode::Get, opaque).key(key)
    }

    /// GET request against a replica.
    pub fn get_replica(key: impl Into<Bytes>, replica_index: u16, opaque: u32) -> Self {
        Self::new(Opcode::GetReplica, opaque)
            .key(key)
            .vbucket(replica_index)
    }

    /// GET-with-lock request. Extras carry the lock timeout.
    pub fn get_locked(key: impl Into<Bytes>, expiration: u32, opaque: u32) -> Self {
        Self::new(Opcode::GetLocked, opaque)
            .key(key)
            .extras(expiration.to_be_bytes().to_vec())
    }

    /// GAT (get and touch) request.
    pub fn gat(key: impl Into<Bytes>, expiration: u32, opaque: u32) -> Self {
        Self::new(Opcode::Gat, opaque)
            .key(key)
            .extras(expiration.to_be_bytes().to_vec())
    }

    /// SET / ADD / REPLACE request. `cas` of 0 stores unconditionally.
    pub fn store(
        opcode: Opcode,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        flags: u32,
        expiration: u32,
        cas: u64,
        opaque: u32,
    ) -> Self {
        let mut extras = BytesMut::with_capacity(8);
        extras.put_u32(flags);
        extras.put_u32(expiration);
        Self::new(opcode, opaque)
            .key(key)
            .value(value)
            .extras(extras.freeze())
            .cas(cas)
    }

    /// APPEND / PREPEND request.
    pub fn concat(
        opcode: Opcode,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        cas: u64,
        opaque: u32,
    ) -> Self {
        Self::new(opcode, opaque).key(key).value(value).cas(cas)
    }

    /// DELETE request.
    pub fn delete(key: impl Into<Bytes>, cas: u64, opaque: u32) -> Self {
        Self::new(Opcode::Delete, opaque).key(key).cas(cas)
    }

    /// INCREMENT / DECREMENT request.
    ///
    /// An expiration of `0xFFFFFFFF` tells the server not to create the
    /// counter when it is missing.
    pub fn counter(
        opcode: Opcode,
        key: impl Into<Bytes>,
        delta: u64,
        initial: u64,
        expiration: u32,
        opaque: u32,
    ) -> Self {
        let mut extras = BytesMut::with_capacity(20);
        extras.put_u64(delta);
        extras.put_u64(initial);
        extras.put_u32(expiration);
        Self::new(opcode, opaque).key(key).extras(extras.freeze())
    }

    /// TOUCH request.
    pub fn touch(key: impl Into<Bytes>, expiration: u32, opaque: u32) -> Self {
        Self::new(Opcode::Touch, opaque)
            .key(key)
            .extras(expiration.to_be_bytes().to_vec())
    }

    /// FLUSH request. A zero delay is sent without extras.
    pub fn flush(delay: u32, opaque: u32) -> Self {
        let request = Self::new(Opcode::Flush, opaque);
        if delay == 0 {
            request
        } else {
            request.extras(delay.to_be_bytes().to_vec())
        }
    }

    /// STAT request; `key` selects a stats group.
    pub fn stat(key: Option<&str>, opaque: u32) -> Self {
        let request = Self::new(Opcode::Stat, opaque);
        match key {
            Some(k) => request.key(k.as_bytes().to_vec()),
            None => request,
        }
    }

    /// SASL LIST_MECHS request.
    pub fn sasl_list_mechs(opaque: u32) -> Self {
        Self::new(Opcode::SaslListMechs, opaque)
    }

    /// SASL AUTH / STEP request: mechanism name as key, response as value.
    pub fn sasl(opcode: Opcode, mechanism: &str, response: impl Into<Bytes>, opaque: u32) -> Self {
        Self::new(opcode, opaque)
            .key(mechanism.as_bytes().to_vec())
            .value(response)
    }

    /// TAP connect request.
    pub fn tap_connect(name: &str, flags: u32, value: impl Into<Bytes>, opaque: u32) -> Self {
        Self::new(Opcode::TapConnect, opaque)
            .key(name.as_bytes().to_vec())
            .extras(flags.to_be_bytes().to_vec())
            .value(value)
    }

    // -- Encoding -------------------------------------------------------------

    /// The opcode of this request.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The opaque value of this request.
    pub fn opaque(&self) -> u32 {
        self.opaque
    }

    /// The key of this request.
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.extras.len() + self.key.len() + self.value.len()
    }

    /// Encode the packet, appending to `buf`.
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut BytesMut) -> usize {
        let body = self.extras.len() + self.key.len() + self.value.len();

        let mut header = RequestHeader::new(self.opcode);
        header.magic = self.magic;
        header.key_length = self.key.len() as u16;
        header.extras_length = self.extras.len() as u8;
        header.vbucket_id = self.vbucket_id;
        header.total_body_length = body as u32;
        header.opaque = self.opaque;
        header.cas = self.cas;

        let mut raw = [0u8; HEADER_SIZE];
        header.encode(&mut raw);

        buf.reserve(HEADER_SIZE + body);
        buf.put_slice(&raw);
        buf.put_slice(&self.extras);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
        HEADER_SIZE + body
    }

    /// Encode into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> (RequestHeader, &[u8]) {
        let header = RequestHeader::parse(bytes).unwrap();
        (header, &bytes[HEADER_SIZE..])
    }

    #[test]
    fn test_encode_get() {
        let bytes = BinaryRequest::get("mykey", 42).to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let (header, body) = parse(&bytes);
        assert_eq!(header.opcode, Opcode::Get);
        assert_eq!(header.key_length, 5);
        assert_eq!(header.opaque, 42);
        assert_eq!(body, b"mykey");
    }

    #[test]
    fn test_encode_store_extras() {
        let bytes =
            BinaryRequest::store(Opcode::Set, "key", "value", 7, 3600, 99, 1).to_bytes();
        let (header, body) = parse(&bytes);

        assert_eq!(header.extras_length, 8);
        assert_eq!(header.cas, 99);
        assert_eq!(header.total_body_length, 8 + 3 + 5);
        assert_eq!(&body[..4], &7u32.to_be_bytes());
        assert_eq!(&body[4..8], &3600u32.to_be_bytes());
        assert_eq!(&body[8..11], b"key");
        assert_eq!(&body[11..], b"value");
    }

    #[test]
    fn test_encode_counter_extras() {
        let bytes = BinaryRequest::counter(Opcode::Increment, "n", 5, 10, 60, 3).to_bytes();
        let (header, body) = parse(&bytes);

        assert_eq!(header.extras_length, 20);
        assert_eq!(&body[..8], &5u64.to_be_bytes());
        assert_eq!(&body[8..16], &10u64.to_be_bytes());
        assert_eq!(&body[16..20], &60u32.to_be_bytes());
        assert_eq!(&body[20..], b"n");
    }

    #[test]
    fn test_encode_sasl_auth() {
        let bytes = BinaryRequest::sasl(Opcode::SaslAuth, "PLAIN", &b"\0u\0p"[..], 9).to_bytes();
        let (header, body) = parse(&bytes);

        assert_eq!(header.opcode, Opcode::SaslAuth);
        assert_eq!(header.key_length, 5);
        assert_eq!(header.value_length().unwrap(), 4);
        assert_eq!(&body[..5], b"PLAIN");
        assert_eq!(&body[5..], b"\0u\0p");
    }

    #[test]
    fn test_encode_flush_without_delay() {
        let bytes = BinaryRequest::flush(0, 1).to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let bytes = BinaryRequest::flush(30, 1).to_bytes();
        let (header, body) = parse(&bytes);
        assert_eq!(header.extras_length, 4);
        assert_eq!(body, &30u32.to_be_bytes());
    }

    #[test]
    fn test_encode_replica_get_uses_vbucket() {
        let bytes = BinaryRequest::get_replica("k", 2, 5).to_bytes();
        let (header, _) = parse(&bytes);
        assert_eq!(header.opcode, Opcode::GetReplica);
        assert_eq!(header.vbucket_id, 2);
    }

    #[test]
    fn test_encode_tap_connect() {
        let bytes = BinaryRequest::tap_connect(
            "stream",
            TAP_FLAG_BACKFILL | TAP_FLAG_SUPPORT_ACK,
            1_000u64.to_be_bytes().to_vec(),
            7,
        )
        .to_bytes();
        let (header, body) = parse(&bytes);

        assert_eq!(header.opcode, Opcode::TapConnect);
        assert_eq!(header.extras_length, 4);
        assert_eq!(&body[..4], &0x11u32.to_be_bytes());
        assert_eq!(&body[4..10], b"stream");
        assert_eq!(&body[10..], &1_000u64.to_be_bytes());
    }

    #[test]
    fn test_as_response_magic() {
        let bytes = BinaryRequest::new(Opcode::TapMutation, 12)
            .as_response()
            .to_bytes();
        assert_eq!(bytes[0], super::super::RESPONSE_MAGIC);
        assert_eq!(bytes[1], Opcode::TapMutation as u8);
    }

    #[test]
    fn test_encode_appends() {
        let mut buf = BytesMut::new();
        let a = BinaryRequest::new(Opcode::Noop, 1).encode(&mut buf);
        let b = BinaryRequest::new(Opcode::Version, 2).encode(&mut buf);
        assert_eq!(a + b, buf.len());
        assert_eq!(buf[HEADER_SIZE + 1], Opcode::Version as u8);
    }
}
