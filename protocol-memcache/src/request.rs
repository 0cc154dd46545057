//! Client-side request encoding for Memcache ASCII protocol.
//!
//! Every request is encoded by appending to a [`BytesMut`]. The retrieval
//! commands (`get`, `gets`, `gat`, `getl`) share one encoder and differ only in
//! the command word and where an optional extra token goes.

use bytes::{BufMut, BytesMut};

/// Retrieval command words that share the `VALUE ... END` response format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    /// `get <key>*`
    Get,
    /// `gets <key>*` (returns CAS tokens)
    Gets,
    /// `gat <exptime> <key>*`
    GetAndTouch,
    /// `getl <key> <exptime>`
    GetLocked,
}

impl Retrieval {
    /// The command word on the wire.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Retrieval::Get => b"get",
            Retrieval::Gets => b"gets",
            Retrieval::GetAndTouch => b"gat",
            Retrieval::GetLocked => b"getl",
        }
    }
}

/// Storage command words sharing `<cmd> <key> <flags> <exptime> <bytes>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

impl Storage {
    /// The command word on the wire.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Storage::Set => b"set",
            Storage::Add => b"add",
            Storage::Replace => b"replace",
            Storage::Append => b"append",
            Storage::Prepend => b"prepend",
        }
    }
}

/// A request builder for encoding Memcache commands.
#[derive(Debug, Clone)]
pub enum Request<'a> {
    /// Retrieval command over one or more keys.
    Retrieve {
        command: Retrieval,
        keys: &'a [&'a [u8]],
        exptime: u32,
    },
    /// Storage command: `<cmd> <key> <flags> <exptime> <bytes>\r\n<data>\r\n`
    Store {
        command: Storage,
        key: &'a [u8],
        value: &'a [u8],
        flags: u32,
        exptime: u32,
    },
    /// CAS command: `cas <key> <flags> <exptime> <bytes> <cas_unique>\r\n<data>\r\n`
    Cas {
        key: &'a [u8],
        value: &'a [u8],
        flags: u32,
        exptime: u32,
        cas_unique: u64,
    },
    /// INCR command: `incr <key> <delta>\r\n`
    Incr { key: &'a [u8], delta: u64 },
    /// DECR command: `decr <key> <delta>\r\n`
    Decr { key: &'a [u8], delta: u64 },
    /// DELETE command: `delete <key>\r\n`
    Delete { key: &'a [u8] },
    /// TOUCH command: `touch <key> <exptime>\r\n`
    Touch { key: &'a [u8], exptime: u32 },
    /// FLUSH_ALL command: `flush_all [delay]\r\n`
    FlushAll { delay: u32 },
    /// VERSION command: `version\r\n`
    Version,
    /// STATS command: `stats [arg]\r\n`
    Stats { arg: Option<&'a [u8]> },
    /// `config get <type>\r\n`
    ConfigGet { config_type: &'a [u8] },
    /// `config set <type> <flags> <bytes>\r\n<data>\r\n`
    ConfigSet {
        config_type: &'a [u8],
        flags: u32,
        data: &'a [u8],
    },
    /// `config delete <type>\r\n`
    ConfigDelete { config_type: &'a [u8] },
    /// `refresh_certs\r\n`
    RefreshCerts,
    /// QUIT command: `quit\r\n`
    Quit,
}

impl<'a> Request<'a> {
    /// Create a GET request over `keys`.
    #[inline]
    pub fn get(keys: &'a [&'a [u8]]) -> Self {
        Request::Retrieve {
            command: Retrieval::Get,
            keys,
            exptime: 0,
        }
    }

    /// Create a GETS request over `keys`.
    #[inline]
    pub fn gets(keys: &'a [&'a [u8]]) -> Self {
        Request::Retrieve {
            command: Retrieval::Gets,
            keys,
            exptime: 0,
        }
    }

    /// Create a GAT request: `gat <exptime> <key>*`.
    #[inline]
    pub fn gat(keys: &'a [&'a [u8]], exptime: u32) -> Self {
        Request::Retrieve {
            command: Retrieval::GetAndTouch,
            keys,
            exptime,
        }
    }

    /// Create a GETL request: `getl <key> <exptime>`.
    #[inline]
    pub fn getl(key: &'a [&'a [u8]], exptime: u32) -> Self {
        Request::Retrieve {
            command: Retrieval::GetLocked,
            keys: key,
            exptime,
        }
    }

    /// Create a SET request with default flags and no expiration.
    #[inline]
    pub fn set(key: &'a [u8], value: &'a [u8]) -> Self {
        Request::Store {
            command: Storage::Set,
            key,
            value,
            flags: 0,
            exptime: 0,
        }
    }

    /// Create a DELETE request.
    #[inline]
    pub fn delete(key: &'a [u8]) -> Self {
        Request::Delete { key }
    }

    /// Encode this request, appending to `buf`.
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut BytesMut) -> usize {
        let start = buf.len();
        match self {
            Request::Retrieve {
                command,
                keys,
                exptime,
            } => encode_retrieval(buf, *command, keys, *exptime),
            Request::Store {
                command,
                key,
                value,
                flags,
                exptime,
            } => encode_storage(buf, command.as_bytes(), key, value, *flags, *exptime, None),
            Request::Cas {
                key,
                value,
                flags,
                exptime,
                cas_unique,
            } => encode_storage(buf, b"cas", key, value, *flags, *exptime, Some(*cas_unique)),
            Request::Incr { key, delta } => encode_key_number(buf, b"incr", key, *delta),
            Request::Decr { key, delta } => encode_key_number(buf, b"decr", key, *delta),
            Request::Delete { key } => encode_words(buf, &[b"delete".as_slice(), *key]),
            Request::Touch { key, exptime } => {
                encode_key_number(buf, b"touch", key, u64::from(*exptime))
            }
            Request::FlushAll { delay } => {
                buf.put_slice(b"flush_all");
                if *delay > 0 {
                    buf.put_u8(b' ');
                    put_decimal(buf, u64::from(*delay));
                }
                buf.put_slice(b"\r\n");
            }
            Request::Version => encode_words(buf, &[b"version".as_slice()]),
            Request::Stats { arg } => match arg {
                Some(arg) => encode_words(buf, &[b"stats".as_slice(), *arg]),
                None => encode_words(buf, &[b"stats".as_slice()]),
            },
            Request::ConfigGet { config_type } => {
                encode_words(buf, &[b"config get".as_slice(), *config_type])
            }
            Request::ConfigSet {
                config_type,
                flags,
                data,
            } => {
                buf.put_slice(b"config set ");
                buf.put_slice(config_type);
                buf.put_u8(b' ');
                put_decimal(buf, u64::from(*flags));
                buf.put_u8(b' ');
                put_decimal(buf, data.len() as u64);
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Request::ConfigDelete { config_type } => {
                encode_words(buf, &[b"config delete".as_slice(), *config_type])
            }
            Request::RefreshCerts => encode_words(buf, &[b"refresh_certs".as_slice()]),
            Request::Quit => encode_words(buf, &[b"quit".as_slice()]),
        }
        buf.len() - start
    }

    /// Encode into a freshly allocated buffer.
    pub fn to_bytes(&self) -> bytes::Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Encode a retrieval command.
///
/// `gat` places the expiration before the key list, `getl` after its key.
fn encode_retrieval(buf: &mut BytesMut, command: Retrieval, keys: &[&[u8]], exptime: u32) {
    buf.put_slice(command.as_bytes());
    if command == Retrieval::GetAndTouch {
        buf.put_u8(b' ');
        put_decimal(buf, u64::from(exptime));
    }
    for key in keys {
        buf.put_u8(b' ');
        buf.put_slice(key);
    }
    if command == Retrieval::GetLocked {
        buf.put_u8(b' ');
        put_decimal(buf, u64::from(exptime));
    }
    buf.put_slice(b"\r\n");
}

/// Encode a storage command: `<cmd> <key> <flags> <exptime> <bytes> [cas]\r\n<data>\r\n`
fn encode_storage(
    buf: &mut BytesMut,
    cmd: &[u8],
    key: &[u8],
    value: &[u8],
    flags: u32,
    exptime: u32,
    cas_unique: Option<u64>,
) {
    buf.reserve(cmd.len() + key.len() + value.len() + 48);
    buf.put_slice(cmd);
    buf.put_u8(b' ');
    buf.put_slice(key);
    buf.put_u8(b' ');
    put_decimal(buf, u64::from(flags));
    buf.put_u8(b' ');
    put_decimal(buf, u64::from(exptime));
    buf.put_u8(b' ');
    put_decimal(buf, value.len() as u64);
    if let Some(cas) = cas_unique {
        buf.put_u8(b' ');
        put_decimal(buf, cas);
    }
    buf.put_slice(b"\r\n");
    buf.put_slice(value);
    buf.put_slice(b"\r\n");
}

/// Encode `<cmd> <key> <number>\r\n`.
fn encode_key_number(buf: &mut BytesMut, cmd: &[u8], key: &[u8], number: u64) {
    buf.put_slice(cmd);
    buf.put_u8(b' ');
    buf.put_slice(key);
    buf.put_u8(b' ');
    put_decimal(buf, number);
    buf.put_slice(b"\r\n");
}

/// Encode space separated words followed by CRLF.
fn encode_words(buf: &mut BytesMut, words: &[&[u8]]) {
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            buf.put_u8(b' ');
        }
        buf.put_slice(word);
    }
    buf.put_slice(b"\r\n");
}

/// Append the ASCII decimal form of `n`.
fn put_decimal(buf: &mut BytesMut, mut n: u64) {
    let mut digits = [0u8; 20];
    let mut pos = digits.len();
    loop {
        pos -= 1;
        digits[pos] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buf.put_slice(&digits[pos..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(request: Request<'_>) -> Vec<u8> {
        request.to_bytes().to_vec()
    }

    #[test]
    fn test_encode_get() {
        let keys: &[&[u8]] = &[b"mykey"];
        assert_eq!(encoded(Request::get(keys)), b"get mykey\r\n");
    }

    #[test]
    fn test_encode_gets_multi() {
        let keys: &[&[u8]] = &[b"key1", b"key2", b"key3"];
        assert_eq!(encoded(Request::gets(keys)), b"gets key1 key2 key3\r\n");
    }

    #[test]
    fn test_encode_gat_token_before_keys() {
        let key: &[&[u8]] = &[b"foo"];
        assert_eq!(encoded(Request::gat(key, 60)), b"gat 60 foo\r\n");
        let keys: &[&[u8]] = &[b"a", b"b"];
        assert_eq!(encoded(Request::gat(keys, 5)), b"gat 5 a b\r\n");
    }

    #[test]
    fn test_encode_getl_token_after_key() {
        let key: &[&[u8]] = &[b"foo"];
        assert_eq!(encoded(Request::getl(key, 30)), b"getl foo 30\r\n");
    }

    #[test]
    fn test_encode_set() {
        assert_eq!(
            encoded(Request::set(b"mykey", b"myvalue")),
            b"set mykey 0 0 7\r\nmyvalue\r\n"
        );
    }

    #[test]
    fn test_encode_store_with_options() {
        let request = Request::Store {
            command: Storage::Add,
            key: b"mykey",
            value: b"myvalue",
            flags: 123,
            exptime: 3600,
        };
        assert_eq!(encoded(request), b"add mykey 123 3600 7\r\nmyvalue\r\n");
    }

    #[test]
    fn test_encode_cas() {
        let request = Request::Cas {
            key: b"k",
            value: b"v",
            flags: 1,
            exptime: 2,
            cas_unique: 99,
        };
        assert_eq!(encoded(request), b"cas k 1 2 1 99\r\nv\r\n");
    }

    #[test]
    fn test_encode_append() {
        let request = Request::Store {
            command: Storage::Append,
            key: b"k",
            value: b"tail",
            flags: 0,
            exptime: 0,
        };
        assert_eq!(encoded(request), b"append k 0 0 4\r\ntail\r\n");
    }

    #[test]
    fn test_encode_incr_decr() {
        assert_eq!(
            encoded(Request::Incr {
                key: b"n",
                delta: 10
            }),
            b"incr n 10\r\n"
        );
        assert_eq!(
            encoded(Request::Decr {
                key: b"n",
                delta: 0
            }),
            b"decr n 0\r\n"
        );
    }

    #[test]
    fn test_encode_delete_touch() {
        assert_eq!(encoded(Request::delete(b"mykey")), b"delete mykey\r\n");
        assert_eq!(
            encoded(Request::Touch {
                key: b"k",
                exptime: 15
            }),
            b"touch k 15\r\n"
        );
    }

    #[test]
    fn test_encode_flush_all() {
        assert_eq!(encoded(Request::FlushAll { delay: 0 }), b"flush_all\r\n");
        assert_eq!(encoded(Request::FlushAll { delay: 10 }), b"flush_all 10\r\n");
    }

    #[test]
    fn test_encode_stats() {
        assert_eq!(encoded(Request::Stats { arg: None }), b"stats\r\n");
        assert_eq!(
            encoded(Request::Stats {
                arg: Some(&b"items"[..])
            }),
            b"stats items\r\n"
        );
    }

    #[test]
    fn test_encode_config() {
        assert_eq!(
            encoded(Request::ConfigGet {
                config_type: b"cluster"
            }),
            b"config get cluster\r\n"
        );
        assert_eq!(
            encoded(Request::ConfigSet {
                config_type: b"cluster",
                flags: 0,
                data: b"1\nhost|10.0.0.1|11211"
            }),
            b"config set cluster 0 21\r\n1\nhost|10.0.0.1|11211\r\n"
        );
        assert_eq!(
            encoded(Request::ConfigDelete {
                config_type: b"cluster"
            }),
            b"config delete cluster\r\n"
        );
    }

    #[test]
    fn test_encode_simple() {
        assert_eq!(encoded(Request::Version), b"version\r\n");
        assert_eq!(encoded(Request::RefreshCerts), b"refresh_certs\r\n");
        assert_eq!(encoded(Request::Quit), b"quit\r\n");
    }

    #[test]
    fn test_encode_returns_written_len() {
        let mut buf = BytesMut::from(&b"prefix"[..]);
        let keys: &[&[u8]] = &[b"k"];
        let n = Request::get(keys).encode(&mut buf);
        assert_eq!(n, b"get k\r\n".len());
        assert_eq!(&buf[..], b"prefixget k\r\n");
    }

    #[test]
    fn test_put_decimal_bounds() {
        let mut buf = BytesMut::new();
        put_decimal(&mut buf, 0);
        buf.put_u8(b' ');
        put_decimal(&mut buf, u64::MAX);
        assert_eq!(&buf[..], b"0 18446744073709551615");
    }
}
