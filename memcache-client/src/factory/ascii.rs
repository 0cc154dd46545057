use std::sync::Arc;

use bytes::Bytes;
use protocol_memcache::binary::Opcode;
use protocol_memcache::{Request, Retrieval, Storage};

use super::{
    OperationFactory, OperationResult, Protocol, TapRequest, unsupported, validate_key,
    validate_keys,
};
use crate::callback::{
    Callback, ConfigCallback, GetCallback, GetsCallback, OperationCallback, ReplicaGetCallback,
    StatsCallback, StoreCallback, TapCallback,
};
use crate::operation::{AsciiOperation, ConcatenationType, Mutator, OperationKind, StoreType};
use crate::sasl::SharedMechanism;

/// Builds text protocol operations.
///
/// The text protocol has no SASL, TAP, replica reads, key stats or
/// delete-with-CAS; those return [`Error::Unsupported`](crate::Error).
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiOperationFactory;

impl AsciiOperationFactory {
    pub fn new() -> Self {
        Self
    }
}

fn operation(
    kind: OperationKind,
    keys: Vec<Bytes>,
    request: Request<'_>,
    callback: Callback,
) -> OperationResult {
    Ok(Box::new(AsciiOperation::new(
        kind,
        keys,
        request.to_bytes(),
        callback,
    )))
}

fn retrieve(
    kind: OperationKind,
    command: Retrieval,
    keys: Vec<Bytes>,
    exptime: u32,
    callback: Callback,
) -> OperationResult {
    let refs: Vec<&[u8]> = keys.iter().map(|k| &k[..]).collect();
    let request = Request::Retrieve {
        command,
        keys: &refs,
        exptime,
    }
    .to_bytes();
    Ok(Box::new(AsciiOperation::new(kind, keys, request, callback)))
}

/// Config types travel as a single token.
fn config_token(config_type: &str) -> Result<Bytes, crate::Error> {
    validate_key(config_type.as_bytes(), Protocol::Ascii)
}

impl OperationFactory for AsciiOperationFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Ascii
    }

    fn get(&self, key: &[u8], cb: Arc<dyn GetCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        retrieve(OperationKind::Get, Retrieval::Get, vec![key], 0, Callback::Get(cb))
    }

    fn get_multi(&self, keys: &[&[u8]], cb: Arc<dyn GetCallback>) -> OperationResult {
        let keys = validate_keys(keys, Protocol::Ascii)?;
        retrieve(OperationKind::Get, Retrieval::Get, keys, 0, Callback::Get(cb))
    }

    fn gets(&self, key: &[u8], cb: Arc<dyn GetsCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        retrieve(OperationKind::Gets, Retrieval::Gets, vec![key], 0, Callback::Gets(cb))
    }

    fn get_and_touch(
        &self,
        key: &[u8],
        expiration: u32,
        cb: Arc<dyn GetsCallback>,
    ) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        retrieve(
            OperationKind::GetAndTouch,
            Retrieval::GetAndTouch,
            vec![key],
            expiration,
            Callback::Gets(cb),
        )
    }

    fn getl(&self, key: &[u8], expiration: u32, cb: Arc<dyn GetsCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        retrieve(
            OperationKind::GetLocked,
            Retrieval::GetLocked,
            vec![key],
            expiration,
            Callback::Gets(cb),
        )
    }

    fn replica_get(
        &self,
        _key: &[u8],
        _index: u16,
        _cb: Arc<dyn ReplicaGetCallback>,
    ) -> OperationResult {
        Err(unsupported("replica_get", Protocol::Ascii))
    }

    fn replica_gets(
        &self,
        _key: &[u8],
        _index: u16,
        _cb: Arc<dyn GetsCallback>,
    ) -> OperationResult {
        Err(unsupported("replica_gets", Protocol::Ascii))
    }

    fn delete(&self, key: &[u8], cb: Arc<dyn OperationCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        let request = Request::Delete { key: &key };
        operation(
            OperationKind::Delete,
            vec![key.clone()],
            request,
            Callback::Status(cb),
        )
    }

    fn delete_cas(
        &self,
        _key: &[u8],
        _cas: u64,
        _cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        Err(unsupported("delete_cas", Protocol::Ascii))
    }

    fn store(
        &self,
        store_type: StoreType,
        key: &[u8],
        flags: u32,
        expiration: u32,
        data: Bytes,
        cb: Arc<dyn StoreCallback>,
    ) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        let command = match store_type {
            StoreType::Set => Storage::Set,
            StoreType::Add => Storage::Add,
            StoreType::Replace => Storage::Replace,
        };
        let request = Request::Store {
            command,
            key: &key,
            value: &data,
            flags,
            exptime: expiration,
        };
        operation(
            OperationKind::Store(store_type),
            vec![key.clone()],
            request,
            Callback::Store(cb),
        )
    }

    fn cas(
        &self,
        store_type: StoreType,
        key: &[u8],
        cas: u64,
        flags: u32,
        expiration: u32,
        data: Bytes,
        cb: Arc<dyn StoreCallback>,
    ) -> OperationResult {
        if cas == 0 {
            return self.store(store_type, key, flags, expiration, data, cb);
        }
        if store_type != StoreType::Set {
            return Err(unsupported("cas with add or replace", Protocol::Ascii));
        }
        let key = validate_key(key, Protocol::Ascii)?;
        let request = Request::Cas {
            key: &key,
            value: &data,
            flags,
            exptime: expiration,
            cas_unique: cas,
        };
        operation(
            OperationKind::Cas,
            vec![key.clone()],
            request,
            Callback::Store(cb),
        )
    }

    /// The text protocol cannot guard append/prepend with a CAS; `cas` is
    /// ignored.
    fn cat(
        &self,
        cat_type: ConcatenationType,
        _cas: u64,
        key: &[u8],
        data: Bytes,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        let command = match cat_type {
            ConcatenationType::Append => Storage::Append,
            ConcatenationType::Prepend => Storage::Prepend,
        };
        let request = Request::Store {
            command,
            key: &key,
            value: &data,
            flags: 0,
            exptime: 0,
        };
        operation(
            OperationKind::Concatenate(cat_type),
            vec![key.clone()],
            request,
            Callback::Status(cb),
        )
    }

    fn touch(&self, key: &[u8], expiration: u32, cb: Arc<dyn OperationCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        let request = Request::Touch {
            key: &key,
            exptime: expiration,
        };
        operation(
            OperationKind::Touch,
            vec![key.clone()],
            request,
            Callback::Status(cb),
        )
    }

    fn mutate(
        &self,
        mutator: Mutator,
        key: &[u8],
        by: u64,
        _default: u64,
        _expiration: u32,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let key = validate_key(key, Protocol::Ascii)?;
        let request = match mutator {
            Mutator::Incr => Request::Incr { key: &key, delta: by },
            Mutator::Decr => Request::Decr { key: &key, delta: by },
        };
        operation(
            OperationKind::Mutate(mutator),
            vec![key.clone()],
            request,
            Callback::Status(cb),
        )
    }

    fn flush(&self, delay: u32, cb: Arc<dyn OperationCallback>) -> OperationResult {
        operation(
            OperationKind::Flush,
            vec![],
            Request::FlushAll { delay },
            Callback::Status(cb),
        )
    }

    fn version(&self, cb: Arc<dyn OperationCallback>) -> OperationResult {
        operation(
            OperationKind::Version,
            vec![],
            Request::Version,
            Callback::Status(cb),
        )
    }

    /// The text protocol has no no-op command; `version` stands in.
    fn noop(&self, cb: Arc<dyn OperationCallback>) -> OperationResult {
        operation(
            OperationKind::Noop,
            vec![],
            Request::Version,
            Callback::Status(cb),
        )
    }

    fn stats(&self, arg: Option<&str>, cb: Arc<dyn StatsCallback>) -> OperationResult {
        let request = Request::Stats {
            arg: arg.map(str::as_bytes),
        };
        operation(OperationKind::Stats, vec![], request, Callback::Stats(cb))
    }

    fn key_stats(&self, _key: &[u8], _cb: Arc<dyn StatsCallback>) -> OperationResult {
        Err(unsupported("key_stats", Protocol::Ascii))
    }

    fn get_config(&self, config_type: &str, cb: Arc<dyn ConfigCallback>) -> OperationResult {
        let config_type = config_token(config_type)?;
        let request = Request::ConfigGet {
            config_type: &config_type,
        };
        operation(OperationKind::GetConfig, vec![], request, Callback::Config(cb))
    }

    fn set_config(
        &self,
        config_type: &str,
        flags: u32,
        data: Bytes,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let config_type = config_token(config_type)?;
        let request = Request::ConfigSet {
            config_type: &config_type,
            flags,
            data: &data,
        };
        operation(OperationKind::SetConfig, vec![], request, Callback::Status(cb))
    }

    fn delete_config(
        &self,
        config_type: &str,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let config_type = config_token(config_type)?;
        let request = Request::ConfigDelete {
            config_type: &config_type,
        };
        operation(
            OperationKind::DeleteConfig,
            vec![],
            request,
            Callback::Status(cb),
        )
    }

    fn refresh_certificate(&self, cb: Arc<dyn OperationCallback>) -> OperationResult {
        operation(
            OperationKind::RefreshCertificate,
            vec![],
            Request::RefreshCerts,
            Callback::Status(cb),
        )
    }

    fn tap_backfill(
        &self,
        _id: Option<&str>,
        _since: u64,
        _cb: Arc<dyn TapCallback>,
    ) -> OperationResult {
        Err(unsupported("tap_backfill", Protocol::Ascii))
    }

    fn tap_custom(
        &self,
        _id: Option<&str>,
        _request: TapRequest,
        _cb: Arc<dyn TapCallback>,
    ) -> OperationResult {
        Err(unsupported("tap_custom", Protocol::Ascii))
    }

    fn tap_ack(
        &self,
        _opcode: Opcode,
        _opaque: u32,
        _cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        Err(unsupported("tap_ack", Protocol::Ascii))
    }

    fn tap_dump(&self, _id: Option<&str>, _cb: Arc<dyn TapCallback>) -> OperationResult {
        Err(unsupported("tap_dump", Protocol::Ascii))
    }

    fn sasl_mechs(&self, _cb: Arc<dyn OperationCallback>) -> OperationResult {
        Err(unsupported("sasl_mechs", Protocol::Ascii))
    }

    fn sasl_auth(
        &self,
        _mechanism: SharedMechanism,
        _cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        Err(unsupported("sasl_auth", Protocol::Ascii))
    }

    fn sasl_step(
        &self,
        _mechanism: SharedMechanism,
        _challenge: Bytes,
        _cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        Err(unsupported("sasl_step", Protocol::Ascii))
    }
}
