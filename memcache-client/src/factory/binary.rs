use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use protocol_memcache::binary::{
    BinaryRequest, Opcode, TAP_FLAG_BACKFILL, TAP_FLAG_DUMP,
};

use super::{
    OperationFactory, OperationResult, Protocol, TapRequest, unsupported, validate_key,
    validate_keys,
};
use crate::callback::{
    Callback, ConfigCallback, GetCallback, GetsCallback, OperationCallback, ReplicaGetCallback,
    StatsCallback, StoreCallback, TapCallback,
};
use crate::operation::{BinaryOperation, ConcatenationType, Mutator, OperationKind, StoreType};
use crate::sasl::{SaslOperation, SaslStage, SharedMechanism};

/// Builds binary protocol operations, including SASL and TAP.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryOperationFactory;

impl BinaryOperationFactory {
    pub fn new() -> Self {
        Self
    }
}

fn keyed(
    kind: OperationKind,
    key: Bytes,
    callback: Callback,
    request: impl FnOnce(Bytes, u32) -> BinaryRequest,
) -> OperationResult {
    let request_key = key.clone();
    Ok(Box::new(BinaryOperation::new(
        kind,
        vec![key],
        callback,
        move |opaque| request(request_key, opaque),
    )))
}

fn unkeyed(
    kind: OperationKind,
    callback: Callback,
    request: impl FnOnce(u32) -> BinaryRequest,
) -> OperationResult {
    Ok(Box::new(BinaryOperation::new(kind, vec![], callback, request)))
}

fn store_opcode(store_type: StoreType) -> Opcode {
    match store_type {
        StoreType::Set => Opcode::Set,
        StoreType::Add => Opcode::Add,
        StoreType::Replace => Opcode::Replace,
    }
}

fn tap_connect(
    kind: OperationKind,
    id: Option<&str>,
    flags: u32,
    payload: Bytes,
    cb: Arc<dyn TapCallback>,
) -> OperationResult {
    let name = id.unwrap_or_default().to_string();
    unkeyed(kind, Callback::Tap(cb), move |opaque| {
        BinaryRequest::tap_connect(&name, flags, payload, opaque)
    })
}

impl OperationFactory for BinaryOperationFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Binary
    }

    fn get(&self, key: &[u8], cb: Arc<dyn GetCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        keyed(OperationKind::Get, key, Callback::Get(cb), BinaryRequest::get)
    }

    /// Pipelined quiet gets closed by a NOOP; misses produce no packet.
    fn get_multi(&self, keys: &[&[u8]], cb: Arc<dyn GetCallback>) -> OperationResult {
        let keys = validate_keys(keys, Protocol::Binary)?;
        if keys.len() == 1 {
            return keyed(
                OperationKind::Get,
                keys[0].clone(),
                Callback::Get(cb),
                BinaryRequest::get,
            );
        }
        let request_keys = keys.clone();
        Ok(Box::new(BinaryOperation::pipelined(
            OperationKind::Get,
            keys,
            Callback::Get(cb),
            move |opaque| {
                request_keys
                    .into_iter()
                    .map(|key| BinaryRequest::new(Opcode::GetKQ, opaque).key(key))
                    .collect()
            },
        )))
    }

    fn gets(&self, key: &[u8], cb: Arc<dyn GetsCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        keyed(OperationKind::Gets, key, Callback::Gets(cb), BinaryRequest::get)
    }

    fn get_and_touch(
        &self,
        key: &[u8],
        expiration: u32,
        cb: Arc<dyn GetsCallback>,
    ) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        keyed(
            OperationKind::GetAndTouch,
            key,
            Callback::Gets(cb),
            move |key, opaque| BinaryRequest::gat(key, expiration, opaque),
        )
    }

    fn getl(&self, key: &[u8], expiration: u32, cb: Arc<dyn GetsCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        keyed(
            OperationKind::GetLocked,
            key,
            Callback::Gets(cb),
            move |key, opaque| BinaryRequest::get_locked(key, expiration, opaque),
        )
    }

    fn replica_get(
        &self,
        key: &[u8],
        index: u16,
        cb: Arc<dyn ReplicaGetCallback>,
    ) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        let request_key = key.clone();
        Ok(Box::new(
            BinaryOperation::new(
                OperationKind::ReplicaGet,
                vec![key],
                Callback::ReplicaGet(cb),
                move |opaque| BinaryRequest::get_replica(request_key, index, opaque),
            )
            .with_replica_index(index),
        ))
    }

    fn replica_gets(&self, key: &[u8], index: u16, cb: Arc<dyn GetsCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        let request_key = key.clone();
        Ok(Box::new(
            BinaryOperation::new(
                OperationKind::ReplicaGets,
                vec![key],
                Callback::Gets(cb),
                move |opaque| BinaryRequest::get_replica(request_key, index, opaque),
            )
            .with_replica_index(index),
        ))
    }

    fn delete(&self, key: &[u8], cb: Arc<dyn OperationCallback>) -> OperationResult {
        self.delete_cas(key, 0, cb)
    }

    fn delete_cas(&self, key: &[u8], cas: u64, cb: Arc<dyn OperationCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        keyed(
            OperationKind::Delete,
            key,
            Callback::Status(cb),
            move |key, opaque| BinaryRequest::delete(key, cas, opaque),
        )
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
        let key = validate_key(key, Protocol::Binary)?;
        keyed(
            OperationKind::Store(store_type),
            key,
            Callback::Store(cb),
            move |key, opaque| {
                BinaryRequest::store(store_opcode(store_type), key, data, flags, expiration, 0, opaque)
            },
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
        let key = validate_key(key, Protocol::Binary)?;
        keyed(
            OperationKind::Cas,
            key,
            Callback::Store(cb),
            move |key, opaque| {
                BinaryRequest::store(
                    store_opcode(store_type),
                    key,
                    data,
                    flags,
                    expiration,
                    cas,
                    opaque,
                )
            },
        )
    }

    fn cat(
        &self,
        cat_type: ConcatenationType,
        cas: u64,
        key: &[u8],
        data: Bytes,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        let opcode = match cat_type {
            ConcatenationType::Append => Opcode::Append,
            ConcatenationType::Prepend => Opcode::Prepend,
        };
        keyed(
            OperationKind::Concatenate(cat_type),
            key,
            Callback::Status(cb),
            move |key, opaque| BinaryRequest::concat(opcode, key, data, cas, opaque),
        )
    }

    fn touch(&self, key: &[u8], expiration: u32, cb: Arc<dyn OperationCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        keyed(
            OperationKind::Touch,
            key,
            Callback::Status(cb),
            move |key, opaque| BinaryRequest::touch(key, expiration, opaque),
        )
    }

    fn mutate(
        &self,
        mutator: Mutator,
        key: &[u8],
        by: u64,
        default: u64,
        expiration: u32,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        let opcode = match mutator {
            Mutator::Incr => Opcode::Increment,
            Mutator::Decr => Opcode::Decrement,
        };
        keyed(
            OperationKind::Mutate(mutator),
            key,
            Callback::Status(cb),
            move |key, opaque| BinaryRequest::counter(opcode, key, by, default, expiration, opaque),
        )
    }

    fn flush(&self, delay: u32, cb: Arc<dyn OperationCallback>) -> OperationResult {
        unkeyed(OperationKind::Flush, Callback::Status(cb), move |opaque| {
            BinaryRequest::flush(delay, opaque)
        })
    }

    fn version(&self, cb: Arc<dyn OperationCallback>) -> OperationResult {
        unkeyed(OperationKind::Version, Callback::Status(cb), |opaque| {
            BinaryRequest::new(Opcode::Version, opaque)
        })
    }

    fn noop(&self, cb: Arc<dyn OperationCallback>) -> OperationResult {
        unkeyed(OperationKind::Noop, Callback::Status(cb), |opaque| {
            BinaryRequest::new(Opcode::Noop, opaque)
        })
    }

    fn stats(&self, arg: Option<&str>, cb: Arc<dyn StatsCallback>) -> OperationResult {
        let arg = arg.map(str::to_string);
        unkeyed(OperationKind::Stats, Callback::Stats(cb), move |opaque| {
            BinaryRequest::stat(arg.as_deref(), opaque)
        })
    }

    /// Requests the `key <key>` stats group.
    fn key_stats(&self, key: &[u8], cb: Arc<dyn StatsCallback>) -> OperationResult {
        let key = validate_key(key, Protocol::Binary)?;
        let mut group = BytesMut::with_capacity(4 + key.len());
        group.put_slice(b"key ");
        group.put_slice(&key);
        let group = group.freeze();
        Ok(Box::new(BinaryOperation::new(
            OperationKind::KeyStats,
            vec![key],
            Callback::Stats(cb),
            move |opaque| BinaryRequest::new(Opcode::Stat, opaque).key(group),
        )))
    }

    fn get_config(&self, config_type: &str, cb: Arc<dyn ConfigCallback>) -> OperationResult {
        let config_type = validate_key(config_type.as_bytes(), Protocol::Binary)?;
        unkeyed(OperationKind::GetConfig, Callback::Config(cb), move |opaque| {
            BinaryRequest::new(Opcode::GetConfig, opaque).key(config_type)
        })
    }

    fn set_config(
        &self,
        config_type: &str,
        flags: u32,
        data: Bytes,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let config_type = validate_key(config_type.as_bytes(), Protocol::Binary)?;
        unkeyed(OperationKind::SetConfig, Callback::Status(cb), move |opaque| {
            BinaryRequest::new(Opcode::SetConfig, opaque)
                .key(config_type)
                .extras(flags.to_be_bytes().to_vec())
                .value(data)
        })
    }

    fn delete_config(
        &self,
        config_type: &str,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let config_type = validate_key(config_type.as_bytes(), Protocol::Binary)?;
        unkeyed(OperationKind::DeleteConfig, Callback::Status(cb), move |opaque| {
            BinaryRequest::new(Opcode::DeleteConfig, opaque).key(config_type)
        })
    }

    fn refresh_certificate(&self, _cb: Arc<dyn OperationCallback>) -> OperationResult {
        Err(unsupported("refresh_certificate", Protocol::Binary))
    }

    fn tap_backfill(
        &self,
        id: Option<&str>,
        since: u64,
        cb: Arc<dyn TapCallback>,
    ) -> OperationResult {
        let payload = Bytes::copy_from_slice(&since.to_be_bytes());
        tap_connect(OperationKind::TapBackfill, id, TAP_FLAG_BACKFILL, payload, cb)
    }

    fn tap_custom(
        &self,
        id: Option<&str>,
        request: TapRequest,
        cb: Arc<dyn TapCallback>,
    ) -> OperationResult {
        tap_connect(OperationKind::TapCustom, id, request.flags, request.payload, cb)
    }

    fn tap_ack(
        &self,
        opcode: Opcode,
        opaque: u32,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        let request = BinaryRequest::new(opcode, opaque).as_response();
        Ok(Box::new(BinaryOperation::reply(
            OperationKind::TapAck,
            request,
            Callback::Status(cb),
        )))
    }

    fn tap_dump(&self, id: Option<&str>, cb: Arc<dyn TapCallback>) -> OperationResult {
        tap_connect(OperationKind::TapDump, id, TAP_FLAG_DUMP, Bytes::new(), cb)
    }

    fn sasl_mechs(&self, cb: Arc<dyn OperationCallback>) -> OperationResult {
        unkeyed(OperationKind::SaslMechs, Callback::Status(cb), BinaryRequest::sasl_list_mechs)
    }

    fn sasl_auth(
        &self,
        mechanism: SharedMechanism,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        Ok(Box::new(SaslOperation::new(
            SaslStage::Auth,
            mechanism,
            Callback::Status(cb),
        )))
    }

    fn sasl_step(
        &self,
        mechanism: SharedMechanism,
        challenge: Bytes,
        cb: Arc<dyn OperationCallback>,
    ) -> OperationResult {
        Ok(Box::new(SaslOperation::new(
            SaslStage::Step { challenge },
            mechanism,
            Callback::Status(cb),
        )))
    }
}
