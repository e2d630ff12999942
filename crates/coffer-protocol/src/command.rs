//! The command set: every request one node can make of another.
//!
//! Commands are double-dispatched: the originating node hands them to its
//! router to resolve a destination, the terminal node executes them against
//! its local store. Both surfaces live in the cluster crate; this module owns
//! the data and its wire form.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use coffer_core::{Predicate, Range, Update, Value};

use crate::wire::{
    get_predicate, get_range, get_string, get_string_list, get_u64_le, get_u8, get_update,
    get_value, invalid, put_predicate, put_range, put_string, put_string_list, put_update,
    put_value,
};

// Wire tags. Append-only.
const CMD_ADD_BUCKET: u8 = 1;
const CMD_REMOVE_BUCKET: u8 = 2;
const CMD_PUT_VALUE: u8 = 3;
const CMD_REMOVE_VALUE: u8 = 4;
const CMD_GET_VALUE: u8 = 5;
const CMD_GET_VALUES: u8 = 6;
const CMD_GET_KEYS: u8 = 7;
const CMD_GET_BUCKETS: u8 = 8;
const CMD_RANGE_QUERY: u8 = 9;
const CMD_UPDATE: u8 = 10;
const CMD_MEMBERSHIP: u8 = 11;

/// A serializable request. The empty predicate means "no guard".
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a bucket (idempotent).
    AddBucket { bucket: String },

    /// Drop a bucket and all its data.
    RemoveBucket { bucket: String },

    /// Store a document, optionally guarded by a predicate over the existing
    /// value.
    PutValue {
        bucket: String,
        key: String,
        value: Value,
        predicate: Predicate,
    },

    /// Delete one key.
    RemoveValue { bucket: String, key: String },

    /// Single-key read, optionally guarded.
    GetValue {
        bucket: String,
        key: String,
        predicate: Predicate,
    },

    /// Bulk read of the given keys on the receiving node.
    GetValues {
        bucket: String,
        keys: Vec<String>,
        predicate: Predicate,
    },

    /// All keys the receiving node holds for the bucket.
    GetKeys { bucket: String },

    /// Bucket-name inventory of the receiving node.
    GetBuckets,

    /// Ordered key subset; may be served from an index snapshot no older
    /// than `time_to_live_ms`.
    RangeQuery {
        bucket: String,
        range: Range,
        time_to_live_ms: u64,
    },

    /// Read-modify-write through a named function, bounded by its timeout.
    Update {
        bucket: String,
        key: String,
        update: Update,
    },

    /// Ask the receiving node for its cluster's current view.
    Membership,
}

impl Command {
    /// A short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::AddBucket { .. } => "add-bucket",
            Command::RemoveBucket { .. } => "remove-bucket",
            Command::PutValue { .. } => "put-value",
            Command::RemoveValue { .. } => "remove-value",
            Command::GetValue { .. } => "get-value",
            Command::GetValues { .. } => "get-values",
            Command::GetKeys { .. } => "get-keys",
            Command::GetBuckets => "get-buckets",
            Command::RangeQuery { .. } => "range-query",
            Command::Update { .. } => "update",
            Command::Membership => "membership",
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Command::AddBucket { bucket } => {
                buf.put_u8(CMD_ADD_BUCKET);
                put_string(buf, bucket);
            }
            Command::RemoveBucket { bucket } => {
                buf.put_u8(CMD_REMOVE_BUCKET);
                put_string(buf, bucket);
            }
            Command::PutValue {
                bucket,
                key,
                value,
                predicate,
            } => {
                buf.put_u8(CMD_PUT_VALUE);
                put_string(buf, bucket);
                put_string(buf, key);
                put_value(buf, value);
                put_predicate(buf, predicate);
            }
            Command::RemoveValue { bucket, key } => {
                buf.put_u8(CMD_REMOVE_VALUE);
                put_string(buf, bucket);
                put_string(buf, key);
            }
            Command::GetValue {
                bucket,
                key,
                predicate,
            } => {
                buf.put_u8(CMD_GET_VALUE);
                put_string(buf, bucket);
                put_string(buf, key);
                put_predicate(buf, predicate);
            }
            Command::GetValues {
                bucket,
                keys,
                predicate,
            } => {
                buf.put_u8(CMD_GET_VALUES);
                put_string(buf, bucket);
                put_string_list(buf, keys);
                put_predicate(buf, predicate);
            }
            Command::GetKeys { bucket } => {
                buf.put_u8(CMD_GET_KEYS);
                put_string(buf, bucket);
            }
            Command::GetBuckets => {
                buf.put_u8(CMD_GET_BUCKETS);
            }
            Command::RangeQuery {
                bucket,
                range,
                time_to_live_ms,
            } => {
                buf.put_u8(CMD_RANGE_QUERY);
                put_string(buf, bucket);
                put_range(buf, range);
                buf.put_u64_le(*time_to_live_ms);
            }
            Command::Update {
                bucket,
                key,
                update,
            } => {
                buf.put_u8(CMD_UPDATE);
                put_string(buf, bucket);
                put_string(buf, key);
                put_update(buf, update);
            }
            Command::Membership => {
                buf.put_u8(CMD_MEMBERSHIP);
            }
        }
    }

    pub fn decode(mut buf: &[u8]) -> io::Result<Self> {
        let tag = get_u8(&mut buf)?;
        match tag {
            CMD_ADD_BUCKET => Ok(Command::AddBucket {
                bucket: get_string(&mut buf)?,
            }),
            CMD_REMOVE_BUCKET => Ok(Command::RemoveBucket {
                bucket: get_string(&mut buf)?,
            }),
            CMD_PUT_VALUE => Ok(Command::PutValue {
                bucket: get_string(&mut buf)?,
                key: get_string(&mut buf)?,
                value: get_value(&mut buf)?,
                predicate: get_predicate(&mut buf)?,
            }),
            CMD_REMOVE_VALUE => Ok(Command::RemoveValue {
                bucket: get_string(&mut buf)?,
                key: get_string(&mut buf)?,
            }),
            CMD_GET_VALUE => Ok(Command::GetValue {
                bucket: get_string(&mut buf)?,
                key: get_string(&mut buf)?,
                predicate: get_predicate(&mut buf)?,
            }),
            CMD_GET_VALUES => Ok(Command::GetValues {
                bucket: get_string(&mut buf)?,
                keys: get_string_list(&mut buf, "key")?,
                predicate: get_predicate(&mut buf)?,
            }),
            CMD_GET_KEYS => Ok(Command::GetKeys {
                bucket: get_string(&mut buf)?,
            }),
            CMD_GET_BUCKETS => Ok(Command::GetBuckets),
            CMD_RANGE_QUERY => Ok(Command::RangeQuery {
                bucket: get_string(&mut buf)?,
                range: get_range(&mut buf)?,
                time_to_live_ms: get_u64_le(&mut buf)?,
            }),
            CMD_UPDATE => Ok(Command::Update {
                bucket: get_string(&mut buf)?,
                key: get_string(&mut buf)?,
                update: get_update(&mut buf)?,
            }),
            CMD_MEMBERSHIP => Ok(Command::Membership),
            other => Err(invalid(format!("unknown command tag: {other}"))),
        }
    }
}
