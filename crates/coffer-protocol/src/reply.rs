//! Replies: the single response frame every command send produces.

use std::collections::HashMap;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use coffer_core::{ErrorCode, ErrorMessage, Value};

use crate::membership::View;
use crate::wire::{
    get_bytes, get_count, get_string, get_string_list, get_u16_le, get_u8, get_value, invalid,
    put_bytes, put_string, put_string_list, put_value,
};

const STATUS_OK: u8 = 0;
const STATUS_ERROR: u8 = 1;

const PAYLOAD_NONE: u8 = 0;
const PAYLOAD_VALUE: u8 = 1;
const PAYLOAD_VALUE_MAP: u8 = 2;
const PAYLOAD_KEYS: u8 = 3;
const PAYLOAD_BUCKETS: u8 = 4;
const PAYLOAD_VIEW: u8 = 5;

/// A successful command result. Failures travel as an [`ErrorMessage`]
/// instead, never as a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Nothing to return (writes, schema ops, updates).
    None,
    /// One document.
    Value(Value),
    /// Documents by key; unordered.
    ValueMap(HashMap<String, Value>),
    /// Keys in the order the receiving node produced them.
    Keys(Vec<String>),
    /// Bucket names; unordered.
    Buckets(Vec<String>),
    /// A membership snapshot.
    View(View),
}

impl Reply {
    /// Encodes a success frame body.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(STATUS_OK);
        match self {
            Reply::None => buf.put_u8(PAYLOAD_NONE),
            Reply::Value(value) => {
                buf.put_u8(PAYLOAD_VALUE);
                put_value(&mut buf, value);
            }
            Reply::ValueMap(entries) => {
                buf.put_u8(PAYLOAD_VALUE_MAP);
                buf.put_u32_le(entries.len() as u32);
                for (key, value) in entries {
                    put_string(&mut buf, key);
                    put_value(&mut buf, value);
                }
            }
            Reply::Keys(keys) => {
                buf.put_u8(PAYLOAD_KEYS);
                put_string_list(&mut buf, keys);
            }
            Reply::Buckets(buckets) => {
                buf.put_u8(PAYLOAD_BUCKETS);
                put_string_list(&mut buf, buckets);
            }
            Reply::View(view) => {
                buf.put_u8(PAYLOAD_VIEW);
                view.encode_into(&mut buf);
            }
        }
        buf.freeze()
    }

    /// Encodes a failure frame body carrying the error unchanged.
    pub fn encode_error(error: &ErrorMessage) -> Bytes {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u8(STATUS_ERROR);
        buf.put_u16_le(error.code.as_wire());
        put_bytes(&mut buf, error.message.as_bytes());
        buf.freeze()
    }

    /// Decodes a reply frame body into either a payload or the remote error.
    pub fn decode(mut buf: &[u8]) -> io::Result<Result<Reply, ErrorMessage>> {
        let status = get_u8(&mut buf)?;
        match status {
            STATUS_OK => Ok(Ok(Self::decode_payload(&mut buf)?)),
            STATUS_ERROR => {
                let code = ErrorCode::from_wire(get_u16_le(&mut buf)?);
                let raw = get_bytes(&mut buf)?;
                let message = String::from_utf8(raw)
                    .map_err(|e| invalid(format!("error message not utf-8: {e}")))?;
                Ok(Err(ErrorMessage::new(code, message)))
            }
            other => Err(invalid(format!("unknown reply status: {other}"))),
        }
    }

    fn decode_payload(buf: &mut &[u8]) -> io::Result<Reply> {
        let tag = get_u8(buf)?;
        match tag {
            PAYLOAD_NONE => Ok(Reply::None),
            PAYLOAD_VALUE => Ok(Reply::Value(get_value(buf)?)),
            PAYLOAD_VALUE_MAP => {
                let count = get_count(buf, "value map entry")?;
                let mut entries = HashMap::with_capacity(count);
                for _ in 0..count {
                    let key = get_string(buf)?;
                    entries.insert(key, get_value(buf)?);
                }
                Ok(Reply::ValueMap(entries))
            }
            PAYLOAD_KEYS => Ok(Reply::Keys(get_string_list(buf, "key")?)),
            PAYLOAD_BUCKETS => Ok(Reply::Buckets(get_string_list(buf, "bucket")?)),
            PAYLOAD_VIEW => Ok(Reply::View(View::decode(buf)?)),
            other => Err(invalid(format!("unknown payload tag: {other}"))),
        }
    }
}
