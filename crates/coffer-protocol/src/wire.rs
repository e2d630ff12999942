//! Shared field encoding for the binary protocol.
//!
//! All multi-byte integers are little-endian. Strings are u16-length-prefixed
//! UTF-8; document payloads are u32-length-prefixed raw bytes. Collection
//! counts are bounded to keep crafted messages from forcing huge allocations.

use std::io::{self, Read};

use bytes::{Buf, BufMut, BytesMut};

use coffer_core::{Predicate, Range, Update, Value};

/// Upper bound for any count field (keys, members, map entries).
pub(crate) const MAX_COLLECTION_COUNT: usize = 65_536;

pub(crate) fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

// Checked readers that fail with io::Error instead of panicking on
// truncated input.

pub(crate) fn get_u8(buf: &mut &[u8]) -> io::Result<u8> {
    if buf.is_empty() {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 1 byte"));
    }
    Ok(buf.get_u8())
}

pub(crate) fn get_u16_le(buf: &mut &[u8]) -> io::Result<u16> {
    if buf.len() < 2 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 2 bytes"));
    }
    Ok(buf.get_u16_le())
}

pub(crate) fn get_u32_le(buf: &mut &[u8]) -> io::Result<u32> {
    if buf.len() < 4 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 4 bytes"));
    }
    Ok(buf.get_u32_le())
}

pub(crate) fn get_u64_le(buf: &mut &[u8]) -> io::Result<u64> {
    if buf.len() < 8 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "need 8 bytes"));
    }
    Ok(buf.get_u64_le())
}

pub(crate) fn put_string(buf: &mut BytesMut, s: &str) {
    debug_assert!(s.len() <= u16::MAX as usize, "string field too long");
    buf.put_u16_le(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

pub(crate) fn get_string(buf: &mut &[u8]) -> io::Result<String> {
    let len = get_u16_le(buf)? as usize;
    if buf.len() < len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated string"));
    }
    let mut bytes = vec![0u8; len];
    buf.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| invalid(format!("string field not utf-8: {e}")))
}

pub(crate) fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn get_bytes(buf: &mut &[u8]) -> io::Result<Vec<u8>> {
    let len = get_u32_le(buf)? as usize;
    if buf.len() < len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated byte field"));
    }
    let mut bytes = vec![0u8; len];
    buf.read_exact(&mut bytes)?;
    Ok(bytes)
}

pub(crate) fn get_count(buf: &mut &[u8], what: &str) -> io::Result<usize> {
    let count = get_u32_le(buf)? as usize;
    if count > MAX_COLLECTION_COUNT {
        return Err(invalid(format!("{what} count {count} exceeds limit")));
    }
    Ok(count)
}

pub(crate) fn put_string_list(buf: &mut BytesMut, items: &[String]) {
    let count = items.len().min(MAX_COLLECTION_COUNT);
    buf.put_u32_le(count as u32);
    for item in &items[..count] {
        put_string(buf, item);
    }
}

pub(crate) fn get_string_list(buf: &mut &[u8], what: &str) -> io::Result<Vec<String>> {
    let count = get_count(buf, what)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(get_string(buf)?);
    }
    Ok(items)
}

pub(crate) fn put_value(buf: &mut BytesMut, value: &Value) {
    put_bytes(buf, value.raw());
}

pub(crate) fn get_value(buf: &mut &[u8]) -> io::Result<Value> {
    let raw = get_bytes(buf)?;
    Value::from_bytes(raw.into()).map_err(|e| invalid(format!("invalid document payload: {e}")))
}

pub(crate) fn put_predicate(buf: &mut BytesMut, predicate: &Predicate) {
    put_string(buf, &predicate.encoded());
}

pub(crate) fn get_predicate(buf: &mut &[u8]) -> io::Result<Predicate> {
    let encoded = get_string(buf)?;
    Predicate::parse(&encoded).map_err(|e| invalid(format!("invalid predicate: {e}")))
}

pub(crate) fn put_range(buf: &mut BytesMut, range: &Range) {
    put_string(buf, &range.start_key);
    match &range.end_key {
        Some(end) => {
            buf.put_u8(1);
            put_string(buf, end);
        }
        None => buf.put_u8(0),
    }
    buf.put_u64_le(range.limit as u64);
    put_string(buf, &range.comparator_name);
}

pub(crate) fn get_range(buf: &mut &[u8]) -> io::Result<Range> {
    let start_key = get_string(buf)?;
    let end_key = match get_u8(buf)? {
        0 => None,
        1 => Some(get_string(buf)?),
        other => return Err(invalid(format!("bad end-key marker: {other}"))),
    };
    let limit = get_u64_le(buf)? as usize;
    let comparator_name = get_string(buf)?;
    Ok(Range {
        start_key,
        end_key,
        limit,
        comparator_name,
    })
}

pub(crate) fn put_update(buf: &mut BytesMut, update: &Update) {
    put_string(buf, &update.function_name);
    buf.put_u64_le(update.timeout_ms);
    let params = serde_json::to_vec(&update.params).expect("serializing params map");
    put_bytes(buf, &params);
}

pub(crate) fn get_update(buf: &mut &[u8]) -> io::Result<Update> {
    let function_name = get_string(buf)?;
    let timeout_ms = get_u64_le(buf)?;
    let raw = get_bytes(buf)?;
    let params = serde_json::from_slice(&raw)
        .map_err(|e| invalid(format!("update params not a json object: {e}")))?;
    Ok(Update {
        function_name,
        timeout_ms,
        params,
    })
}
