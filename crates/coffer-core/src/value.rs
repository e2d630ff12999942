//! JSON document values.
//!
//! A [`Value`] is stored as the raw bytes the client sent, validated once on
//! ingress. Operators that need to look inside (conditions, update functions)
//! get the parsed `serde_json::Value` view on demand.

use bytes::Bytes;
use serde_json::Value as Json;

use crate::error::{ErrorMessage, StoreError};

/// An opaque JSON document.
///
/// The root must be an object or an array — scalar roots are rejected on
/// ingress, so `json()` on a stored value cannot fail in practice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    raw: Bytes,
}

impl Value {
    /// Validates and wraps raw document bytes.
    ///
    /// Rejects anything that is not well-formed JSON with an object or array
    /// root.
    pub fn from_bytes(raw: Bytes) -> Result<Self, StoreError> {
        let parsed: Json = serde_json::from_slice(&raw).map_err(|e| {
            StoreError(ErrorMessage::bad_request(format!("invalid json document: {e}")))
        })?;
        match parsed {
            Json::Object(_) | Json::Array(_) => Ok(Self { raw }),
            other => Err(StoreError(ErrorMessage::bad_request(format!(
                "document root must be an object or array, got {}",
                json_type_name(&other)
            )))),
        }
    }

    /// Builds a value from an already-parsed document. Same root restriction
    /// as [`Value::from_bytes`].
    pub fn from_json(json: &Json) -> Result<Self, StoreError> {
        match json {
            Json::Object(_) | Json::Array(_) => Ok(Self {
                raw: Bytes::from(serde_json::to_vec(json).expect("serializing serde_json::Value")),
            }),
            other => Err(StoreError(ErrorMessage::bad_request(format!(
                "document root must be an object or array, got {}",
                json_type_name(other)
            )))),
        }
    }

    /// The raw document bytes, exactly as ingested.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_raw(self) -> Bytes {
        self.raw
    }

    /// Parses the document into the nested view operators work against.
    pub fn json(&self) -> Result<Json, StoreError> {
        serde_json::from_slice(&self.raw).map_err(|e| {
            StoreError(ErrorMessage::internal(format!("stored document no longer parses: {e}")))
        })
    }
}

fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn accepts_object_root() {
        let v = Value::from_bytes(Bytes::from_static(b"{\"v\":1}")).unwrap();
        assert_eq!(v.json().unwrap()["v"], 1);
    }

    #[test]
    fn accepts_array_root() {
        assert!(Value::from_bytes(Bytes::from_static(b"[1,2,3]")).is_ok());
    }

    #[test]
    fn rejects_scalar_roots() {
        for raw in [&b"42"[..], b"\"text\"", b"true", b"null"] {
            let err = Value::from_bytes(Bytes::copy_from_slice(raw)).unwrap_err();
            assert_eq!(err.code(), ErrorCode::BadRequest, "raw: {raw:?}");
        }
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Value::from_bytes(Bytes::from_static(b"{\"v\":")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }

    #[test]
    fn from_json_roundtrip() {
        let json = serde_json::json!({"a": {"b": [1, 2]}});
        let v = Value::from_json(&json).unwrap();
        assert_eq!(v.json().unwrap(), json);
    }

    #[test]
    fn from_json_rejects_scalar() {
        let err = Value::from_json(&serde_json::json!(7)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }
}
