//! Query features: the small argument structures carried by commands.

use serde_json::Map;

use crate::error::{ErrorMessage, StoreError};

/// A value guard, encoded as `"type:expression"`.
///
/// The type names a registered [`Condition`](crate::Condition); the expression
/// is opaque to everything but that condition. An empty predicate means
/// "no guard".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    condition_type: String,
    expression: String,
}

impl Predicate {
    /// No guard.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the `"type:expression"` encoding. The empty string is the empty
    /// predicate; a non-empty string must carry a non-empty type before the
    /// first `:`.
    pub fn parse(encoded: &str) -> Result<Self, StoreError> {
        if encoded.is_empty() {
            return Ok(Self::empty());
        }
        match encoded.split_once(':') {
            Some((kind, expression)) if !kind.is_empty() => Ok(Self {
                condition_type: kind.to_string(),
                expression: expression.to_string(),
            }),
            _ => Err(StoreError(ErrorMessage::bad_request(format!(
                "malformed predicate '{encoded}': expected 'type:expression'"
            )))),
        }
    }

    pub fn new(condition_type: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            expression: expression.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.condition_type.is_empty()
    }

    pub fn condition_type(&self) -> &str {
        &self.condition_type
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The wire encoding. Empty predicates encode as the empty string.
    pub fn encoded(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("{}:{}", self.condition_type, self.expression)
        }
    }
}

/// A key range for ordered queries. `end_key` is inclusive; `None` means
/// "to the end". `limit` of 0 means unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start_key: String,
    pub end_key: Option<String>,
    pub limit: usize,
    pub comparator_name: String,
}

impl Range {
    pub fn new(
        start_key: impl Into<String>,
        end_key: Option<String>,
        limit: usize,
        comparator_name: impl Into<String>,
    ) -> Self {
        Self {
            start_key: start_key.into(),
            end_key,
            limit,
            comparator_name: comparator_name.into(),
        }
    }
}

/// A read-modify-write request: which function to run, how long it may take,
/// and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub function_name: String,
    pub timeout_ms: u64,
    pub params: Map<String, serde_json::Value>,
}

impl Update {
    pub fn new(
        function_name: impl Into<String>,
        timeout_ms: u64,
        params: Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            timeout_ms,
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn parse_typed_predicate() {
        let p = Predicate::parse("pointer:/v=1").unwrap();
        assert_eq!(p.condition_type(), "pointer");
        assert_eq!(p.expression(), "/v=1");
        assert!(!p.is_empty());
    }

    #[test]
    fn expression_may_contain_colons() {
        let p = Predicate::parse("pointer:/url=\"http://x\"").unwrap();
        assert_eq!(p.expression(), "/url=\"http://x\"");
    }

    #[test]
    fn empty_string_is_empty_predicate() {
        let p = Predicate::parse("").unwrap();
        assert!(p.is_empty());
        assert_eq!(p.encoded(), "");
    }

    #[test]
    fn missing_type_is_rejected() {
        for bad in ["justwords", ":expr"] {
            let err = Predicate::parse(bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::BadRequest, "input: {bad}");
        }
    }

    #[test]
    fn encoded_roundtrip() {
        let p = Predicate::new("pointer", "/a=2");
        assert_eq!(Predicate::parse(&p.encoded()).unwrap(), p);
    }
}
