//! Named operators: update functions, value conditions, key comparators.
//!
//! Operators are resolved by name from an [`OperatorRegistry`] populated once
//! at process init. Every node in the ensemble must register the same names —
//! an update routed to a remote node is resolved again over there.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::error::{ErrorMessage, StoreError};

/// A pure read-modify-write function. May be killed by the caller's timeout,
/// so it must not hold resources.
pub trait Function: Send + Sync {
    fn apply(&self, key: &str, value: Json, params: &Map<String, Json>) -> Result<Json, StoreError>;
}

impl std::fmt::Debug for dyn Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function").finish()
    }
}

/// A value guard. `expression` comes from the predicate, uninterpreted.
pub trait Condition: Send + Sync {
    fn is_satisfied(&self, key: &str, value: &Json, expression: &str) -> bool;
}

/// A total order over keys.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Byte-wise lexicographical key order. The ensemble-wide default.
#[derive(Debug, Default)]
pub struct LexicographicalComparator;

impl Comparator for LexicographicalComparator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }
}

/// Condition type `pointer`: expression `"<json-pointer>=<json literal>"`.
///
/// Satisfied when the document has the pointed-at location and it equals the
/// literal. A malformed expression is never satisfied.
#[derive(Debug, Default)]
pub struct PointerCondition;

impl Condition for PointerCondition {
    fn is_satisfied(&self, _key: &str, value: &Json, expression: &str) -> bool {
        let Some((pointer, literal)) = expression.split_once('=') else {
            return false;
        };
        let Ok(expected) = serde_json::from_str::<Json>(literal) else {
            return false;
        };
        value.pointer(pointer) == Some(&expected)
    }
}

/// Update function `merge`: shallow-merges the params object into an object
/// document. Fails on array documents.
#[derive(Debug, Default)]
pub struct MergeFunction;

impl Function for MergeFunction {
    fn apply(&self, key: &str, value: Json, params: &Map<String, Json>) -> Result<Json, StoreError> {
        match value {
            Json::Object(mut fields) => {
                for (name, field) in params {
                    fields.insert(name.clone(), field.clone());
                }
                Ok(Json::Object(fields))
            }
            _ => Err(StoreError(ErrorMessage::bad_request(format!(
                "merge requires an object document for key '{key}'"
            )))),
        }
    }
}

/// Update function `replace`: the params object becomes the new document.
#[derive(Debug, Default)]
pub struct ReplaceFunction;

impl Function for ReplaceFunction {
    fn apply(&self, _key: &str, _value: Json, params: &Map<String, Json>) -> Result<Json, StoreError> {
        Ok(Json::Object(params.clone()))
    }
}

/// The explicit registration table, populated at boot.
pub struct OperatorRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
    conditions: HashMap<String, Arc<dyn Condition>>,
    comparators: HashMap<String, Arc<dyn Comparator>>,
    default_comparator: Arc<dyn Comparator>,
}

impl OperatorRegistry {
    /// An empty registry with only the default lexicographical comparator.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
            conditions: HashMap::new(),
            comparators: HashMap::new(),
            default_comparator: Arc::new(LexicographicalComparator),
        }
    }

    /// The stock registry every node boots with: `lexicographical` comparator,
    /// `pointer` condition, `merge` and `replace` functions.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_comparator("lexicographical", Arc::new(LexicographicalComparator));
        registry.register_condition("pointer", Arc::new(PointerCondition));
        registry.register_function("merge", Arc::new(MergeFunction));
        registry.register_function("replace", Arc::new(ReplaceFunction));
        registry
    }

    pub fn register_function(&mut self, name: impl Into<String>, function: Arc<dyn Function>) {
        self.functions.insert(name.into(), function);
    }

    pub fn register_condition(&mut self, name: impl Into<String>, condition: Arc<dyn Condition>) {
        self.conditions.insert(name.into(), condition);
    }

    pub fn register_comparator(&mut self, name: impl Into<String>, comparator: Arc<dyn Comparator>) {
        self.comparators.insert(name.into(), comparator);
    }

    /// Resolves a function by name. Unknown names are a `BadRequest`.
    pub fn function(&self, name: &str) -> Result<Arc<dyn Function>, StoreError> {
        self.functions.get(name).cloned().ok_or_else(|| {
            StoreError(ErrorMessage::bad_request(format!("unknown update function: {name}")))
        })
    }

    /// Resolves a condition by name. Unknown names are a `BadRequest`.
    pub fn condition(&self, name: &str) -> Result<Arc<dyn Condition>, StoreError> {
        self.conditions.get(name).cloned().ok_or_else(|| {
            StoreError(ErrorMessage::bad_request(format!("unknown condition type: {name}")))
        })
    }

    /// Resolves a comparator by name, falling back to the default order for
    /// unknown (or empty) names.
    pub fn comparator_or_default(&self, name: &str) -> Arc<dyn Comparator> {
        self.comparators
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_comparator.clone())
    }

    pub fn default_comparator(&self) -> Arc<dyn Comparator> {
        self.default_comparator.clone()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
