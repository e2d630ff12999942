//! coffer-core: the document store engine.
//!
//! Holds everything a single node needs to serve its share of the data:
//! JSON document values, named buckets of key/value pairs, the operator
//! registry (functions, conditions, comparators), and the error taxonomy
//! shared by every layer above.
//!
//! The distribution layer lives elsewhere — this crate never touches the
//! network and has no idea other nodes exist.

mod bucket;
mod error;
mod features;
mod merge;
mod operators;
mod store;
mod value;

pub use bucket::Bucket;
pub use error::{ErrorCode, ErrorMessage, StoreError};
pub use features::{Predicate, Range, Update};
pub use merge::merge_pair;
pub use operators::{
    Comparator, Condition, Function, LexicographicalComparator, MergeFunction,
    OperatorRegistry, PointerCondition, ReplaceFunction,
};
pub use store::Store;
pub use value::Value;
