//! Structured runtime types backing the mutable and composite `Value` variants.
//!
//! `Dict` and `Set` are insertion-ordered and keyed by `HashKey`, `Range` is a lazy
//! integer sequence, and `Type` names a value's class and doubles as the callable
//! constructor bound to `int`, `list`, `range`, etc.
pub mod dict;
pub mod range;
pub mod repr;
pub mod set;
pub mod r#type;

pub use dict::Dict;
pub use range::Range;
pub use set::Set;
pub use r#type::Type;
