//! Object model and type lattice shared across the Glyph workspace.
//!
//! `glyph-core` owns nothing that depends on how code is parsed,
//! assembled, or scheduled: just what a value *is* (`value`), how values
//! relate under the type lattice (`types`, `restriction`), the error
//! taxonomy every other crate reports through (`error`), and the
//! generational arena used to represent cyclic value graphs (`arena`).

pub mod arena;
pub mod error;
pub mod restriction;
pub mod types;
pub mod value;

pub use arena::{Arena, ValueRef};
pub use error::{ErrorKind, RuntimeError};
pub use restriction::TypeRestriction;
pub use types::{Range, Type};
pub use value::{unify_equal_tuples, GlyphMap, GlyphString, GlyphTuple, Heap, Mutability, OrdKey, Value};
