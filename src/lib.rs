//! narrow-ir: integer range analysis and arithmetic narrowing.
//!
//! This crate couples a monotone value-range dataflow analysis with a greedy
//! rewrite driver over a small arena-based IR. The analysis computes, for every
//! integer SSA value, a sound interval under both signed and unsigned
//! interpretation; the rewrite patterns then demote signed arithmetic to its
//! unsigned equivalent and narrow index casts wherever the computed ranges
//! prove it safe. An invalidation listener keeps the analysis facts consistent
//! while rewrites mutate the graph underneath them.
//!
//! The entry point is [`transforms::optimize_int_arithmetic::optimize`].

// === IR infrastructure ===
pub mod context;
pub mod location;
pub mod refs;
pub mod symbol;
pub mod types;

// === Dialect modules ===
pub mod dialect;

// === Analysis & rewriting ===
pub mod analysis;
pub mod errors;
pub mod rewrite;
pub mod transforms;

pub use context::{BlockData, IrContext, OperationData, OperationDataBuilder, RegionData, Use};
pub use errors::{AnalysisError, OptimizeError};
pub use location::Span;
pub use refs::{BlockRef, OpRef, PathRef, RegionRef, TypeRef, ValueDef, ValueRef};
pub use symbol::Symbol;
pub use types::{Attribute, Location, PathInterner, TypeData, TypeDataBuilder, TypeInterner};
