//! Value-range analysis.
//!
//! `range` defines the interval lattice and its transfer functions; `dataflow`
//! runs the combined reachability + range fixpoint over a region and produces
//! a [`dataflow::FactStore`].

pub mod dataflow;
pub mod range;

pub use dataflow::{FactStore, RangeAnalysis};
pub use range::IntRange;
