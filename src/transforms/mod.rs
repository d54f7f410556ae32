//! IR transformation passes.

pub mod optimize_int_arithmetic;

pub use optimize_int_arithmetic::{
    ConvertOpToUnsigned, DataflowInvalidationListener, FoldIdentityIndexCast,
    HoistIndexCastUiProducer, OptimizeConfig, OptimizeResult, SAFE_INDEX_UNSIGNED_MAX_VALUE,
    optimize,
};
