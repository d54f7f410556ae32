//! Error types for analysis and optimization.

use derive_more::{Display, Error, From};

/// The value-range analysis could not reach a valid fixpoint.
///
/// Fatal for the optimization that requested it; never retried.
#[derive(Debug, Display, Error)]
pub enum AnalysisError {
    #[display("integer range analysis did not converge within {steps} steps over {op_count} ops")]
    FixpointExceeded { steps: usize, op_count: usize },

    #[display("malformed graph: {reason}")]
    MalformedGraph {
        #[error(not(source))]
        reason: String,
    },
}

/// Failure of the whole optimize entry point.
#[derive(Debug, Display, Error, From)]
pub enum OptimizeError {
    #[display("int range analysis failed: {_0}")]
    Analysis(AnalysisError),

    /// The outer analyze/rewrite loop exceeded its configured round cap.
    /// The core patterns are monotone-safe; this guards externally supplied
    /// canonicalization rules whose termination is not verified.
    #[display("int arithmetic optimization failed to converge after {rounds} round(s)")]
    #[from(ignore)]
    NonConvergence { rounds: usize },
}
