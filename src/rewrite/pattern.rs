//! Rewrite pattern trait.

use super::rewriter::PatternRewriter;
use crate::context::IrContext;
use crate::refs::OpRef;

/// A pattern that can match and transform IR operations.
///
/// # Arguments
///
/// - `ctx`: Mutable reference to the IR context for querying and mutation.
/// - `op`: The operation to match against.
/// - `rewriter`: Accumulates mutations (insert, replace, erase, modify).
///
/// # Return Value
///
/// Return `true` if the pattern matched and recorded mutations via the
/// rewriter. Return `false` if the pattern does not apply; a failed match is
/// expected and silent, never an error.
pub trait RewritePattern {
    /// Attempt to match and rewrite an operation.
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool;

    /// Optional: return a human-readable name for debugging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
