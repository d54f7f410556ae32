//! PatternRewriter: mutation log for pattern rewrites.
//!
//! Patterns record mutations here; the `PatternApplicator` applies them after
//! the pattern returns and notifies the listener. Value replacement is done
//! via `IrContext::replace_all_uses` (RAUW), no operand remapping needed.

use smallvec::SmallVec;

use super::{MutationEvent, RewriteListener};
use crate::context::IrContext;
use crate::refs::{BlockRef, OpRef, ValueRef};

/// Accumulated mutations from a pattern rewrite.
pub(crate) struct Mutations {
    /// Operations to insert before the current op's position.
    pub(crate) prefix_ops: Vec<OpRef>,
    /// The replacement operation (if any).
    pub(crate) replacement: Option<OpRef>,
    /// If set, the operation is erased and its results mapped to these values.
    pub(crate) erase_values: Option<Vec<ValueRef>>,
    /// Operations the pattern mutated in place (directly on the context).
    pub(crate) modified: SmallVec<[OpRef; 1]>,
}

/// Rewriter interface for patterns.
///
/// Patterns use this to record mutations which are applied by the
/// `PatternApplicator` after the pattern returns.
pub struct PatternRewriter {
    prefix_ops: Vec<OpRef>,
    replacement: Option<OpRef>,
    erase_values: Option<Vec<ValueRef>>,
    modified: SmallVec<[OpRef; 1]>,
}

impl PatternRewriter {
    pub(crate) fn new() -> Self {
        Self {
            prefix_ops: Vec::new(),
            replacement: None,
            erase_values: None,
            modified: SmallVec::new(),
        }
    }

    // === Mutations ===

    /// Insert an operation before the current operation.
    ///
    /// The op must already be created via `ctx.create_op()` but not yet
    /// attached to a block. Multiple calls accumulate operations in order.
    pub fn insert_op(&mut self, op: OpRef) {
        self.prefix_ops.push(op);
    }

    /// Replace the current operation with a new one.
    ///
    /// The applicator will RAUW old results to new results (1:1 by index),
    /// then remove the old op from its block and insert the new one in its
    /// place.
    pub fn replace_op(&mut self, new_op: OpRef) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "replace_op called after replace_op or erase_op"
        );
        self.replacement = Some(new_op);
    }

    /// Erase the current operation, mapping its results to the given values.
    ///
    /// The replacement values must match the original result count.
    pub fn erase_op(&mut self, replacement_values: Vec<ValueRef>) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "erase_op called after replace_op or erase_op"
        );
        self.erase_values = Some(replacement_values);
    }

    /// Record that `op` was mutated in place (operands rewired or results
    /// retyped directly on the context). The listener will be notified with
    /// a `Modified` event for it.
    pub fn mark_modified(&mut self, op: OpRef) {
        self.modified.push(op);
    }

    // === Query ===

    pub(crate) fn has_mutations(&self) -> bool {
        !self.prefix_ops.is_empty()
            || self.replacement.is_some()
            || self.erase_values.is_some()
            || !self.modified.is_empty()
    }

    pub(crate) fn take_mutations(self) -> Mutations {
        Mutations {
            prefix_ops: self.prefix_ops,
            replacement: self.replacement,
            erase_values: self.erase_values,
            modified: self.modified,
        }
    }
}

impl Default for PatternRewriter {
    fn default() -> Self {
        Self::new()
    }
}

fn results_of(ctx: &IrContext, op: OpRef) -> SmallVec<[ValueRef; 2]> {
    ctx.op_results(op).into()
}

/// Apply mutations to the IR context, notifying the listener.
///
/// Events fire *before* the corresponding RAUW/unlink so the listener can
/// still traverse the use-chains of the affected results.
pub(crate) fn apply_mutations(
    ctx: &mut IrContext,
    original_op: OpRef,
    mutations: Mutations,
    listener: &mut dyn RewriteListener,
) {
    let parent_block: Option<BlockRef> = ctx.op(original_op).parent_block;

    // 1. Insert prefix ops before the original op
    if let Some(block) = parent_block {
        for prefix_op in &mutations.prefix_ops {
            ctx.insert_op_before(block, original_op, *prefix_op);
        }
    }

    // 2. Handle replacement or erasure
    if let Some(new_op) = mutations.replacement {
        listener.notify(
            ctx,
            &MutationEvent::Replaced {
                op: original_op,
                results: results_of(ctx, original_op),
            },
        );

        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        let new_results: Vec<ValueRef> = ctx.op_results(new_op).to_vec();
        debug_assert_eq!(
            old_results.len(),
            new_results.len(),
            "replace_op: result count mismatch ({} vs {})",
            old_results.len(),
            new_results.len()
        );
        for (old_v, new_v) in old_results.iter().zip(new_results.iter()) {
            ctx.replace_all_uses(*old_v, *new_v);
        }

        // Remove old from block, insert new in its place
        if let Some(block) = parent_block {
            let ops = ctx.block(block).ops.to_vec();
            let pos = ops.iter().position(|&o| o == original_op);
            ctx.remove_op_from_block(block, original_op);
            if let Some(pos) = pos {
                let ops_after = ctx.block(block).ops.to_vec();
                if pos < ops_after.len() {
                    ctx.insert_op_before(block, ops_after[pos], new_op);
                } else {
                    ctx.push_op(block, new_op);
                }
            } else {
                ctx.push_op(block, new_op);
            }
        }

        ctx.remove_op(original_op);
    } else if let Some(erase_values) = mutations.erase_values {
        listener.notify(
            ctx,
            &MutationEvent::Erased {
                op: original_op,
                results: results_of(ctx, original_op),
            },
        );

        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        debug_assert_eq!(
            old_results.len(),
            erase_values.len(),
            "erase_op: replacement value count mismatch ({} vs {})",
            old_results.len(),
            erase_values.len()
        );
        for (old_v, new_v) in old_results.iter().zip(erase_values.iter()) {
            ctx.replace_all_uses(*old_v, *new_v);
        }

        if let Some(block) = parent_block {
            ctx.remove_op_from_block(block, original_op);
        }
        ctx.remove_op(original_op);
    }

    // 3. In-place modifications
    for op in mutations.modified {
        listener.notify(
            ctx,
            &MutationEvent::Modified {
                op,
                results: results_of(ctx, op),
            },
        );
    }
}
