//! PatternApplicator: greedy fixpoint application of rewrite patterns.
//!
//! Uses snapshots of block operations and checks `parent_block` validity to
//! skip deleted ops. Ops within a block are visited bottom-up (in reverse),
//! which produces fewer invalidation cascades for the dataflow listener:
//! consumers are rewritten before the producers they read from.

use super::Module;
use super::pattern::RewritePattern;
use super::rewriter::{self, PatternRewriter};
use super::{NullListener, RewriteListener};
use crate::context::IrContext;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Result of applying rewrite patterns.
pub struct ApplyResult {
    /// Number of fixpoint iterations performed.
    pub iterations: usize,
    /// Total number of pattern matches (mutations applied).
    pub total_changes: usize,
    /// Whether the fixpoint was reached (no changes in last iteration).
    pub reached_fixpoint: bool,
}

/// Applies rewrite patterns using visitor-based fixpoint iteration.
pub struct PatternApplicator {
    patterns: Vec<Box<dyn RewritePattern>>,
    max_iterations: usize,
}

impl PatternApplicator {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            max_iterations: 10,
        }
    }

    /// Add a rewrite pattern.
    pub fn add_pattern(mut self, pattern: impl RewritePattern + 'static) -> Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    /// Add already-boxed patterns (e.g. caller-supplied canonicalizations).
    pub fn add_boxed_patterns(
        mut self,
        patterns: impl IntoIterator<Item = Box<dyn RewritePattern>>,
    ) -> Self {
        self.patterns.extend(patterns);
        self
    }

    /// Set maximum fixpoint iterations.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    /// Apply patterns to exhaustion without a listener.
    pub fn apply(&self, ctx: &mut IrContext, module: Module) -> ApplyResult {
        let mut listener = NullListener;
        self.apply_with_listener(ctx, module, &mut listener)
    }

    /// Apply patterns to exhaustion, notifying `listener` of every mutation.
    pub fn apply_with_listener(
        &self,
        ctx: &mut IrContext,
        module: Module,
        listener: &mut dyn RewriteListener,
    ) -> ApplyResult {
        let mut total_changes = 0;
        let mut iterations = 0;

        for _ in 0..self.max_iterations {
            iterations += 1;
            let changes = self.visit_region(ctx, module.body(ctx), listener);
            total_changes += changes;
            if changes == 0 {
                return ApplyResult {
                    iterations,
                    total_changes,
                    reached_fixpoint: true,
                };
            }
            tracing::debug!(iteration = iterations, changes, "pattern sweep");
        }

        ApplyResult {
            iterations,
            total_changes,
            reached_fixpoint: false,
        }
    }

    fn visit_region(
        &self,
        ctx: &mut IrContext,
        region: RegionRef,
        listener: &mut dyn RewriteListener,
    ) -> usize {
        let mut changes = 0;
        let blocks: Vec<BlockRef> = ctx.region(region).blocks.to_vec();
        for block in blocks {
            changes += self.visit_block(ctx, block, listener);
        }
        changes
    }

    fn visit_block(
        &self,
        ctx: &mut IrContext,
        block: BlockRef,
        listener: &mut dyn RewriteListener,
    ) -> usize {
        let mut changes = 0;

        // Snapshot the ops in this block; walk bottom-up.
        let ops: Vec<OpRef> = ctx.block(block).ops.to_vec();

        for &op in ops.iter().rev() {
            // Skip ops that have been removed from their block
            if ctx.op(op).parent_block != Some(block) {
                continue;
            }

            // Recurse into nested regions first
            let regions: Vec<RegionRef> = ctx.op(op).regions.to_vec();
            for region in regions {
                changes += self.visit_region(ctx, region, listener);
            }

            if ctx.op(op).parent_block != Some(block) {
                continue;
            }

            // Try each pattern; apply at most one per op per sweep.
            for pattern in &self.patterns {
                let mut rw = PatternRewriter::new();
                let matched = pattern.match_and_rewrite(ctx, op, &mut rw);
                if matched && rw.has_mutations() {
                    tracing::debug!(pattern = pattern.name(), ?op, "pattern matched");
                    let mutations = rw.take_mutations();
                    rewriter::apply_mutations(ctx, op, mutations, listener);
                    changes += 1;
                    break;
                }
            }
        }

        changes
    }
}

impl Default for PatternApplicator {
    fn default() -> Self {
        Self::new()
    }
}
