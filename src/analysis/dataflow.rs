//! Forward value-range dataflow over a region.
//!
//! The solver combines a reachability sub-analysis with range propagation:
//! only blocks reachable from the region entry contribute facts, and ops in
//! unreachable blocks simply do not participate (they are not resolved to
//! "unbounded"). Ranges start at bottom (absent), are seeded from constants
//! and graph boundaries, and only widen under join until a fixpoint is
//! reached. Loop back edges are handled by the same worklist; a per-value
//! widening threshold clamps slowly-growing ranges to full so the iteration
//! count stays proportional to the graph size.

use std::collections::{HashSet, VecDeque};

use cranelift_entity::SecondaryMap;
use smallvec::SmallVec;

use super::range::IntRange;
use crate::context::IrContext;
use crate::dialect::{arith, cf, core};
use crate::errors::AnalysisError;
use crate::refs::{BlockRef, OpRef, RegionRef, ValueRef};

// ============================================================================
// FactStore
// ============================================================================

/// Mapping from value to its currently valid range.
///
/// Facts are inserted by the analysis and removed by invalidation; there is
/// no decrease-in-place. An absent fact means "no information": consumers
/// must fail closed, never assume a default.
#[derive(Debug, Default)]
pub struct FactStore {
    facts: SecondaryMap<ValueRef, Option<IntRange>>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The range proven for `v`, if any.
    pub fn range_of(&self, v: ValueRef) -> Option<IntRange> {
        self.facts[v]
    }

    pub fn insert(&mut self, v: ValueRef, range: IntRange) {
        self.facts[v] = Some(range);
    }

    /// Remove the fact for `v`. Returns whether a fact was present.
    pub fn evict(&mut self, v: ValueRef) -> bool {
        self.facts[v].take().is_some()
    }
}

// ============================================================================
// RangeAnalysis
// ============================================================================

/// Monotone forward range analysis.
pub struct RangeAnalysis {
    /// Number of widening joins tolerated per value before clamping to full.
    pub widen_after: u32,
    /// Fixpoint step budget per operation; the total budget scales with the
    /// graph, so exceeding it means the graph is malformed or the transfer
    /// functions misbehaved.
    pub max_steps_per_op: usize,
}

impl Default for RangeAnalysis {
    fn default() -> Self {
        Self {
            widen_after: 8,
            max_steps_per_op: 64,
        }
    }
}

impl RangeAnalysis {
    /// Run to fixpoint over `region`, producing a fresh fact store.
    pub fn run(&self, ctx: &IrContext, region: RegionRef) -> Result<FactStore, AnalysisError> {
        let mut store = FactStore::new();

        let executable = reachable_blocks(ctx, region);
        let ops: Vec<OpRef> = ctx
            .region(region)
            .blocks
            .iter()
            .filter(|b| executable.contains(b))
            .flat_map(|&b| ctx.block(b).ops.iter().copied())
            .collect();

        let mut widen_counts: SecondaryMap<ValueRef, u32> = SecondaryMap::new();
        let mut worklist: VecDeque<OpRef> = ops.iter().copied().collect();

        // Graph boundaries: entry block arguments are unconstrained.
        if let Some(&entry) = ctx.region(region).blocks.first() {
            for &arg in ctx.block_args(entry) {
                if let Some(w) = core::model_width(&ctx.types, ctx.value_ty(arg)) {
                    store.insert(arg, IntRange::full(w));
                }
            }
        }

        let max_steps = self.max_steps_per_op * ops.len() + 1024;
        let mut steps = 0usize;

        while let Some(op) = worklist.pop_front() {
            steps += 1;
            if steps > max_steps {
                return Err(AnalysisError::FixpointExceeded {
                    steps,
                    op_count: ops.len(),
                });
            }

            let updates = self.transfer_op(ctx, &store, op)?;
            for (value, range) in updates {
                if self.update(ctx, &mut store, &mut widen_counts, value, range) {
                    for u in ctx.uses(value) {
                        let parent = ctx.op(u.user).parent_block;
                        if parent.is_some_and(|b| executable.contains(&b)) {
                            worklist.push_back(u.user);
                        }
                    }
                }
            }
        }

        tracing::debug!(steps, op_count = ops.len(), "range analysis converged");
        Ok(store)
    }

    /// Join `range` into the store. Returns whether the fact changed.
    fn update(
        &self,
        _ctx: &IrContext,
        store: &mut FactStore,
        widen_counts: &mut SecondaryMap<ValueRef, u32>,
        value: ValueRef,
        range: IntRange,
    ) -> bool {
        let joined = match store.range_of(value) {
            Some(existing) => existing.join(&range),
            None => range,
        };
        if store.range_of(value) == Some(joined) {
            return false;
        }
        widen_counts[value] += 1;
        let result = if widen_counts[value] > self.widen_after {
            IntRange::full(joined.width())
        } else {
            joined
        };
        if store.range_of(value) == Some(result) {
            return false;
        }
        store.insert(value, result);
        true
    }

    /// Compute the updates one operation contributes given current facts.
    ///
    /// Returns an empty list when an input fact is still missing (bottom);
    /// the op will be revisited once its operands gain facts.
    fn transfer_op(
        &self,
        ctx: &IrContext,
        store: &FactStore,
        op: OpRef,
    ) -> Result<SmallVec<[(ValueRef, IntRange); 2]>, AnalysisError> {
        let mut updates = SmallVec::new();
        let data = ctx.op(op);

        // Branches forward their operands into successor block arguments.
        if cf::is_br(ctx, op) {
            let dest = data.successors[0];
            let operands = ctx.op_operands(op);
            let args = ctx.block_args(dest);
            if operands.len() != args.len() {
                return Err(AnalysisError::MalformedGraph {
                    reason: format!(
                        "branch {op} passes {} operand(s) to {dest} which expects {}",
                        operands.len(),
                        args.len()
                    ),
                });
            }
            for (i, (&operand, &arg)) in operands.iter().zip(args.iter()).enumerate() {
                if ctx.value_ty(operand) != ctx.value_ty(arg) {
                    return Err(AnalysisError::MalformedGraph {
                        reason: format!(
                            "branch {op} passes operand {i} of mismatched type to {dest}"
                        ),
                    });
                }
                if let Some(range) = store.range_of(operand) {
                    updates.push((arg, range));
                }
            }
            return Ok(updates);
        }

        if data.dialect == arith::DIALECT() {
            if let Some(update) = self.transfer_arith(ctx, store, op)? {
                updates.push(update);
            }
            return Ok(updates);
        }

        // Unknown opcode: its integer results are unconstrained.
        for &result in ctx.op_results(op) {
            if let Some(w) = core::model_width(&ctx.types, ctx.value_ty(result)) {
                updates.push((result, IntRange::full(w)));
            }
        }
        Ok(updates)
    }

    fn transfer_arith(
        &self,
        ctx: &IrContext,
        store: &FactStore,
        op: OpRef,
    ) -> Result<Option<(ValueRef, IntRange)>, AnalysisError> {
        let data = ctx.op(op);
        let results = ctx.op_results(op);
        let Some(&result) = results.first() else {
            return Ok(None);
        };
        let Some(out_width) = core::model_width(&ctx.types, ctx.value_ty(result)) else {
            return Ok(None);
        };

        if data.name == arith::OP_CONST() {
            let Some(bits) = arith::const_value(ctx, op) else {
                return Err(AnalysisError::MalformedGraph {
                    reason: format!("arith.const {op} has no integer value attribute"),
                });
            };
            return Ok(Some((result, IntRange::constant(out_width, bits))));
        }

        let operands = ctx.op_operands(op);
        let operand_range = |idx: usize| -> Option<IntRange> {
            operands.get(idx).copied().and_then(|v| store.range_of(v))
        };

        let range = if operands.len() == 2 {
            let (Some(a), Some(b)) = (operand_range(0), operand_range(1)) else {
                return Ok(None);
            };
            let computed = data.name.with_str(|s| match s {
                "add" => Some(a.add(&b)),
                "sub" => Some(a.sub(&b)),
                "mul" => Some(a.mul(&b)),
                "div_si" => Some(a.div_si(&b)),
                "div_ui" => Some(a.div_ui(&b)),
                "floor_div_si" => Some(a.floor_div_si(&b)),
                "ceil_div_si" => Some(a.ceil_div_si(&b)),
                "ceil_div_ui" => Some(a.ceil_div_ui(&b)),
                "rem_si" => Some(a.rem_si(&b)),
                "rem_ui" => Some(a.rem_ui(&b)),
                "min_si" => Some(a.min_si(&b)),
                "min_ui" => Some(a.min_ui(&b)),
                "max_si" => Some(a.max_si(&b)),
                "max_ui" => Some(a.max_ui(&b)),
                _ => None,
            });
            match computed {
                Some(r) if r.width() == out_width => r,
                // Width-mismatched or unrecognized binary op: no assumption.
                _ => IntRange::full(out_width),
            }
        } else if operands.len() == 1 {
            let Some(a) = operand_range(0) else {
                return Ok(None);
            };
            let computed = data.name.with_str(|s| match s {
                "ext_si" | "index_cast_si" => Some(a.resize_signed(out_width)),
                "ext_ui" | "index_cast_ui" => Some(a.resize_unsigned(out_width)),
                "trunc" => Some(a.resize_unsigned(out_width)),
                _ => None,
            });
            computed.unwrap_or_else(|| IntRange::full(out_width))
        } else {
            IntRange::full(out_width)
        };

        Ok(Some((result, range)))
    }
}

/// Blocks reachable from the region entry through successor edges.
fn reachable_blocks(ctx: &IrContext, region: RegionRef) -> HashSet<BlockRef> {
    let mut reachable = HashSet::new();
    let mut stack: Vec<BlockRef> = ctx.region(region).blocks.first().copied().into_iter().collect();
    while let Some(block) = stack.pop() {
        if !reachable.insert(block) {
            continue;
        }
        for &op in &ctx.block(block).ops {
            for &succ in &ctx.op(op).successors {
                if !reachable.contains(&succ) {
                    stack.push(succ);
                }
            }
        }
    }
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BlockData, RegionData};
    use crate::location::Span;
    use crate::types::Location;
    use smallvec::smallvec;

    fn test_ctx() -> (IrContext, Location) {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.mlir".to_owned());
        let loc = Location::new(path, Span::new(0, 0));
        (ctx, loc)
    }

    fn empty_block(ctx: &mut IrContext, loc: Location, args: Vec<crate::refs::TypeRef>) -> BlockRef {
        ctx.create_block(BlockData {
            location: loc,
            args,
            ops: smallvec![],
            parent_region: None,
        })
    }

    fn region_of(ctx: &mut IrContext, loc: Location, blocks: Vec<BlockRef>) -> RegionRef {
        ctx.create_region(RegionData {
            location: loc,
            blocks: blocks.into(),
            parent_op: None,
        })
    }

    #[test]
    fn constants_propagate_through_add() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let entry = empty_block(&mut ctx, loc, vec![]);

        let c10 = arith::constant(&mut ctx, loc, i64_ty, 10);
        let c20 = arith::constant(&mut ctx, loc, i64_ty, 20);
        let v10 = ctx.op_result(c10, 0);
        let v20 = ctx.op_result(c20, 0);
        let add = arith::binary(&mut ctx, loc, arith::OP_ADD(), v10, v20, i64_ty);
        for op in [c10, c20, add] {
            ctx.push_op(entry, op);
        }
        let region = region_of(&mut ctx, loc, vec![entry]);

        let store = RangeAnalysis::default().run(&ctx, region).unwrap();
        let sum = store.range_of(ctx.op_result(add, 0)).unwrap();
        assert_eq!((sum.smin(), sum.smax()), (30, 30));
    }

    #[test]
    fn entry_args_are_unconstrained() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let entry = empty_block(&mut ctx, loc, vec![i64_ty]);
        let region = region_of(&mut ctx, loc, vec![entry]);

        let store = RangeAnalysis::default().run(&ctx, region).unwrap();
        let arg = ctx.block_arg(entry, 0);
        assert_eq!(store.range_of(arg), Some(IntRange::full(64)));
    }

    #[test]
    fn rem_ui_bounds_an_unknown_value() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let entry = empty_block(&mut ctx, loc, vec![i64_ty]);
        let arg = ctx.block_arg(entry, 0);

        let c101 = arith::constant(&mut ctx, loc, i64_ty, 101);
        let v101 = ctx.op_result(c101, 0);
        let rem = arith::binary(&mut ctx, loc, arith::OP_REM_UI(), arg, v101, i64_ty);
        for op in [c101, rem] {
            ctx.push_op(entry, op);
        }
        let region = region_of(&mut ctx, loc, vec![entry]);

        let store = RangeAnalysis::default().run(&ctx, region).unwrap();
        let r = store.range_of(ctx.op_result(rem, 0)).unwrap();
        assert_eq!((r.umin(), r.umax()), (0, 100));
        assert!(r.is_non_negative());
    }

    #[test]
    fn unreachable_blocks_contribute_no_facts() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let entry = empty_block(&mut ctx, loc, vec![]);
        let dead = empty_block(&mut ctx, loc, vec![]);

        let c1 = arith::constant(&mut ctx, loc, i64_ty, 1);
        ctx.push_op(entry, c1);
        let c2 = arith::constant(&mut ctx, loc, i64_ty, 2);
        ctx.push_op(dead, c2);
        let region = region_of(&mut ctx, loc, vec![entry, dead]);

        let store = RangeAnalysis::default().run(&ctx, region).unwrap();
        assert!(store.range_of(ctx.op_result(c1, 0)).is_some());
        assert_eq!(store.range_of(ctx.op_result(c2, 0)), None);
    }

    #[test]
    fn loop_back_edge_terminates_and_stays_sound() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let entry = empty_block(&mut ctx, loc, vec![]);
        let body = empty_block(&mut ctx, loc, vec![i64_ty]);
        let arg = ctx.block_arg(body, 0);

        let c0 = arith::constant(&mut ctx, loc, i64_ty, 0);
        let v0 = ctx.op_result(c0, 0);
        let br_in = cf::br(&mut ctx, loc, body, [v0]);
        ctx.push_op(entry, c0);
        ctx.push_op(entry, br_in);

        let c1 = arith::constant(&mut ctx, loc, i64_ty, 1);
        let v1 = ctx.op_result(c1, 0);
        let next = arith::binary(&mut ctx, loc, arith::OP_ADD(), arg, v1, i64_ty);
        let vnext = ctx.op_result(next, 0);
        let br_back = cf::br(&mut ctx, loc, body, [vnext]);
        for op in [c1, next, br_back] {
            ctx.push_op(body, op);
        }
        let region = region_of(&mut ctx, loc, vec![entry, body]);

        let store = RangeAnalysis::default().run(&ctx, region).unwrap();
        // The loop counter widens but must remain a sound superset of
        // everything the loop can produce.
        let r = store.range_of(arg).unwrap();
        assert!(r.contains_signed(0));
        assert!(r.contains_signed(12345));
    }

    #[test]
    fn branch_arg_mismatch_is_malformed() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let entry = empty_block(&mut ctx, loc, vec![]);
        let dest = empty_block(&mut ctx, loc, vec![i64_ty]);

        let br = cf::br(&mut ctx, loc, dest, []);
        ctx.push_op(entry, br);
        let region = region_of(&mut ctx, loc, vec![entry, dest]);

        let err = RangeAnalysis::default().run(&ctx, region).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedGraph { .. }));
    }

    #[test]
    fn branch_arg_type_mismatch_is_malformed() {
        let (mut ctx, loc) = test_ctx();
        let i32_ty = core::int_ty(&mut ctx, 32);
        let i64_ty = core::int_ty(&mut ctx, 64);
        let entry = empty_block(&mut ctx, loc, vec![]);
        let dest = empty_block(&mut ctx, loc, vec![i64_ty]);

        let c = arith::constant(&mut ctx, loc, i32_ty, 1);
        let v = ctx.op_result(c, 0);
        let br = cf::br(&mut ctx, loc, dest, [v]);
        ctx.push_op(entry, c);
        ctx.push_op(entry, br);
        let region = region_of(&mut ctx, loc, vec![entry, dest]);

        let err = RangeAnalysis::default().run(&ctx, region).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedGraph { .. }));
    }

    #[test]
    fn cond_br_diamond_joins_predecessor_ranges() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let entry = empty_block(&mut ctx, loc, vec![i64_ty]);
        let cond = ctx.block_arg(entry, 0);
        let left = empty_block(&mut ctx, loc, vec![]);
        let right = empty_block(&mut ctx, loc, vec![]);
        let join = empty_block(&mut ctx, loc, vec![i64_ty]);
        let dead = empty_block(&mut ctx, loc, vec![]);

        let branch = cf::cond_br(&mut ctx, loc, cond, left, right);
        ctx.push_op(entry, branch);

        let c10 = arith::constant(&mut ctx, loc, i64_ty, 10);
        let v10 = ctx.op_result(c10, 0);
        let br_left = cf::br(&mut ctx, loc, join, [v10]);
        ctx.push_op(left, c10);
        ctx.push_op(left, br_left);

        let c20 = arith::constant(&mut ctx, loc, i64_ty, 20);
        let v20 = ctx.op_result(c20, 0);
        let br_right = cf::br(&mut ctx, loc, join, [v20]);
        ctx.push_op(right, c20);
        ctx.push_op(right, br_right);

        let c99 = arith::constant(&mut ctx, loc, i64_ty, 99);
        ctx.push_op(dead, c99);

        let region = region_of(&mut ctx, loc, vec![entry, left, right, join, dead]);
        let store = RangeAnalysis::default().run(&ctx, region).unwrap();

        // The join argument covers exactly both incoming constants.
        let joined = store.range_of(ctx.block_arg(join, 0)).unwrap();
        assert_eq!((joined.smin(), joined.smax()), (10, 20));
        assert_eq!((joined.umin(), joined.umax()), (10, 20));
        // No branch targets the dead block, so it contributes nothing.
        assert_eq!(store.range_of(ctx.op_result(c99, 0)), None);
    }

    #[test]
    fn fact_store_evict_reports_presence() {
        let mut store = FactStore::new();
        let v = ValueRef::from_u32(0);
        assert!(!store.evict(v));
        store.insert(v, IntRange::full(32));
        assert!(store.evict(v));
        assert_eq!(store.range_of(v), None);
        assert!(!store.evict(v));
    }
}
