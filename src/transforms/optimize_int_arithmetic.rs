//! Signed-to-unsigned demotion of integer arithmetic driven by range facts.
//!
//! The pass alternates two phases until nothing changes: run the value-range
//! analysis over the module body, then greedily apply rewrite patterns that
//! consult the resulting facts. Patterns share the fact store with a
//! [`DataflowInvalidationListener`], which evicts facts for every value
//! transitively downstream of a mutation, so no pattern in the same sweep
//! can act on stale information. The next round re-derives facts for the
//! rewritten graph, which is what lets demotions cascade (a demoted op often
//! makes its consumers provable in the following round).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::analysis::{FactStore, RangeAnalysis};
use crate::context::{IrContext, OperationDataBuilder};
use crate::dialect::{arith, core};
use crate::errors::OptimizeError;
use crate::refs::{OpRef, ValueDef, ValueRef};
use crate::rewrite::{
    Module, MutationEvent, PatternApplicator, PatternRewriter, RewriteListener, RewritePattern,
};
use crate::symbol::Symbol;

/// Largest unsigned value guaranteed to be representable in `core.index`
/// regardless of its concrete width on the target. `index` may concretize
/// to 32 bits, so unsigned rewrites involving it must stay within `u32`.
pub const SAFE_INDEX_UNSIGNED_MAX_VALUE: u64 = u32::MAX as u64;

/// Shared range facts, written by the analysis and read by patterns while
/// the invalidation listener evicts behind rewrites.
pub type Facts = Rc<RefCell<FactStore>>;

/// Whether `v` may be reinterpreted as unsigned: a fact must exist, the
/// signed and unsigned readings must agree (non-negative), and `index`-typed
/// values must additionally fit the narrowest possible `index` width.
///
/// A missing fact fails the query; demotion never assumes a default range.
fn legal_unsigned(ctx: &IrContext, facts: &FactStore, v: ValueRef) -> bool {
    let ty = ctx.value_ty(v);
    if core::model_width(&ctx.types, ty).is_none() {
        return false;
    }
    let Some(range) = facts.range_of(v) else {
        return false;
    };
    if !range.is_non_negative() {
        return false;
    }
    if core::is_index(&ctx.types, ty) {
        return range.fits_unsigned(SAFE_INDEX_UNSIGNED_MAX_VALUE);
    }
    true
}

/// The unsigned opcode a signed arith opcode demotes to, if any.
///
/// `floor_div_si` maps to plain `div_ui`: flooring and truncating division
/// coincide once both operands are non-negative.
fn unsigned_counterpart(name: Symbol) -> Option<Symbol> {
    // Interning re-enters the global interner lock, so resolve the target
    // name inside the closure but intern it only after the read lock drops.
    let unsigned: Option<&'static str> = name.with_str(|s| match s {
        "div_si" => Some("div_ui"),
        "floor_div_si" => Some("div_ui"),
        "ceil_div_si" => Some("ceil_div_ui"),
        "rem_si" => Some("rem_ui"),
        "min_si" => Some("min_ui"),
        "max_si" => Some("max_ui"),
        "ext_si" => Some("ext_ui"),
        "index_cast_si" => Some("index_cast_ui"),
        _ => None,
    });
    unsigned.map(Symbol::new)
}

// ============================================================================
// ConvertOpToUnsigned
// ============================================================================

/// Replaces a signed arith op with its unsigned counterpart when every
/// operand and result is provably non-negative.
pub struct ConvertOpToUnsigned {
    facts: Facts,
}

impl ConvertOpToUnsigned {
    pub fn new(facts: Facts) -> Self {
        Self { facts }
    }
}

impl RewritePattern for ConvertOpToUnsigned {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let data = ctx.op(op);
        if data.dialect != arith::DIALECT() {
            return false;
        }
        let Some(unsigned) = unsigned_counterpart(data.name) else {
            return false;
        };

        {
            let facts = self.facts.borrow();
            let all_legal = ctx
                .op_operands(op)
                .iter()
                .chain(ctx.op_results(op))
                .all(|&v| legal_unsigned(ctx, &facts, v));
            if !all_legal {
                return false;
            }
        }

        let data = ctx.op(op);
        let loc = data.location;
        let attrs = data.attributes.clone();
        let operands: Vec<ValueRef> = ctx.op_operands(op).to_vec();
        let result_types: Vec<_> = ctx.op_result_types(op).to_vec();
        let new_data = OperationDataBuilder::new(loc, arith::DIALECT(), unsigned)
            .operands(operands)
            .results(result_types)
            .attrs(attrs)
            .build(ctx);
        let new_op = ctx.create_op(new_data);
        rewriter.replace_op(new_op);
        true
    }

    fn name(&self) -> &'static str {
        "convert-op-to-unsigned"
    }
}

// ============================================================================
// HoistIndexCastUiProducer
// ============================================================================

/// Opcodes whose `i64 -> index` unsigned cast may be hoisted above them.
///
/// Each is closed under the narrowing: if all inputs and the output fit the
/// unsigned `index` safety bound, evaluating at `index` width produces the
/// same value as evaluating at 64 bits and then truncating.
const HOISTABLE_PRODUCERS: &[&str] = &[
    "add",
    "ceil_div_ui",
    "div_ui",
    "max_ui",
    "min_ui",
    "mul",
    "rem_ui",
    "sub",
];

/// Rewrites `index_cast_ui(producer(a, b) : i64) : index` so the producer
/// computes directly on `index`, with casts hoisted onto its operands.
///
/// The matched cast becomes an identity `index -> index` cast, left for
/// [`FoldIdentityIndexCast`] to erase. Requires every value flowing through
/// the producer to fit [`SAFE_INDEX_UNSIGNED_MAX_VALUE`], so the narrowing
/// cannot change any result.
pub struct HoistIndexCastUiProducer {
    facts: Facts,
}

impl HoistIndexCastUiProducer {
    pub fn new(facts: Facts) -> Self {
        Self { facts }
    }

    fn fits_safe_bound(&self, ctx: &IrContext, facts: &FactStore, v: ValueRef) -> bool {
        facts
            .range_of(v)
            .is_some_and(|r| r.is_non_negative() && r.fits_unsigned(SAFE_INDEX_UNSIGNED_MAX_VALUE))
            && core::model_width(&ctx.types, ctx.value_ty(v)) == Some(64)
            && !core::is_index(&ctx.types, ctx.value_ty(v))
    }
}

impl RewritePattern for HoistIndexCastUiProducer {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let data = ctx.op(op);
        if data.dialect != arith::DIALECT() || data.name != arith::OP_INDEX_CAST_UI() {
            return false;
        }
        let result = ctx.op_result(op, 0);
        if !core::is_index(&ctx.types, ctx.value_ty(result)) {
            return false;
        }

        let source = ctx.op_operands(op)[0];
        let ValueDef::OpResult(producer, _) = ctx.value_def(source) else {
            return false;
        };
        let pdata = ctx.op(producer);
        let is_hoistable = pdata.dialect == arith::DIALECT()
            && pdata.name.with_str(|s| HOISTABLE_PRODUCERS.contains(&s));
        if !is_hoistable || ctx.op_results(producer).len() != 1 {
            return false;
        }
        let Some(block) = pdata.parent_block else {
            return false;
        };

        {
            let facts = self.facts.borrow();
            let all_safe = ctx
                .op_operands(producer)
                .iter()
                .chain(ctx.op_results(producer))
                .all(|&v| self.fits_safe_bound(ctx, &facts, v));
            if !all_safe {
                return false;
            }
        }

        let loc = ctx.op(producer).location;
        let index_ty = core::index_ty(ctx);
        let operands: Vec<ValueRef> = ctx.op_operands(producer).to_vec();
        for (i, &operand) in operands.iter().enumerate() {
            let cast = arith::unary(ctx, loc, arith::OP_INDEX_CAST_UI(), operand, index_ty);
            ctx.insert_op_before(block, producer, cast);
            let cast_result = ctx.op_result(cast, 0);
            ctx.set_operand(producer, i as u32, cast_result);
        }
        ctx.set_result_type(producer, 0, index_ty);
        rewriter.mark_modified(producer);
        // The matched cast is now identity; its cached fact goes with it.
        rewriter.mark_modified(op);
        true
    }

    fn name(&self) -> &'static str {
        "hoist-index-cast-ui-producer"
    }
}

// ============================================================================
// FoldIdentityIndexCast
// ============================================================================

/// Erases `index_cast_si`/`index_cast_ui` whose source and result types are
/// equal, forwarding uses to the source value.
pub struct FoldIdentityIndexCast;

impl RewritePattern for FoldIdentityIndexCast {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let data = ctx.op(op);
        if data.dialect != arith::DIALECT() {
            return false;
        }
        if data.name != arith::OP_INDEX_CAST_UI() && data.name != arith::OP_INDEX_CAST_SI() {
            return false;
        }
        let source = ctx.op_operands(op)[0];
        let result = ctx.op_result(op, 0);
        if ctx.value_ty(source) != ctx.value_ty(result) {
            return false;
        }
        rewriter.erase_op(vec![source]);
        true
    }

    fn name(&self) -> &'static str {
        "fold-identity-index-cast"
    }
}

// ============================================================================
// DataflowInvalidationListener
// ============================================================================

/// Evicts range facts invalidated by a structural mutation.
///
/// Eviction is transitive: when a value loses its fact, every result of
/// every user of that value is queued for eviction too. Events are delivered
/// before RAUW tears the use-chains down, so the traversal sees the graph as
/// the analysis saw it. Values with no fact stop the walk, which bounds the
/// work to the facts actually derived from the mutated op.
pub struct DataflowInvalidationListener {
    facts: Facts,
}

impl DataflowInvalidationListener {
    pub fn new(facts: Facts) -> Self {
        Self { facts }
    }
}

impl RewriteListener for DataflowInvalidationListener {
    fn notify(&mut self, ctx: &IrContext, event: &MutationEvent) {
        let mut store = self.facts.borrow_mut();
        let mut queue: VecDeque<ValueRef> = event.results().iter().copied().collect();
        let mut evicted = 0usize;
        while let Some(v) = queue.pop_front() {
            if !store.evict(v) {
                continue;
            }
            evicted += 1;
            for u in ctx.uses(v) {
                queue.extend(ctx.op_results(u.user).iter().copied());
            }
        }
        if evicted > 0 {
            tracing::debug!(?event, evicted, "evicted downstream range facts");
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Configuration for [`optimize`].
pub struct OptimizeConfig {
    /// Cap on analyze/rewrite rounds before giving up with
    /// [`OptimizeError::NonConvergence`].
    pub max_rounds: usize,
    /// Pattern sweep cap within a single round.
    pub max_rewrite_iterations: usize,
    /// Caller-supplied canonicalization patterns applied alongside the
    /// demotion patterns.
    pub extra_patterns: Vec<Box<dyn RewritePattern>>,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            max_rounds: 16,
            max_rewrite_iterations: 10,
            extra_patterns: Vec::new(),
        }
    }
}

/// Outcome of a converged [`optimize`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeResult {
    /// Rounds executed, including the final quiescent one.
    pub rounds: usize,
    /// Total pattern applications across all rounds.
    pub rewrites: usize,
}

/// Run signed-to-unsigned integer optimization over `module` to fixpoint.
///
/// Each round runs the range analysis from scratch and then applies the
/// patterns; the pass converges when a round applies no rewrite. Analysis
/// failure aborts the pass with the module unchanged since the last
/// completed sweep.
pub fn optimize(
    ctx: &mut IrContext,
    module: Module,
    config: OptimizeConfig,
) -> Result<OptimizeResult, OptimizeError> {
    let facts: Facts = Rc::new(RefCell::new(FactStore::new()));
    let analysis = RangeAnalysis::default();

    let applicator = PatternApplicator::new()
        .add_pattern(ConvertOpToUnsigned::new(facts.clone()))
        .add_pattern(HoistIndexCastUiProducer::new(facts.clone()))
        .add_pattern(FoldIdentityIndexCast)
        .add_boxed_patterns(config.extra_patterns)
        .with_max_iterations(config.max_rewrite_iterations);

    let mut rewrites = 0;
    for round in 1..=config.max_rounds {
        let store = analysis.run(ctx, module.body(ctx))?;
        *facts.borrow_mut() = store;

        let mut listener = DataflowInvalidationListener::new(facts.clone());
        let result = applicator.apply_with_listener(ctx, module, &mut listener);
        rewrites += result.total_changes;
        tracing::debug!(round, changes = result.total_changes, "optimization round");

        if !result.reached_fixpoint {
            return Err(OptimizeError::NonConvergence { rounds: round });
        }
        if result.total_changes == 0 {
            return Ok(OptimizeResult { rounds: round, rewrites });
        }
    }
    Err(OptimizeError::NonConvergence {
        rounds: config.max_rounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::IntRange;
    use crate::context::{BlockData, RegionData};
    use crate::location::Span;
    use crate::refs::TypeRef;
    use crate::types::Location;
    use smallvec::smallvec;

    fn test_ctx() -> (IrContext, Location) {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.mlir".to_owned());
        let loc = Location::new(path, Span::new(0, 0));
        (ctx, loc)
    }

    struct ModuleBuilder {
        loc: Location,
        block: crate::refs::BlockRef,
    }

    impl ModuleBuilder {
        fn new(ctx: &mut IrContext, loc: Location, args: Vec<TypeRef>) -> Self {
            let block = ctx.create_block(BlockData {
                location: loc,
                args,
                ops: smallvec![],
                parent_region: None,
            });
            Self { loc, block }
        }

        fn arg(&self, ctx: &IrContext, i: u32) -> ValueRef {
            ctx.block_arg(self.block, i)
        }

        fn push(&self, ctx: &mut IrContext, op: OpRef) -> ValueRef {
            ctx.push_op(self.block, op);
            ctx.op_result(op, 0)
        }

        fn constant(&self, ctx: &mut IrContext, ty: TypeRef, bits: u64) -> ValueRef {
            let op = arith::constant(ctx, self.loc, ty, bits);
            self.push(ctx, op)
        }

        fn binary(
            &self,
            ctx: &mut IrContext,
            name: Symbol,
            lhs: ValueRef,
            rhs: ValueRef,
            ty: TypeRef,
        ) -> (OpRef, ValueRef) {
            let op = arith::binary(ctx, self.loc, name, lhs, rhs, ty);
            let v = self.push(ctx, op);
            (op, v)
        }

        fn unary(
            &self,
            ctx: &mut IrContext,
            name: Symbol,
            operand: ValueRef,
            ty: TypeRef,
        ) -> (OpRef, ValueRef) {
            let op = arith::unary(ctx, self.loc, name, operand, ty);
            let v = self.push(ctx, op);
            (op, v)
        }

        fn finish(self, ctx: &mut IrContext) -> Module {
            let region = ctx.create_region(RegionData {
                location: self.loc,
                blocks: smallvec![self.block],
                parent_op: None,
            });
            let op = core::module(ctx, self.loc, region);
            Module::new(ctx, op).expect("valid module")
        }
    }

    fn op_name_at(ctx: &IrContext, module: Module, index: usize) -> String {
        ctx.op(module.ops(ctx)[index]).name.to_string()
    }

    #[test]
    fn demotes_div_si_when_operands_proven_non_negative() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let b = ModuleBuilder::new(&mut ctx, loc, vec![i64_ty]);
        let arg = b.arg(&ctx, 0);

        let c101 = b.constant(&mut ctx, i64_ty, 101);
        let (_, bounded) = b.binary(&mut ctx, arith::OP_REM_UI(), arg, c101, i64_ty);
        let c7 = b.constant(&mut ctx, i64_ty, 7);
        let (div, _) = b.binary(&mut ctx, arith::OP_DIV_SI(), bounded, c7, i64_ty);
        let module = b.finish(&mut ctx);

        let result = optimize(&mut ctx, module, OptimizeConfig::default()).unwrap();
        assert!(result.rewrites >= 1);
        // div_si replaced by a fresh div_ui at the same block position.
        let ops = module.ops(&ctx);
        assert_eq!(ops.len(), 4);
        assert_eq!(ctx.op(ops[3]).name, arith::OP_DIV_UI());
        assert_ne!(ops[3], div);
        // Operands carried over unchanged.
        assert_eq!(ctx.op_operands(ops[3]), &[bounded, c7]);
    }

    #[test]
    fn unconstrained_operand_blocks_demotion() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let b = ModuleBuilder::new(&mut ctx, loc, vec![i64_ty]);
        let arg = b.arg(&ctx, 0);

        let c7 = b.constant(&mut ctx, i64_ty, 7);
        b.binary(&mut ctx, arith::OP_DIV_SI(), arg, c7, i64_ty);
        let module = b.finish(&mut ctx);

        let result = optimize(&mut ctx, module, OptimizeConfig::default()).unwrap();
        assert_eq!(result.rewrites, 0);
        assert_eq!(op_name_at(&ctx, module, 1), "div_si");
    }

    #[test]
    fn demoted_opcodes_agree_on_non_negative_operands() {
        // Every demotion table entry, swept exhaustively at 8 bits over the
        // operands the legality check admits: both sides non-negative, and
        // divisors additionally non-zero. The signed opcode and its unsigned
        // replacement must produce identical bit patterns.
        for x in 0i32..=127 {
            let xu = x as u32;
            for y in 1i32..=127 {
                let yu = y as u32;
                // div_si -> div_ui, and floor_div_si -> div_ui: flooring
                // equals truncation once nothing is negative.
                assert_eq!((x / y) as u32, xu / yu);
                assert_eq!(x.div_euclid(y) as u32, xu / yu);
                // ceil_div_si -> ceil_div_ui
                assert_eq!(((x + y - 1) / y) as u32, xu.div_ceil(yu));
                // rem_si -> rem_ui
                assert_eq!((x % y) as u32, xu % yu);
                // min_si -> min_ui, max_si -> max_ui
                assert_eq!(x.min(y) as u32, xu.min(yu));
                assert_eq!(x.max(y) as u32, xu.max(yu));
            }
            // ext_si -> ext_ui (and index_cast_si -> index_cast_ui):
            // sign- and zero-extension coincide while the sign bit is clear.
            let bits = x as u8;
            assert_eq!(bits as i8 as i64 as u64, bits as u64);
        }
    }

    #[test]
    fn demotes_ext_si_of_bounded_narrow_value() {
        let (mut ctx, loc) = test_ctx();
        let i32_ty = core::int_ty(&mut ctx, 32);
        let i64_ty = core::int_ty(&mut ctx, 64);
        let b = ModuleBuilder::new(&mut ctx, loc, vec![i32_ty]);
        let arg = b.arg(&ctx, 0);

        let c100 = b.constant(&mut ctx, i32_ty, 100);
        let (_, bounded) = b.binary(&mut ctx, arith::OP_REM_UI(), arg, c100, i32_ty);
        b.unary(&mut ctx, arith::OP_EXT_SI(), bounded, i64_ty);
        let module = b.finish(&mut ctx);

        optimize(&mut ctx, module, OptimizeConfig::default()).unwrap();
        assert_eq!(op_name_at(&ctx, module, 2), "ext_ui");
    }

    #[test]
    fn index_cast_demotion_respects_safety_bound() {
        // umax == 2^32 - 1 fits the narrowest index width; 2^32 does not.
        for (modulus, expect) in [(1u64 << 32, "index_cast_ui"), ((1u64 << 32) + 1, "index_cast_si")]
        {
            let (mut ctx, loc) = test_ctx();
            let i64_ty = core::int_ty(&mut ctx, 64);
            let index_ty = core::index_ty(&mut ctx);
            let b = ModuleBuilder::new(&mut ctx, loc, vec![i64_ty]);
            let arg = b.arg(&ctx, 0);

            let c = b.constant(&mut ctx, i64_ty, modulus);
            let (_, bounded) = b.binary(&mut ctx, arith::OP_REM_UI(), arg, c, i64_ty);
            b.unary(&mut ctx, arith::OP_INDEX_CAST_SI(), bounded, index_ty);
            let module = b.finish(&mut ctx);

            optimize(&mut ctx, module, OptimizeConfig::default()).unwrap();
            assert_eq!(op_name_at(&ctx, module, 2), expect, "modulus {modulus}");
        }
    }

    #[test]
    fn hoists_cast_above_producer_and_folds_identity() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let index_ty = core::index_ty(&mut ctx);
        let b = ModuleBuilder::new(&mut ctx, loc, vec![i64_ty]);
        let arg = b.arg(&ctx, 0);

        let c101 = b.constant(&mut ctx, i64_ty, 101);
        let (_, bounded) = b.binary(&mut ctx, arith::OP_REM_UI(), arg, c101, i64_ty);
        let c5 = b.constant(&mut ctx, i64_ty, 5);
        let (add, sum) = b.binary(&mut ctx, arith::OP_ADD(), bounded, c5, i64_ty);
        let (_, casted) = b.unary(&mut ctx, arith::OP_INDEX_CAST_UI(), sum, index_ty);
        let sink_data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("sink"))
            .operand(casted)
            .build(&mut ctx);
        let sink = ctx.create_op(sink_data);
        ctx.push_op(b.block, sink);
        let module = b.finish(&mut ctx);

        optimize(&mut ctx, module, OptimizeConfig::default()).unwrap();

        // The add now produces index directly, fed by hoisted casts.
        assert_eq!(ctx.value_ty(sum), index_ty);
        for &operand in ctx.op_operands(add) {
            assert_eq!(ctx.value_ty(operand), index_ty);
            let ValueDef::OpResult(cast_op, _) = ctx.value_def(operand) else {
                panic!("hoisted operand should be an op result");
            };
            assert_eq!(ctx.op(cast_op).name, arith::OP_INDEX_CAST_UI());
        }
        // The identity cast was folded away and the sink rerouted.
        assert_eq!(ctx.op_operands(sink), &[sum]);
        let names: Vec<String> = module
            .ops(&ctx)
            .iter()
            .map(|&op| ctx.op(op).name.to_string())
            .collect();
        assert_eq!(
            names.iter().filter(|n| *n == "index_cast_ui").count(),
            2,
            "only the hoisted operand casts remain: {names:?}"
        );
    }

    #[test]
    fn listener_evicts_transitively_downstream() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let b = ModuleBuilder::new(&mut ctx, loc, vec![i64_ty]);
        let arg = b.arg(&ctx, 0);

        let c101 = b.constant(&mut ctx, i64_ty, 101);
        let (rem, bounded) = b.binary(&mut ctx, arith::OP_REM_UI(), arg, c101, i64_ty);
        let c5 = b.constant(&mut ctx, i64_ty, 5);
        let (_, sum) = b.binary(&mut ctx, arith::OP_ADD(), bounded, c5, i64_ty);
        let (_, doubled) = b.binary(&mut ctx, arith::OP_ADD(), sum, sum, i64_ty);

        let facts: Facts = Rc::new(RefCell::new(FactStore::new()));
        {
            let mut store = facts.borrow_mut();
            for v in [bounded, sum, doubled, c101, c5] {
                store.insert(v, IntRange::full(64));
            }
        }

        let mut listener = DataflowInvalidationListener::new(facts.clone());
        listener.notify(
            &ctx,
            &MutationEvent::Replaced {
                op: rem,
                results: smallvec![bounded],
            },
        );

        let store = facts.borrow();
        // Everything downstream of the replaced result is gone.
        assert_eq!(store.range_of(bounded), None);
        assert_eq!(store.range_of(sum), None);
        assert_eq!(store.range_of(doubled), None);
        // Unrelated facts survive.
        assert!(store.range_of(c101).is_some());
        assert!(store.range_of(c5).is_some());
    }

    #[test]
    fn optimize_is_idempotent() {
        let (mut ctx, loc) = test_ctx();
        let i64_ty = core::int_ty(&mut ctx, 64);
        let b = ModuleBuilder::new(&mut ctx, loc, vec![i64_ty]);
        let arg = b.arg(&ctx, 0);

        let c101 = b.constant(&mut ctx, i64_ty, 101);
        let (_, bounded) = b.binary(&mut ctx, arith::OP_REM_UI(), arg, c101, i64_ty);
        let c7 = b.constant(&mut ctx, i64_ty, 7);
        b.binary(&mut ctx, arith::OP_DIV_SI(), bounded, c7, i64_ty);
        let module = b.finish(&mut ctx);

        let first = optimize(&mut ctx, module, OptimizeConfig::default()).unwrap();
        assert!(first.rewrites >= 1);
        let second = optimize(&mut ctx, module, OptimizeConfig::default()).unwrap();
        assert_eq!(second.rewrites, 0);
        assert_eq!(second.rounds, 1);
    }

    /// Pattern that flips an op's name back and forth, never settling.
    struct TogglePattern;

    impl RewritePattern for TogglePattern {
        fn match_and_rewrite(
            &self,
            ctx: &mut IrContext,
            op: OpRef,
            rewriter: &mut PatternRewriter,
        ) -> bool {
            let data = ctx.op(op);
            if data.dialect != Symbol::new("test") {
                return false;
            }
            let flipped = if data.name == Symbol::new("ping") {
                Symbol::new("pong")
            } else if data.name == Symbol::new("pong") {
                Symbol::new("ping")
            } else {
                return false;
            };
            let loc = data.location;
            let new_data = OperationDataBuilder::new(loc, Symbol::new("test"), flipped).build(ctx);
            let new_op = ctx.create_op(new_data);
            rewriter.replace_op(new_op);
            true
        }
    }

    #[test]
    fn non_terminating_extra_pattern_reports_non_convergence() {
        let (mut ctx, loc) = test_ctx();
        let b = ModuleBuilder::new(&mut ctx, loc, vec![]);
        let ping = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("ping"))
            .build(&mut ctx);
        let op = ctx.create_op(ping);
        ctx.push_op(b.block, op);
        let module = b.finish(&mut ctx);

        let config = OptimizeConfig {
            extra_patterns: vec![Box::new(TogglePattern)],
            ..Default::default()
        };
        let err = optimize(&mut ctx, module, config).unwrap_err();
        assert!(matches!(err, OptimizeError::NonConvergence { .. }));
    }
}
