//! Rewrite infrastructure: in-place mutation + RAUW-based rewriting.
//!
//! Every structural mutation applied through the [`PatternApplicator`] emits
//! a [`MutationEvent`] to the registered [`RewriteListener`] *before* the
//! graph links are torn down, so subscribers can still walk the def-use
//! chains of the affected values. The range-analysis invalidation cache in
//! `transforms` is one such subscriber; the interface is deliberately
//! generic so other fact caches can hook the same events.

pub mod applicator;
pub mod pattern;
pub mod rewriter;

pub use applicator::{ApplyResult, PatternApplicator};
pub use pattern::RewritePattern;
pub use rewriter::PatternRewriter;

use smallvec::SmallVec;

use crate::context::IrContext;
use crate::dialect::core;
use crate::refs::{BlockRef, OpRef, RegionRef, ValueRef};

/// A structural mutation notification.
///
/// Each variant carries the affected operation and its result values as they
/// were at the moment of the event.
#[derive(Clone, Debug)]
pub enum MutationEvent {
    /// The operation is about to be erased; its results will have no uses.
    Erased {
        op: OpRef,
        results: SmallVec<[ValueRef; 2]>,
    },
    /// The operation was modified in place (operands or result types changed).
    Modified {
        op: OpRef,
        results: SmallVec<[ValueRef; 2]>,
    },
    /// The operation is about to be replaced; uses of `results` will be
    /// rerouted to the replacement's results.
    Replaced {
        op: OpRef,
        results: SmallVec<[ValueRef; 2]>,
    },
}

impl MutationEvent {
    /// Result values of the affected operation at event time.
    pub fn results(&self) -> &[ValueRef] {
        match self {
            MutationEvent::Erased { results, .. }
            | MutationEvent::Modified { results, .. }
            | MutationEvent::Replaced { results, .. } => results,
        }
    }
}

/// Subscriber for structural mutation events.
///
/// Events are delivered synchronously, inside mutation application, so a
/// listener that evicts cached facts guarantees no later pattern in the same
/// sweep observes a stale fact.
pub trait RewriteListener {
    fn notify(&mut self, ctx: &IrContext, event: &MutationEvent);
}

/// Listener that ignores all events.
#[derive(Default)]
pub struct NullListener;

impl RewriteListener for NullListener {
    fn notify(&mut self, _ctx: &IrContext, _event: &MutationEvent) {}
}

/// Thin wrapper around an `OpRef` pointing to a `core.module` operation.
///
/// Provides convenience methods for accessing the module body and operations.
#[derive(Clone, Copy, Debug)]
pub struct Module(pub OpRef);

impl Module {
    /// Create a `Module` wrapper, verifying it points to a `core.module` op
    /// with a body region.
    pub fn new(ctx: &IrContext, op: OpRef) -> Option<Self> {
        let data = ctx.op(op);
        if data.dialect == core::DIALECT()
            && data.name == core::OP_MODULE()
            && !data.regions.is_empty()
        {
            Some(Module(op))
        } else {
            None
        }
    }

    /// Get the underlying `OpRef`.
    pub fn op(self) -> OpRef {
        self.0
    }

    /// Get the module's body region.
    pub fn body(self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    /// Get the entry block of the module body.
    pub fn entry_block(self, ctx: &IrContext) -> Option<BlockRef> {
        ctx.region(self.body(ctx)).blocks.first().copied()
    }

    /// Get all operations in the module's entry block.
    pub fn ops(self, ctx: &IrContext) -> Vec<OpRef> {
        match self.entry_block(ctx) {
            Some(b) => ctx.block(b).ops.to_vec(),
            None => vec![],
        }
    }
}
