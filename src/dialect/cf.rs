//! Control-flow dialect: block terminators.
//!
//! `cf.br` passes its operands as the successor block's arguments, which is
//! how ranges flow across block boundaries (including loop back edges).

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{BlockRef, OpRef, ValueRef};
use crate::symbols;
use crate::types::Location;

symbols! {
    DIALECT => "cf",
    OP_BR => "br",
    OP_COND_BR => "cond_br",
}

/// Unconditional branch to `dest`, forwarding `args` to its block arguments.
pub fn br(
    ctx: &mut IrContext,
    loc: Location,
    dest: BlockRef,
    args: impl IntoIterator<Item = ValueRef>,
) -> OpRef {
    let data = OperationDataBuilder::new(loc, DIALECT(), OP_BR())
        .operands(args)
        .successor(dest)
        .build(ctx);
    ctx.create_op(data)
}

/// Conditional branch; neither successor receives arguments.
pub fn cond_br(
    ctx: &mut IrContext,
    loc: Location,
    cond: ValueRef,
    then_dest: BlockRef,
    else_dest: BlockRef,
) -> OpRef {
    let data = OperationDataBuilder::new(loc, DIALECT(), OP_COND_BR())
        .operand(cond)
        .successor(then_dest)
        .successor(else_dest)
        .build(ctx);
    ctx.create_op(data)
}

/// Whether `op` is a `cf.br` (the only op that forwards block arguments).
pub fn is_br(ctx: &IrContext, op: OpRef) -> bool {
    let data = ctx.op(op);
    data.dialect == DIALECT() && data.name == OP_BR()
}
