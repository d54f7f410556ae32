//! Arith dialect: the integer operation catalog.
//!
//! Signed/unsigned opcode variants are distinct ops; the optimizer's
//! demotion table maps each signed opcode to its unsigned counterpart.

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{OpRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::symbols;
use crate::types::{Attribute, Location};

symbols! {
    DIALECT => "arith",
    ATTR_VALUE => "value",

    OP_CONST => "const",
    OP_ADD => "add",
    OP_SUB => "sub",
    OP_MUL => "mul",
    OP_DIV_SI => "div_si",
    OP_DIV_UI => "div_ui",
    OP_FLOOR_DIV_SI => "floor_div_si",
    OP_CEIL_DIV_SI => "ceil_div_si",
    OP_CEIL_DIV_UI => "ceil_div_ui",
    OP_REM_SI => "rem_si",
    OP_REM_UI => "rem_ui",
    OP_MIN_SI => "min_si",
    OP_MIN_UI => "min_ui",
    OP_MAX_SI => "max_si",
    OP_MAX_UI => "max_ui",
    OP_EXT_SI => "ext_si",
    OP_EXT_UI => "ext_ui",
    OP_TRUNC => "trunc",
    OP_INDEX_CAST_SI => "index_cast_si",
    OP_INDEX_CAST_UI => "index_cast_ui",
}

/// Create an `arith.const` with the given result type and raw bit value.
pub fn constant(ctx: &mut IrContext, loc: Location, ty: TypeRef, bits: u64) -> OpRef {
    let data = OperationDataBuilder::new(loc, DIALECT(), OP_CONST())
        .result(ty)
        .attr(ATTR_VALUE(), Attribute::IntBits(bits))
        .build(ctx);
    ctx.create_op(data)
}

/// Create a two-operand arith op (`add`, `div_si`, `min_ui`, ...).
pub fn binary(
    ctx: &mut IrContext,
    loc: Location,
    name: Symbol,
    lhs: ValueRef,
    rhs: ValueRef,
    ty: TypeRef,
) -> OpRef {
    let data = OperationDataBuilder::new(loc, DIALECT(), name)
        .operand(lhs)
        .operand(rhs)
        .result(ty)
        .build(ctx);
    ctx.create_op(data)
}

/// Create a one-operand arith op (casts and extensions).
pub fn unary(
    ctx: &mut IrContext,
    loc: Location,
    name: Symbol,
    operand: ValueRef,
    ty: TypeRef,
) -> OpRef {
    let data = OperationDataBuilder::new(loc, DIALECT(), name)
        .operand(operand)
        .result(ty)
        .build(ctx);
    ctx.create_op(data)
}

/// Read the raw bit value of an `arith.const`, if `op` is one.
pub fn const_value(ctx: &IrContext, op: OpRef) -> Option<u64> {
    let data = ctx.op(op);
    if data.dialect != DIALECT() || data.name != OP_CONST() {
        return None;
    }
    match data.attributes.get(&ATTR_VALUE()) {
        Some(Attribute::IntBits(bits)) => Some(*bits),
        _ => None,
    }
}
