//! Core dialect: the module container op and the integer type catalog.
//!
//! Integer types are `core.i8/i16/i32/i64` plus the width-polymorphic
//! `core.index`, whose concrete width depends on the target. Range
//! arithmetic models `index` at 64 bits; rewrites that depend on a
//! narrower concretization must apply the unsigned 32-bit safety bound
//! (see `transforms::optimize_int_arithmetic`).

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{OpRef, RegionRef, TypeRef};
use crate::symbol::Symbol;
use crate::symbols;
use crate::types::{Location, TypeDataBuilder, TypeInterner};

symbols! {
    DIALECT => "core",
    OP_MODULE => "module",
    TY_INDEX => "index",
}

/// Create a `core.module` op owning the given body region.
pub fn module(ctx: &mut IrContext, loc: Location, body: RegionRef) -> OpRef {
    let data = OperationDataBuilder::new(loc, DIALECT(), OP_MODULE())
        .region(body)
        .build(ctx);
    ctx.create_op(data)
}

/// Intern the fixed-width integer type `core.i{bits}`.
///
/// # Panics
///
/// Panics if `bits` is not one of 8, 16, 32, 64.
pub fn int_ty(ctx: &mut IrContext, bits: u8) -> TypeRef {
    let name = match bits {
        8 => Symbol::new("i8"),
        16 => Symbol::new("i16"),
        32 => Symbol::new("i32"),
        64 => Symbol::new("i64"),
        _ => panic!("int_ty: unsupported integer width {bits}"),
    };
    ctx.types.intern(TypeDataBuilder::new(DIALECT(), name).build())
}

/// Intern the width-polymorphic `core.index` type.
pub fn index_ty(ctx: &mut IrContext) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(DIALECT(), TY_INDEX()).build())
}

/// The bit width used to model a type in range arithmetic.
///
/// `core.index` is modeled at 64 bits (its widest possible concretization).
/// Returns `None` for non-integer types, which carry no range facts.
pub fn model_width(types: &TypeInterner, ty: TypeRef) -> Option<u8> {
    let data = types.get(ty);
    if data.dialect != DIALECT() {
        return None;
    }
    if data.name == TY_INDEX() {
        return Some(64);
    }
    data.name.with_str(|s| match s {
        "i8" => Some(8),
        "i16" => Some(16),
        "i32" => Some(32),
        "i64" => Some(64),
        _ => None,
    })
}

/// Whether `ty` is the width-polymorphic `core.index` type.
pub fn is_index(types: &TypeInterner, ty: TypeRef) -> bool {
    types.is_dialect(ty, DIALECT(), TY_INDEX())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_widths() {
        let mut ctx = IrContext::new();
        let i8_ty = int_ty(&mut ctx, 8);
        let i64_ty = int_ty(&mut ctx, 64);
        let idx_ty = index_ty(&mut ctx);

        assert_eq!(model_width(&ctx.types, i8_ty), Some(8));
        assert_eq!(model_width(&ctx.types, i64_ty), Some(64));
        assert_eq!(model_width(&ctx.types, idx_ty), Some(64));
        assert!(is_index(&ctx.types, idx_ty));
        assert!(!is_index(&ctx.types, i64_ty));
    }
}
