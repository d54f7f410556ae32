//! Dialect definitions: opcode names and typed constructor helpers.
//!
//! Constructors create detached operations (`create_op` only); callers attach
//! them to a block with `push_op` / `insert_op_before`.

pub mod arith;
pub mod cf;
pub mod core;
