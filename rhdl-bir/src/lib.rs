//! Behavioral intermediate representation.
//!
//! A circuit is described by building [`Component`] values through a
//! [`ComponentBuilder`]: ports, wires, registers, memory arrays, combinational
//! assignments, sequential rules, and child instances. [`Design::elaborate`]
//! freezes a component tree into a flattened, checked [`Design`] that the
//! simulation backends and the netlist lowering consume. Components and
//! designs are immutable after construction and may be shared freely.

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod builder;
mod component;
mod elaborate;
mod error;
mod expr;
mod ir_json;

pub use builder::{ComponentBuilder, ProcessBuilder};
pub use component::{
    Assignment, Clock, ClockId, Component, ComponentProcess, Instance, Memory, MemoryId,
    ReadMode, ReadPort, Registry, ResetKind, ResetPolarity, ResetSpec, SeqRule, Signal,
    SignalId, SignalKind, WritePort,
};
pub use elaborate::{CombOp, Design, DesignMemory, DesignRegister, Process};
pub use error::ElaborationError;
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use ir_json::{design_from_json, design_to_json};

/// Expression construction helpers, meant to be imported as a prelude by
/// component definitions.
pub mod dsl {
    pub use crate::expr::{
        add, and, bnot, case, cat, eq, ge, gt, le, let_in, lit, local, lt, mux, ne, neg, or,
        reduce_and, reduce_or, reduce_xor, shl, shr, sig, slice, sub, xor,
    };
}

/// Result alias for elaboration-stage operations.
pub type Result<T> = core::result::Result<T, ElaborationError>;
