//! Structural (gate-level) representation of RHDL designs.
//!
//! [`lower`] transforms an elaborated behavioral design into a [`Netlist`]
//! of primitive gates, D flip-flops, and memory primitives connected by
//! named nets; [`fold_constants`] then collapses constant nets and reduces
//! gates with constant inputs. The netlist is behaviorally equivalent to
//! its source design under the same cycle model — [`NetlistSim`] evaluates
//! a netlist so the equivalence tests can hold it to that.

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod eval;
mod fold;
mod lower;
mod netlist;

pub use eval::NetlistSim;
pub use fold::fold_constants;
pub use lower::{lower, LowerParams};
pub use netlist::{
    AsyncResetBit, Dff, Gate, GateKind, MemoryPrimitive, MemReadPort, MemWritePort, NetId,
    Netlist, NetlistStats,
};
