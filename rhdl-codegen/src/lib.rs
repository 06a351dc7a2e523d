//! Code generation: behavioral Verilog and VHDL from component trees,
//! structural Verilog from gate-level netlists.
//!
//! Emission is pure — design in, text out — and stable: the same input
//! produces byte-identical output across runs. Every wire and port carries
//! a declared width and every literal is sized.

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod error;
mod sanitize;
mod structural;
mod verilog;
mod vhdl;

pub use error::CodegenError;
pub use sanitize::sanitize_identifier;
pub use structural::structural_verilog;
pub use verilog::behavioral_verilog;
pub use vhdl::behavioral_vhdl;

/// Result alias for emission.
pub type Result<T> = core::result::Result<T, CodegenError>;
