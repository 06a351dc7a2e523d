use rhdl_bitvec::{BitVecError, Width};

/// Runtime simulation failures.
///
/// Elaboration guarantees make most of these unreachable for well-formed
/// designs; they are guarded anyway so a builder bug can never corrupt
/// state. The tick boundary is the error boundary: a failed tick leaves the
/// previous tick's state intact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// Name does not resolve to a signal of the design.
    #[error("unknown signal `{0}`")]
    UnknownSignal(String),
    /// Name does not resolve to a clock of the design.
    #[error("unknown clock `{0}`")]
    UnknownClock(String),
    /// Name does not resolve to a memory of the design.
    #[error("unknown memory `{0}`")]
    UnknownMemory(String),
    /// Poke target is not an input port.
    #[error("signal `{0}` is not an input port")]
    NotAnInput(String),
    /// Poked value width disagrees with the port.
    #[error("value for `{signal}` is {actual} bits, port is {expected}")]
    PokeWidth {
        /// Poked port.
        signal: String,
        /// Port width.
        expected: Width,
        /// Value width.
        actual: Width,
    },
    /// Memory access past the last cell.
    #[error("address {addr} is out of range for memory `{memory}` of depth {depth}")]
    AddressOutOfRange {
        /// Accessed memory.
        memory: String,
        /// Offending address.
        addr: u128,
        /// Memory depth; the last valid address is `depth - 1`.
        depth: usize,
    },
    /// The design declares no clock, so there is nothing to tick.
    #[error("design has no clock")]
    NoClock,
    /// Snapshot payload was not valid base64.
    #[error("snapshot payload is not valid base64: {0}")]
    SnapshotDecode(String),
    /// Guarded kernel failure during evaluation.
    #[error(transparent)]
    Value(#[from] BitVecError),
}
