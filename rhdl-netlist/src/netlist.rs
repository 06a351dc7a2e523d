use core::fmt;

use hashbrown::HashMap;
use rhdl_bir::ClockId;
use rhdl_bitvec::Width;

/// Handle to one single-bit net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub usize);

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Primitive gate types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    /// Two-input AND.
    And,
    /// Two-input OR.
    Or,
    /// Inverter.
    Not,
    /// Two-input XOR.
    Xor,
    /// Two-input NAND.
    Nand,
    /// Two-input NOR.
    Nor,
    /// Two-input XNOR.
    Xnor,
    /// Buffer; used to alias a net onto a named output.
    Buf,
}

impl GateKind {
    /// Structural Verilog primitive name.
    pub const fn primitive(&self) -> &'static str {
        match self {
            GateKind::And => "and",
            GateKind::Or => "or",
            GateKind::Not => "not",
            GateKind::Xor => "xor",
            GateKind::Nand => "nand",
            GateKind::Nor => "nor",
            GateKind::Xnor => "xnor",
            GateKind::Buf => "buf",
        }
    }

    /// Number of input pins.
    pub const fn arity(&self) -> usize {
        match self {
            GateKind::Not | GateKind::Buf => 1,
            _ => 2,
        }
    }
}

/// One primitive gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    /// Gate type.
    pub kind: GateKind,
    /// Input nets; length matches [`GateKind::arity`].
    pub inputs: Vec<NetId>,
    /// Driven net.
    pub output: NetId,
}

/// Asynchronous reset wiring of one flip-flop bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncResetBit {
    /// Reset net.
    pub net: NetId,
    /// True when the reset asserts at 1.
    pub active_high: bool,
    /// Bit value the flop takes while reset.
    pub value: bool,
}

/// One D flip-flop bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dff {
    /// Next-state input.
    pub d: NetId,
    /// Stored output.
    pub q: NetId,
    /// Clock domain whose edges load `d`.
    pub clock: ClockId,
    /// Power-on / reset value committed by `reset()`.
    pub init: bool,
    /// Optional asynchronous reset.
    pub reset: Option<AsyncResetBit>,
}

/// One read port of a [`MemoryPrimitive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemReadPort {
    /// Address bits, LSB first.
    pub addr: Vec<NetId>,
    /// Data bits the port drives, LSB first.
    pub data: Vec<NetId>,
    /// Synchronous ports sample the address on this clock and present
    /// data one cycle later; `None` means combinational data.
    pub clock: Option<ClockId>,
}

/// One write port of a [`MemoryPrimitive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemWritePort {
    /// Address bits, LSB first.
    pub addr: Vec<NetId>,
    /// Data bits, LSB first.
    pub data: Vec<NetId>,
    /// Write enable net.
    pub enable: NetId,
    /// Clock whose edge commits the write.
    pub clock: ClockId,
}

/// A memory too large to flatten into flip-flops, kept as an opaque
/// primitive with gate-level port wiring.
///
/// Timing contract: writes commit on their clock edge with last-declared-
/// port-wins conflict resolution; synchronous reads sample the pre-edge
/// storage; an out-of-range address reads as zero and ignores writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPrimitive {
    /// Memory name from the source design.
    pub name: String,
    /// Number of cells.
    pub depth: usize,
    /// Cell width in bits.
    pub width: Width,
    /// Read ports in declaration order.
    pub read_ports: Vec<MemReadPort>,
    /// Write ports in declaration order.
    pub write_ports: Vec<MemWritePort>,
}

/// Gate and flip-flop counts for reporting and the structural round-trip
/// laws.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetlistStats {
    /// Gate count per kind.
    pub gates: HashMap<GateKind, usize>,
    /// Flip-flop bit count.
    pub dffs: usize,
    /// Net count, constants included.
    pub nets: usize,
    /// Opaque memory primitive count.
    pub memories: usize,
}

/// A flat gate-level design.
///
/// The netlist owns its gate and flip-flop lists and refers to wires by
/// net id; net 0 is constant zero and net 1 constant one. Once lowered it
/// is independent of the BIR it came from.
#[derive(Debug, Clone)]
pub struct Netlist {
    /// Design name.
    pub name: String,
    /// Clock names, indexed by [`ClockId`].
    pub clocks: Vec<String>,
    net_names: Vec<String>,
    /// Input ports: name and per-bit nets, LSB first.
    pub inputs: Vec<(String, Vec<NetId>)>,
    /// Output ports: name and per-bit nets, LSB first.
    pub outputs: Vec<(String, Vec<NetId>)>,
    /// Gates, in a valid evaluation order.
    pub gates: Vec<Gate>,
    /// Flip-flops.
    pub dffs: Vec<Dff>,
    /// Opaque memories.
    pub memories: Vec<MemoryPrimitive>,
}

/// Net 0 is the constant-zero net.
pub(crate) const CONST0: NetId = NetId(0);
/// Net 1 is the constant-one net.
pub(crate) const CONST1: NetId = NetId(1);

impl Netlist {
    pub(crate) fn new(name: String, clocks: Vec<String>) -> Self {
        Self {
            name,
            clocks,
            net_names: vec!["const0".into(), "const1".into()],
            inputs: Vec::new(),
            outputs: Vec::new(),
            gates: Vec::new(),
            dffs: Vec::new(),
            memories: Vec::new(),
        }
    }

    pub(crate) fn fresh_net(&mut self, name: Option<String>) -> NetId {
        let id = NetId(self.net_names.len());
        self.net_names
            .push(name.unwrap_or_else(|| format!("n{}", id.0)));
        id
    }

    /// Name of a net.
    pub fn net_name(&self, id: NetId) -> &str {
        &self.net_names[id.0]
    }

    /// Number of nets, constants included.
    pub fn net_count(&self) -> usize {
        self.net_names.len()
    }

    /// The constant-zero net.
    pub const fn const0(&self) -> NetId {
        CONST0
    }

    /// The constant-one net.
    pub const fn const1(&self) -> NetId {
        CONST1
    }

    /// Count gates, flops, nets, and memories.
    pub fn stats(&self) -> NetlistStats {
        let mut stats = NetlistStats {
            dffs: self.dffs.len(),
            nets: self.net_count(),
            memories: self.memories.len(),
            ..Default::default()
        };
        for gate in &self.gates {
            *stats.gates.entry(gate.kind).or_insert(0) += 1;
        }
        stats
    }
}
