use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use rhdl_bitvec::{BitVec, Width};

use crate::expr::Expr;

/// Stable handle to a declared signal within one component (or, after
/// flattening, within one design). Signals are arena-indexed; expressions
/// reference them by id rather than by shared pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub usize);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Handle to a declared clock domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockId(pub usize);

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clk{}", self.0)
    }
}

/// Handle to a declared memory array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryId(pub usize);

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Reset polarity of a register's reset input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetPolarity {
    /// Reset asserts when the signal is 1.
    ActiveHigh,
    /// Reset asserts when the signal is 0.
    ActiveLow,
}

/// Reset style of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetKind {
    /// Reset is sampled on the clock edge like any other input.
    Synchronous,
    /// Reset forces the register value independent of any clock edge.
    Asynchronous,
}

/// Optional reset wiring of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSpec {
    /// The 1-bit signal that asserts the reset.
    pub signal: SignalId,
    /// Assertion polarity.
    pub polarity: ResetPolarity,
    /// Synchronous or asynchronous behavior.
    pub kind: ResetKind,
}

/// What a declared signal is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    /// External input port. `default` is the value seen before the first
    /// poke.
    Input {
        /// Value driven until the environment pokes the port.
        default: BitVec,
    },
    /// External output port, driven by exactly one assignment.
    Output,
    /// Internal wire, driven by exactly one assignment or memory read port.
    Wire,
    /// Clocked storage element.
    Register {
        /// Value after reset.
        reset: BitVec,
        /// Clock domain whose edges commit this register.
        clock: ClockId,
        /// Optional reset wiring.
        reset_spec: Option<ResetSpec>,
    },
}

impl SignalKind {
    /// True for input ports.
    pub const fn is_input(&self) -> bool {
        matches!(self, SignalKind::Input { .. })
    }

    /// True for output ports.
    pub const fn is_output(&self) -> bool {
        matches!(self, SignalKind::Output)
    }

    /// True for registers.
    pub const fn is_register(&self) -> bool {
        matches!(self, SignalKind::Register { .. })
    }
}

/// A named, fixed-width value carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Declared name, unique within the component.
    pub name: String,
    /// Width in bits.
    pub width: Width,
    /// Role of the signal.
    pub kind: SignalKind,
}

/// A declared clock domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    /// Declared name, unique within the component.
    pub name: String,
}

/// Read port behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Address sampled on the clock edge; data appears one cycle later
    /// through an implicit register.
    Synchronous,
    /// Data follows the current address and storage combinationally.
    Asynchronous,
}

/// A memory read port. The port drives `data` — a dedicated wire — either
/// combinationally or through the implicit one-cycle register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPort {
    /// Address expression.
    pub addr: Expr,
    /// Wire carrying the read data.
    pub data: SignalId,
    /// Synchronous or asynchronous read.
    pub mode: ReadMode,
    /// Clock for synchronous reads; `None` for asynchronous ports.
    pub clock: Option<ClockId>,
}

/// A memory write port; commits on its clock edge when `enable` is 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePort {
    /// Clock whose edge commits the write.
    pub clock: ClockId,
    /// Address expression, sampled at the edge against settled values.
    pub addr: Expr,
    /// Data expression, sampled the same way.
    pub data: Expr,
    /// Write enable, 1 bit.
    pub enable: Expr,
}

/// A typed memory array with explicit ports.
///
/// When several write ports hit the same address on the same edge, the last
/// port in declaration order wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    /// Declared name, unique within the component.
    pub name: String,
    /// Number of cells.
    pub depth: usize,
    /// Width of each cell.
    pub width: Width,
    /// Read ports in declaration order.
    pub read_ports: Vec<ReadPort>,
    /// Write ports in declaration order.
    pub write_ports: Vec<WritePort>,
}

/// A combinational assignment: `lhs <- expr` under the current register and
/// memory state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Driven wire or output.
    pub lhs: SignalId,
    /// Driver expression.
    pub expr: Expr,
}

/// One register update rule inside a sequential process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRule {
    /// Updated register.
    pub lhs: SignalId,
    /// Next-state expression, sampled against the settled pre-edge values.
    pub expr: Expr,
}

/// A child component instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Instance name, unique within the parent.
    pub name: String,
    /// Name of the instantiated component, resolved through the registry.
    pub component: String,
    /// Child input port name -> parent expression.
    pub inputs: Vec<(String, Expr)>,
    /// Child output port name -> parent wire that mirrors it.
    pub outputs: Vec<(String, SignalId)>,
    /// Child clock name -> parent clock.
    pub clocks: Vec<(String, ClockId)>,
}

/// A sequential process: all rules commit on edges of one clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentProcess {
    /// Clock domain of the process.
    pub clock: ClockId,
    /// Update rules, committed atomically per edge.
    pub rules: Vec<SeqRule>,
}

/// An immutable circuit description.
///
/// Built once through [`ComponentBuilder`](crate::ComponentBuilder); shared
/// by reference afterwards. All structural checking happens in
/// [`Design::elaborate`](crate::Design::elaborate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Component name; also the module name in generated HDL.
    pub name: String,
    /// All signals, indexed by [`SignalId`]. Port order is declaration
    /// order within this list.
    pub signals: Vec<Signal>,
    /// Declared clock domains, indexed by [`ClockId`]. The first clock is
    /// the default.
    pub clocks: Vec<Clock>,
    /// Memory arrays, indexed by [`MemoryId`].
    pub memories: Vec<Memory>,
    /// Combinational assignments.
    pub assignments: Vec<Assignment>,
    /// Sequential processes.
    pub processes: Vec<ComponentProcess>,
    /// Child instances.
    pub instances: Vec<Instance>,
}

impl Component {
    /// Look up a signal id by name.
    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.signals
            .iter()
            .position(|s| s.name == name)
            .map(SignalId)
    }

    /// Look up a clock id by name.
    pub fn find_clock(&self, name: &str) -> Option<ClockId> {
        self.clocks.iter().position(|c| c.name == name).map(ClockId)
    }

    /// Input ports in declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = (SignalId, &Signal)> {
        self.signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind.is_input())
            .map(|(i, s)| (SignalId(i), s))
    }

    /// Output ports in declaration order.
    pub fn outputs(&self) -> impl Iterator<Item = (SignalId, &Signal)> {
        self.signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind.is_output())
            .map(|(i, s)| (SignalId(i), s))
    }
}

/// Optional name-based component lookup for applications that want it.
/// Components are plain values; nothing registers itself implicitly.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    components: HashMap<String, Arc<Component>>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a component under its own name, replacing any previous entry.
    pub fn insert(&mut self, component: Component) -> Arc<Component> {
        let arc = Arc::new(component);
        self.components.insert(arc.name.clone(), Arc::clone(&arc));
        arc
    }

    /// Look up a component by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Component>> {
        self.components.get(name)
    }

    /// Iterate all registered components.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Component>> {
        self.components.values()
    }
}
