use rhdl_bitvec::{BitVec, Width};

use crate::component::{
    Assignment, Clock, ClockId, Component, ComponentProcess, Instance, Memory, MemoryId,
    ReadMode, ReadPort, ResetKind, ResetPolarity, ResetSpec, SeqRule, Signal, SignalId,
    SignalKind, WritePort,
};
use crate::error::ElaborationError;
use crate::expr::Expr;
use crate::Result;

/// Collects one component's declarations.
///
/// Construction functions receive a builder, declare ports and storage
/// through explicit method calls that return typed handles, add behavior,
/// and finish with [`build`](Self::build). Declaration order is preserved;
/// it is the port order in generated HDL and the conflict-resolution order
/// for memory write ports.
///
/// ```
/// use rhdl_bir::{dsl::*, ComponentBuilder};
/// use rhdl_bitvec::BitVec;
///
/// let mut b = ComponentBuilder::new("counter");
/// let clk = b.clock("clk");
/// let q = b.register("q", 4, BitVec::zero(4).unwrap(), clk).unwrap();
/// let count = b.output("count", 4).unwrap();
/// b.assign(count, sig(q)).unwrap();
/// b.process(clk).rule(q, add(sig(q), lit(1, 4)));
/// let counter = b.build().unwrap();
/// assert_eq!(counter.name, "counter");
/// ```
#[derive(Debug)]
pub struct ComponentBuilder {
    name: String,
    signals: Vec<Signal>,
    clocks: Vec<Clock>,
    memories: Vec<Memory>,
    assignments: Vec<Assignment>,
    processes: Vec<ComponentProcess>,
    instances: Vec<Instance>,
    error: Option<ElaborationError>,
}

impl ComponentBuilder {
    /// Start a component with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signals: Vec::new(),
            clocks: Vec::new(),
            memories: Vec::new(),
            assignments: Vec::new(),
            processes: Vec::new(),
            instances: Vec::new(),
            error: None,
        }
    }

    /// Declare a clock domain. The first declared clock is the design's
    /// default clock.
    pub fn clock(&mut self, name: impl Into<String>) -> ClockId {
        let name = name.into();
        if self.clocks.iter().any(|c| c.name == name) {
            self.defer(ElaborationError::DuplicateName {
                component: self.name.clone(),
                name: name.clone(),
            });
        }
        self.clocks.push(Clock { name });
        ClockId(self.clocks.len() - 1)
    }

    /// Declare an input port with a zero default.
    pub fn input(&mut self, name: impl Into<String>, width: Width) -> Result<SignalId> {
        let default = BitVec::zero(width).map_err(ElaborationError::value(&self.name))?;
        Ok(self.push_signal(name.into(), width, SignalKind::Input { default }))
    }

    /// Declare an input port seen as `default` until the first poke.
    pub fn input_with_default(
        &mut self,
        name: impl Into<String>,
        default: BitVec,
    ) -> Result<SignalId> {
        Ok(self.push_signal(
            name.into(),
            default.width(),
            SignalKind::Input { default },
        ))
    }

    /// Declare an output port.
    pub fn output(&mut self, name: impl Into<String>, width: Width) -> Result<SignalId> {
        BitVec::zero(width).map_err(ElaborationError::value(&self.name))?;
        Ok(self.push_signal(name.into(), width, SignalKind::Output))
    }

    /// Declare an internal wire.
    pub fn wire(&mut self, name: impl Into<String>, width: Width) -> Result<SignalId> {
        BitVec::zero(width).map_err(ElaborationError::value(&self.name))?;
        Ok(self.push_signal(name.into(), width, SignalKind::Wire))
    }

    /// Declare a register without reset wiring; it still carries a declared
    /// reset value applied by `reset()` on the simulation handle.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        width: Width,
        reset: BitVec,
        clock: ClockId,
    ) -> Result<SignalId> {
        self.register_full(name, width, reset, clock, None)
    }

    /// Declare a register with explicit reset wiring.
    pub fn register_with_reset(
        &mut self,
        name: impl Into<String>,
        width: Width,
        reset: BitVec,
        clock: ClockId,
        reset_signal: SignalId,
        polarity: ResetPolarity,
        kind: ResetKind,
    ) -> Result<SignalId> {
        self.register_full(
            name,
            width,
            reset,
            clock,
            Some(ResetSpec {
                signal: reset_signal,
                polarity,
                kind,
            }),
        )
    }

    fn register_full(
        &mut self,
        name: impl Into<String>,
        width: Width,
        reset: BitVec,
        clock: ClockId,
        reset_spec: Option<ResetSpec>,
    ) -> Result<SignalId> {
        let name = name.into();
        if reset.width() != width {
            return Err(ElaborationError::WidthMismatch {
                component: self.name.clone(),
                context: format!("reset value of register `{name}`"),
                expected: width,
                actual: reset.width(),
            });
        }
        Ok(self.push_signal(
            name,
            width,
            SignalKind::Register {
                reset,
                clock,
                reset_spec,
            },
        ))
    }

    /// Declare a memory array. Ports are added afterwards with
    /// [`read_port`](Self::read_port) and [`write_port`](Self::write_port).
    pub fn memory(
        &mut self,
        name: impl Into<String>,
        depth: usize,
        width: Width,
    ) -> Result<MemoryId> {
        let name = name.into();
        if depth == 0 {
            return Err(ElaborationError::MalformedMemoryPort {
                component: self.name.clone(),
                memory: name,
                reason: "memory depth must be at least 1".into(),
            });
        }
        BitVec::zero(width).map_err(ElaborationError::value(&self.name))?;
        if self.memories.iter().any(|m| m.name == name) {
            self.defer(ElaborationError::DuplicateName {
                component: self.name.clone(),
                name: name.clone(),
            });
        }
        self.memories.push(Memory {
            name,
            depth,
            width,
            read_ports: Vec::new(),
            write_ports: Vec::new(),
        });
        Ok(MemoryId(self.memories.len() - 1))
    }

    /// Add a read port to a memory. Returns the wire carrying the read
    /// data; synchronous ports take the clock whose edge samples the
    /// address.
    pub fn read_port(
        &mut self,
        memory: MemoryId,
        addr: Expr,
        mode: ReadMode,
        clock: Option<ClockId>,
    ) -> Result<SignalId> {
        let (mem_name, width, port_index) = {
            let mem = &self.memories[memory.0];
            (mem.name.clone(), mem.width, mem.read_ports.len())
        };
        if mode == ReadMode::Synchronous && clock.is_none() {
            return Err(ElaborationError::MalformedMemoryPort {
                component: self.name.clone(),
                memory: mem_name,
                reason: "synchronous read port requires a clock".into(),
            });
        }
        let data = self.push_signal(
            format!("{mem_name}_rdata{port_index}"),
            width,
            SignalKind::Wire,
        );
        self.memories[memory.0].read_ports.push(ReadPort {
            addr,
            data,
            mode,
            clock,
        });
        Ok(data)
    }

    /// Add a write port to a memory. Declaration order is the conflict
    /// resolution order: on one edge, the last declared port wins.
    pub fn write_port(
        &mut self,
        memory: MemoryId,
        clock: ClockId,
        addr: Expr,
        data: Expr,
        enable: Expr,
    ) {
        self.memories[memory.0].write_ports.push(WritePort {
            clock,
            addr,
            data,
            enable,
        });
    }

    /// Combinational assignment `lhs <- expr`.
    pub fn assign(&mut self, lhs: SignalId, expr: Expr) -> Result<()> {
        self.assignments.push(Assignment { lhs, expr });
        Ok(())
    }

    /// Open a sequential process on `clock`. Rules added through the
    /// returned builder commit atomically on each edge of that clock.
    pub fn process(&mut self, clock: ClockId) -> ProcessBuilder<'_> {
        self.processes.push(ComponentProcess {
            clock,
            rules: Vec::new(),
        });
        let index = self.processes.len() - 1;
        ProcessBuilder {
            builder: self,
            index,
        }
    }

    /// Instantiate a child component. Bindings are given by child port
    /// name; inputs take parent expressions, outputs mirror into parent
    /// wires, clocks map onto parent clocks.
    pub fn instance(
        &mut self,
        name: impl Into<String>,
        component: impl Into<String>,
        inputs: Vec<(String, Expr)>,
        outputs: Vec<(String, SignalId)>,
        clocks: Vec<(String, ClockId)>,
    ) {
        self.instances.push(Instance {
            name: name.into(),
            component: component.into(),
            inputs,
            outputs,
            clocks,
        });
    }

    /// Finish the component. Fails on duplicate declarations recorded
    /// along the way; structural checks happen at elaboration.
    pub fn build(self) -> Result<Component> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Component {
            name: self.name,
            signals: self.signals,
            clocks: self.clocks,
            memories: self.memories,
            assignments: self.assignments,
            processes: self.processes,
            instances: self.instances,
        })
    }

    fn push_signal(&mut self, name: String, width: Width, kind: SignalKind) -> SignalId {
        if self.signals.iter().any(|s| s.name == name) {
            self.defer(ElaborationError::DuplicateName {
                component: self.name.clone(),
                name: name.clone(),
            });
        }
        self.signals.push(Signal { name, width, kind });
        SignalId(self.signals.len() - 1)
    }

    // The first recorded error wins; later calls keep the handle usable so
    // construction code can stay straight-line.
    fn defer(&mut self, error: ElaborationError) {
        self.error.get_or_insert(error);
    }
}

/// Adds rules to one sequential process.
#[derive(Debug)]
pub struct ProcessBuilder<'a> {
    builder: &'a mut ComponentBuilder,
    index: usize,
}

impl ProcessBuilder<'_> {
    /// Add the update rule `lhs <- expr` on this process's clock edge.
    pub fn rule(&mut self, lhs: SignalId, expr: Expr) -> &mut Self {
        self.builder.processes[self.index]
            .rules
            .push(SeqRule { lhs, expr });
        self
    }
}
