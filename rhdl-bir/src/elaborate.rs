use hashbrown::HashMap;
use rhdl_bitvec::Width;
use tracing::{debug, warn};

use crate::component::{
    Assignment, Clock, ClockId, Component, Instance, Memory, MemoryId, ReadMode, Registry,
    ResetSpec, SeqRule, Signal, SignalId, SignalKind,
};
use crate::error::ElaborationError;
use crate::expr::Expr;
use crate::Result;

/// A register of the flattened design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignRegister {
    /// The register's signal.
    pub signal: SignalId,
    /// Clock domain whose edges commit it.
    pub clock: ClockId,
    /// Reset wiring, if any.
    pub reset_spec: Option<ResetSpec>,
}

/// A memory array of the flattened design. Port expressions reference flat
/// signal ids.
pub type DesignMemory = Memory;

/// A sequential process of the flattened design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    /// Clock domain of the process.
    pub clock: ClockId,
    /// Rules committed atomically on each edge.
    pub rules: Vec<SeqRule>,
}

/// One step of the combinational settle, in topological order of its data
/// dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombOp {
    /// Evaluate the assignment at this index of [`Design::assignments`].
    Assign(usize),
    /// Refresh the data wire of an asynchronous memory read port.
    MemRead {
        /// Memory owning the port.
        memory: MemoryId,
        /// Index into that memory's read ports.
        port: usize,
    },
}

/// A frozen, flattened, structurally-checked design.
///
/// Produced by [`Design::elaborate`]; immutable afterwards. Signal names
/// from child instances are dotted with the instance path (`cpu.alu.flags`).
/// Simulation handles share a design through `Arc` and never mutate it.
#[derive(Debug, Clone)]
pub struct Design {
    name: String,
    signals: Vec<Signal>,
    clocks: Vec<Clock>,
    registers: Vec<DesignRegister>,
    memories: Vec<DesignMemory>,
    assignments: Vec<Assignment>,
    processes: Vec<Process>,
    comb_order: Vec<CombOp>,
    inputs: Vec<SignalId>,
    outputs: Vec<SignalId>,
    by_name: HashMap<String, SignalId>,
    mem_by_name: HashMap<String, MemoryId>,
}

impl Design {
    /// Flatten and check a component tree.
    ///
    /// The registry resolves instance references; a top with no instances
    /// elaborates against an empty registry. Fails on any violation of the
    /// structural rules: unresolved names, width mismatches, multiple or
    /// missing drivers, non-register sequential targets, clock mismatches,
    /// malformed memory ports, and combinational cycles.
    pub fn elaborate(top: &Component, registry: &Registry) -> Result<Design> {
        let mut flat = Flattener::new(registry);
        flat.component(top, String::new(), None)?;

        let Flattener {
            signals,
            memories,
            assignments,
            from_instance,
            processes,
            ..
        } = flat;
        let clocks = top.clocks.clone();

        let mut design = Design {
            name: top.name.clone(),
            signals,
            clocks,
            registers: Vec::new(),
            memories,
            assignments,
            processes,
            comb_order: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            by_name: HashMap::new(),
            mem_by_name: HashMap::new(),
        };

        design.collect_roles();
        design.check_widths()?;
        design.check_memories()?;
        design.check_drivers(from_instance)?;
        design.check_processes()?;
        design.order_combinational()?;

        for (index, memory) in design.memories.iter().enumerate() {
            design
                .mem_by_name
                .insert(memory.name.clone(), MemoryId(index));
        }
        for (index, signal) in design.signals.iter().enumerate() {
            design.by_name.insert(signal.name.clone(), SignalId(index));
        }

        debug!(
            design = %design.name,
            signals = design.signals.len(),
            registers = design.registers.len(),
            memories = design.memories.len(),
            comb_ops = design.comb_order.len(),
            "elaborated"
        );
        Ok(design)
    }

    /// Design (top component) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All flat signals, indexed by [`SignalId`].
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// Look up a flat signal by dotted name.
    pub fn signal_id(&self, name: &str) -> Option<SignalId> {
        self.by_name.get(name).copied()
    }

    /// Declared clock domains of the top component.
    pub fn clocks(&self) -> &[Clock] {
        &self.clocks
    }

    /// The first declared clock, which `tick()` advances.
    pub fn default_clock(&self) -> Option<ClockId> {
        (!self.clocks.is_empty()).then_some(ClockId(0))
    }

    /// Look up a clock by name.
    pub fn clock_id(&self, name: &str) -> Option<ClockId> {
        self.clocks.iter().position(|c| c.name == name).map(ClockId)
    }

    /// All registers of the flat design.
    pub fn registers(&self) -> &[DesignRegister] {
        &self.registers
    }

    /// All memory arrays of the flat design.
    pub fn memories(&self) -> &[DesignMemory] {
        &self.memories
    }

    /// Look up a memory by dotted name.
    pub fn memory_id(&self, name: &str) -> Option<MemoryId> {
        self.mem_by_name.get(name).copied()
    }

    /// Flat combinational assignments.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Flat sequential processes.
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// The combinational settle order. Evaluating the ops in this order
    /// satisfies every data dependency.
    pub fn comb_order(&self) -> &[CombOp] {
        &self.comb_order
    }

    /// External input ports, in declaration order.
    pub fn inputs(&self) -> &[SignalId] {
        &self.inputs
    }

    /// External output ports, in declaration order.
    pub fn outputs(&self) -> &[SignalId] {
        &self.outputs
    }

    /// Width of a flat signal.
    pub fn width_of(&self, id: SignalId) -> Width {
        self.signals[id.0].width
    }

    /// Compute the width of an expression over this design's signals.
    pub fn expr_width(&self, expr: &Expr) -> Result<Width> {
        let mut locals = Vec::new();
        expr_width(expr, &self.name, &self.signals, &mut locals)
    }

    fn collect_roles(&mut self) {
        for (index, signal) in self.signals.iter().enumerate() {
            match &signal.kind {
                SignalKind::Input { .. } => self.inputs.push(SignalId(index)),
                SignalKind::Output => self.outputs.push(SignalId(index)),
                SignalKind::Register {
                    clock, reset_spec, ..
                } => self.registers.push(DesignRegister {
                    signal: SignalId(index),
                    clock: *clock,
                    reset_spec: *reset_spec,
                }),
                SignalKind::Wire => {}
            }
        }
    }

    fn check_widths(&self) -> Result<()> {
        let name = &self.name;
        for assignment in &self.assignments {
            let expected = self.width_of(assignment.lhs);
            let actual = self.expr_width(&assignment.expr)?;
            if expected != actual {
                return Err(ElaborationError::WidthMismatch {
                    component: name.clone(),
                    context: format!(
                        "assignment to `{}`",
                        self.signals[assignment.lhs.0].name
                    ),
                    expected,
                    actual,
                });
            }
        }
        for process in &self.processes {
            for rule in &process.rules {
                let expected = self.width_of(rule.lhs);
                let actual = self.expr_width(&rule.expr)?;
                if expected != actual {
                    return Err(ElaborationError::WidthMismatch {
                        component: name.clone(),
                        context: format!(
                            "sequential rule for `{}`",
                            self.signals[rule.lhs.0].name
                        ),
                        expected,
                        actual,
                    });
                }
            }
        }
        for register in &self.registers {
            if let Some(reset) = register.reset_spec {
                let actual = self.width_of(reset.signal);
                if actual != 1 {
                    return Err(ElaborationError::WidthMismatch {
                        component: name.clone(),
                        context: format!(
                            "reset signal of `{}`",
                            self.signals[register.signal.0].name
                        ),
                        expected: 1,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_memories(&self) -> Result<()> {
        let name = &self.name;
        for memory in &self.memories {
            for port in &memory.read_ports {
                self.expr_width(&port.addr)?;
                if port.mode == ReadMode::Synchronous && port.clock.is_none() {
                    return Err(ElaborationError::MalformedMemoryPort {
                        component: name.clone(),
                        memory: memory.name.clone(),
                        reason: "synchronous read port requires a clock".into(),
                    });
                }
            }
            for port in &memory.write_ports {
                self.expr_width(&port.addr)?;
                let data = self.expr_width(&port.data)?;
                if data != memory.width {
                    return Err(ElaborationError::WidthMismatch {
                        component: name.clone(),
                        context: format!("write data of memory `{}`", memory.name),
                        expected: memory.width,
                        actual: data,
                    });
                }
                let enable = self.expr_width(&port.enable)?;
                if enable != 1 {
                    return Err(ElaborationError::WidthMismatch {
                        component: name.clone(),
                        context: format!("write enable of memory `{}`", memory.name),
                        expected: 1,
                        actual: enable,
                    });
                }
            }
        }
        Ok(())
    }

    /// Driver accounting. `from_instance[i]` marks assignments synthesized
    /// from instance output bindings; when such a mirror collides with a
    /// direct behavioral assignment, behavior is authoritative and the
    /// mirror is dropped with a warning.
    fn check_drivers(&mut self, from_instance: Vec<bool>) -> Result<()> {
        let mut drivers: Vec<Vec<DriverRef>> = vec![Vec::new(); self.signals.len()];
        for (index, assignment) in self.assignments.iter().enumerate() {
            drivers[assignment.lhs.0].push(DriverRef::Assignment(index));
        }
        for memory in &self.memories {
            for port in &memory.read_ports {
                drivers[port.data.0].push(DriverRef::ReadPort);
            }
        }
        for process in &self.processes {
            for rule in &process.rules {
                drivers[rule.lhs.0].push(DriverRef::Rule);
            }
        }

        let mut dropped = Vec::new();
        for (index, signal) in self.signals.iter().enumerate() {
            let list = &drivers[index];
            match &signal.kind {
                SignalKind::Input { .. } => {
                    if !list.is_empty() {
                        return Err(ElaborationError::MultipleDrivers {
                            component: self.name.clone(),
                            signal: signal.name.clone(),
                        });
                    }
                }
                SignalKind::Register { .. } => {
                    let rules = list.iter().filter(|d| matches!(d, DriverRef::Rule)).count();
                    if rules != list.len() || rules > 1 {
                        return Err(ElaborationError::MultipleDrivers {
                            component: self.name.clone(),
                            signal: signal.name.clone(),
                        });
                    }
                }
                SignalKind::Output | SignalKind::Wire => match list.len() {
                    1 => {}
                    0 => {
                        return Err(ElaborationError::UndrivenSignal {
                            component: self.name.clone(),
                            signal: signal.name.clone(),
                        })
                    }
                    2 => {
                        // A structural mirror colliding with a behavioral
                        // assignment: behavior wins, the mirror is dropped.
                        let mirror = list.iter().find_map(|d| match d {
                            DriverRef::Assignment(i) if from_instance[*i] => Some(*i),
                            _ => None,
                        });
                        let behavioral = list.iter().any(|d| match d {
                            DriverRef::Assignment(i) => !from_instance[*i],
                            _ => false,
                        });
                        match (mirror, behavioral) {
                            (Some(mirror), true) => {
                                warn!(
                                    signal = %signal.name,
                                    "structural definition disagrees with behavior; keeping behavior"
                                );
                                dropped.push(mirror);
                            }
                            _ => {
                                return Err(ElaborationError::MultipleDrivers {
                                    component: self.name.clone(),
                                    signal: signal.name.clone(),
                                })
                            }
                        }
                    }
                    _ => {
                        return Err(ElaborationError::MultipleDrivers {
                            component: self.name.clone(),
                            signal: signal.name.clone(),
                        })
                    }
                },
            }
        }

        dropped.sort_unstable();
        for index in dropped.into_iter().rev() {
            self.assignments.remove(index);
        }
        Ok(())
    }

    fn check_processes(&self) -> Result<()> {
        for process in &self.processes {
            for rule in &process.rules {
                match &self.signals[rule.lhs.0].kind {
                    SignalKind::Register { clock, .. } => {
                        if *clock != process.clock {
                            return Err(ElaborationError::ClockMismatch {
                                component: self.name.clone(),
                                register: self.signals[rule.lhs.0].name.clone(),
                            });
                        }
                    }
                    _ => {
                        return Err(ElaborationError::NotARegister {
                            component: self.name.clone(),
                            signal: self.signals[rule.lhs.0].name.clone(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Topologically order the combinational ops; a cycle is fatal.
    fn order_combinational(&mut self) -> Result<()> {
        let mut ops = Vec::new();
        for index in 0..self.assignments.len() {
            ops.push(CombOp::Assign(index));
        }
        for (mem_index, memory) in self.memories.iter().enumerate() {
            for (port_index, port) in memory.read_ports.iter().enumerate() {
                if port.mode == ReadMode::Asynchronous {
                    ops.push(CombOp::MemRead {
                        memory: MemoryId(mem_index),
                        port: port_index,
                    });
                }
            }
        }

        // Producing op per combinationally-driven signal.
        let mut producer: HashMap<SignalId, usize> = HashMap::new();
        for (op_index, op) in ops.iter().enumerate() {
            let lhs = self.op_lhs(*op);
            producer.insert(lhs, op_index);
        }

        let deps: Vec<Vec<usize>> = ops
            .iter()
            .map(|op| {
                let mut ids = Vec::new();
                self.op_expr(*op).for_each_signal(&mut |id| ids.push(id));
                ids.sort_unstable();
                ids.dedup();
                ids.into_iter()
                    .filter_map(|id| producer.get(&id).copied())
                    .collect()
            })
            .collect();

        let mut state = vec![VisitState::Unvisited; ops.len()];
        let mut order = Vec::with_capacity(ops.len());
        for start in 0..ops.len() {
            self.visit(start, &ops, &deps, &mut state, &mut order)?;
        }
        self.comb_order = order;
        Ok(())
    }

    fn visit(
        &self,
        node: usize,
        ops: &[CombOp],
        deps: &[Vec<usize>],
        state: &mut [VisitState],
        order: &mut Vec<CombOp>,
    ) -> Result<()> {
        match state[node] {
            VisitState::Done => return Ok(()),
            VisitState::OnStack => {
                // Walk the in-progress nodes to present the cycle by name.
                let path = state
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| matches!(s, VisitState::OnStack))
                    .map(|(i, _)| self.signals[self.op_lhs(ops[i]).0].name.clone())
                    .collect();
                return Err(ElaborationError::CombinationalCycle {
                    component: self.name.clone(),
                    path,
                });
            }
            VisitState::Unvisited => {}
        }
        state[node] = VisitState::OnStack;
        for &dep in &deps[node] {
            self.visit(dep, ops, deps, state, order)?;
        }
        state[node] = VisitState::Done;
        order.push(ops[node]);
        Ok(())
    }

    fn op_lhs(&self, op: CombOp) -> SignalId {
        match op {
            CombOp::Assign(index) => self.assignments[index].lhs,
            CombOp::MemRead { memory, port } => self.memories[memory.0].read_ports[port].data,
        }
    }

    fn op_expr(&self, op: CombOp) -> &Expr {
        match op {
            CombOp::Assign(index) => &self.assignments[index].expr,
            CombOp::MemRead { memory, port } => &self.memories[memory.0].read_ports[port].addr,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DriverRef {
    Assignment(usize),
    ReadPort,
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    OnStack,
    Done,
}

/// Recursive flattening of the instance tree into one signal arena.
struct Flattener<'r> {
    registry: &'r Registry,
    signals: Vec<Signal>,
    memories: Vec<DesignMemory>,
    assignments: Vec<Assignment>,
    from_instance: Vec<bool>,
    processes: Vec<Process>,
    stack: Vec<String>,
}

impl<'r> Flattener<'r> {
    fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            signals: Vec::new(),
            memories: Vec::new(),
            assignments: Vec::new(),
            from_instance: Vec::new(),
            processes: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Inline `component` under `prefix`. `clock_map` maps the component's
    /// clock ids onto flat (top) clocks; `None` at the top level means
    /// identity. Returns the flat id base for the component's signals.
    fn component(
        &mut self,
        component: &Component,
        prefix: String,
        clock_map: Option<Vec<ClockId>>,
    ) -> Result<usize> {
        if self.stack.iter().any(|n| *n == component.name) {
            return Err(ElaborationError::RecursiveInstantiation {
                component: component.name.clone(),
            });
        }
        self.stack.push(component.name.clone());

        let is_top = prefix.is_empty();
        let base = self.signals.len();
        let map_clock = |id: ClockId| -> ClockId {
            match &clock_map {
                None => id,
                Some(map) => map[id.0],
            }
        };

        for signal in &component.signals {
            let name = if is_top {
                signal.name.clone()
            } else {
                format!("{prefix}.{}", signal.name)
            };
            let kind = match &signal.kind {
                // Child ports become wires; bindings drive the inputs below.
                SignalKind::Input { .. } if !is_top => SignalKind::Wire,
                SignalKind::Output if !is_top => SignalKind::Wire,
                SignalKind::Register {
                    reset,
                    clock,
                    reset_spec,
                } => SignalKind::Register {
                    reset: *reset,
                    clock: map_clock(*clock),
                    reset_spec: reset_spec.map(|spec| ResetSpec {
                        signal: SignalId(base + spec.signal.0),
                        ..spec
                    }),
                },
                other => other.clone(),
            };
            self.signals.push(Signal {
                name,
                width: signal.width,
                kind,
            });
        }

        let remap = |expr: &Expr| -> Expr {
            expr.map_signals(&mut |id| Expr::Signal(SignalId(base + id.0)))
        };

        for assignment in &component.assignments {
            self.assignments.push(Assignment {
                lhs: SignalId(base + assignment.lhs.0),
                expr: remap(&assignment.expr),
            });
            self.from_instance.push(false);
        }

        for memory in &component.memories {
            let name = if is_top {
                memory.name.clone()
            } else {
                format!("{prefix}.{}", memory.name)
            };
            self.memories.push(Memory {
                name,
                depth: memory.depth,
                width: memory.width,
                read_ports: memory
                    .read_ports
                    .iter()
                    .map(|port| crate::component::ReadPort {
                        addr: remap(&port.addr),
                        data: SignalId(base + port.data.0),
                        mode: port.mode,
                        clock: port.clock.map(map_clock),
                    })
                    .collect(),
                write_ports: memory
                    .write_ports
                    .iter()
                    .map(|port| crate::component::WritePort {
                        clock: map_clock(port.clock),
                        addr: remap(&port.addr),
                        data: remap(&port.data),
                        enable: remap(&port.enable),
                    })
                    .collect(),
            });
        }

        for process in &component.processes {
            self.processes.push(Process {
                clock: map_clock(process.clock),
                rules: process
                    .rules
                    .iter()
                    .map(|rule| SeqRule {
                        lhs: SignalId(base + rule.lhs.0),
                        expr: remap(&rule.expr),
                    })
                    .collect(),
            });
        }

        for instance in &component.instances {
            self.instance(component, instance, base, &prefix, &map_clock)?;
        }

        self.stack.pop();
        Ok(base)
    }

    fn instance(
        &mut self,
        parent: &Component,
        instance: &Instance,
        parent_base: usize,
        prefix: &str,
        map_clock: &impl Fn(ClockId) -> ClockId,
    ) -> Result<()> {
        let child = self.registry.get(&instance.component).ok_or_else(|| {
            ElaborationError::UnknownComponent {
                component: parent.name.clone(),
                instance: instance.name.clone(),
                target: instance.component.clone(),
            }
        })?;
        let child = std::sync::Arc::clone(child);

        // Child clocks must all be bound onto flat clocks.
        let mut child_clocks = Vec::with_capacity(child.clocks.len());
        for clock in &child.clocks {
            let bound = instance
                .clocks
                .iter()
                .find(|(name, _)| *name == clock.name)
                .map(|(_, id)| map_clock(*id))
                .ok_or_else(|| ElaborationError::InstanceBinding {
                    component: parent.name.clone(),
                    instance: instance.name.clone(),
                    port: clock.name.clone(),
                    reason: "clock is not bound".into(),
                })?;
            child_clocks.push(bound);
        }

        let child_prefix = if prefix.is_empty() {
            instance.name.clone()
        } else {
            format!("{prefix}.{}", instance.name)
        };
        let child_base = self.component(&child, child_prefix, Some(child_clocks))?;

        let remap_parent = |expr: &Expr| -> Expr {
            expr.map_signals(&mut |id| Expr::Signal(SignalId(parent_base + id.0)))
        };

        // Inputs: bound expression, or the declared default.
        for (index, signal) in child.signals.iter().enumerate() {
            let SignalKind::Input { default } = &signal.kind else {
                continue;
            };
            let flat_input = SignalId(child_base + index);
            let driver = instance
                .inputs
                .iter()
                .find(|(name, _)| *name == signal.name)
                .map(|(_, expr)| remap_parent(expr))
                .unwrap_or(Expr::Literal(*default));
            self.assignments.push(Assignment {
                lhs: flat_input,
                expr: driver,
            });
            self.from_instance.push(false);
        }
        for (name, _) in &instance.inputs {
            let bound = child
                .find_signal(name)
                .map(|id| child.signals[id.0].kind.is_input());
            if bound != Some(true) {
                return Err(ElaborationError::InstanceBinding {
                    component: parent.name.clone(),
                    instance: instance.name.clone(),
                    port: name.clone(),
                    reason: "child has no such input port".into(),
                });
            }
        }

        // Outputs: mirror the child output onto the bound parent wire.
        for (name, parent_signal) in &instance.outputs {
            let child_id = child.find_signal(name).ok_or_else(|| {
                ElaborationError::InstanceBinding {
                    component: parent.name.clone(),
                    instance: instance.name.clone(),
                    port: name.clone(),
                    reason: "child has no such output port".into(),
                }
            })?;
            if !child.signals[child_id.0].kind.is_output() {
                return Err(ElaborationError::InstanceBinding {
                    component: parent.name.clone(),
                    instance: instance.name.clone(),
                    port: name.clone(),
                    reason: "bound signal is not an output port".into(),
                });
            }
            self.assignments.push(Assignment {
                lhs: SignalId(parent_base + parent_signal.0),
                expr: Expr::Signal(SignalId(child_base + child_id.0)),
            });
            self.from_instance.push(true);
        }

        Ok(())
    }
}

/// Width of `expr` over a signal table, with let-bindings scoped through
/// `locals`. This is the one place expression shapes are validated.
pub(crate) fn expr_width(
    expr: &Expr,
    component: &str,
    signals: &[Signal],
    locals: &mut Vec<(String, Width)>,
) -> Result<Width> {
    match expr {
        Expr::Literal(value) => Ok(value.width()),
        Expr::Signal(id) => signals.get(id.0).map(|s| s.width).ok_or_else(|| {
            ElaborationError::UnresolvedSignal {
                component: component.to_owned(),
                name: format!("{id}"),
            }
        }),
        Expr::Local(name) => locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, w)| *w)
            .ok_or_else(|| ElaborationError::UnresolvedLocal {
                component: component.to_owned(),
                name: name.clone(),
            }),
        Expr::Slice { operand, high, low } => {
            let width = expr_width(operand, component, signals, locals)?;
            if low > high || *high >= width {
                return Err(ElaborationError::WidthMismatch {
                    component: component.to_owned(),
                    context: format!("slice [{high}:{low}] of a {width}-bit value"),
                    expected: width,
                    actual: high + 1,
                });
            }
            Ok(high - low + 1)
        }
        Expr::Concat(parts) => {
            if parts.is_empty() {
                return Err(ElaborationError::WidthMismatch {
                    component: component.to_owned(),
                    context: "empty concatenation".into(),
                    expected: 1,
                    actual: 0,
                });
            }
            let mut total = 0u32;
            for part in parts {
                total += expr_width(part, component, signals, locals)?;
            }
            if total > rhdl_bitvec::MAX_WIDTH {
                return Err(ElaborationError::Value {
                    component: component.to_owned(),
                    source: rhdl_bitvec::BitVecError::WidthOverflow(total),
                });
            }
            Ok(total)
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = expr_width(lhs, component, signals, locals)?;
            let right = expr_width(rhs, component, signals, locals)?;
            if left != right {
                return Err(ElaborationError::WidthMismatch {
                    component: component.to_owned(),
                    context: format!("operands of `{}`", op.symbol()),
                    expected: left,
                    actual: right,
                });
            }
            Ok(if op.is_comparison() { 1 } else { left })
        }
        Expr::Unary { op, operand } => {
            let width = expr_width(operand, component, signals, locals)?;
            Ok(if op.is_reduction() { 1 } else { width })
        }
        Expr::Mux { sel, then_, else_ } => {
            let sel_width = expr_width(sel, component, signals, locals)?;
            if sel_width != 1 {
                return Err(ElaborationError::WidthMismatch {
                    component: component.to_owned(),
                    context: "mux selector".into(),
                    expected: 1,
                    actual: sel_width,
                });
            }
            let then_width = expr_width(then_, component, signals, locals)?;
            let else_width = expr_width(else_, component, signals, locals)?;
            if then_width != else_width {
                return Err(ElaborationError::WidthMismatch {
                    component: component.to_owned(),
                    context: "mux arms".into(),
                    expected: then_width,
                    actual: else_width,
                });
            }
            Ok(then_width)
        }
        Expr::Case { sel, arms, default } => {
            let sel_width = expr_width(sel, component, signals, locals)?;
            let result = expr_width(default, component, signals, locals)?;
            for (index, (key, _)) in arms.iter().enumerate() {
                if arms[..index].iter().any(|(k, _)| k.value() == key.value()) {
                    return Err(ElaborationError::DuplicateCaseKey {
                        component: component.to_owned(),
                        key: key.to_string(),
                    });
                }
            }
            for (key, arm) in arms {
                if key.width() != sel_width {
                    return Err(ElaborationError::WidthMismatch {
                        component: component.to_owned(),
                        context: "case key".into(),
                        expected: sel_width,
                        actual: key.width(),
                    });
                }
                let arm_width = expr_width(arm, component, signals, locals)?;
                if arm_width != result {
                    return Err(ElaborationError::WidthMismatch {
                        component: component.to_owned(),
                        context: "case arm".into(),
                        expected: result,
                        actual: arm_width,
                    });
                }
            }
            Ok(result)
        }
        Expr::Let { name, value, body } => {
            let value_width = expr_width(value, component, signals, locals)?;
            locals.push((name.clone(), value_width));
            let result = expr_width(body, component, signals, locals);
            locals.pop();
            result
        }
    }
}
