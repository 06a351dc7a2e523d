//! Lowering of elaborated behavioral designs to gates and flip-flops.
//!
//! Every expression kind reduces systematically: bitwise operators become
//! per-bit gates, arithmetic becomes ripple chains, comparisons become
//! subtractor borrows with reductions, muxes become AND/OR pairs per bit,
//! case selects become decoders feeding an OR tree, and dynamic shifts
//! become mux stages. Registers become D flip-flops; small memories
//! flatten into flip-flop banks with address decoders, large or
//! multi-clock memories stay opaque primitives with decoded port wiring.

use itertools::Itertools;
use rhdl_bir::{
    BinaryOp, CombOp, Design, Expr, ReadMode, ResetKind, ResetPolarity, SignalKind, UnaryOp,
};
use rhdl_bitvec::Word;
use tracing::debug;

use crate::netlist::{
    AsyncResetBit, Dff, Gate, GateKind, MemReadPort, MemWritePort, MemoryPrimitive, NetId,
    Netlist, CONST0, CONST1,
};

/// Lowering configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerParams {
    /// Memories of at most this many total bits flatten into flip-flops;
    /// larger ones are kept as opaque primitives.
    pub max_flattened_memory_bits: usize,
}

impl Default for LowerParams {
    fn default() -> Self {
        Self {
            max_flattened_memory_bits: 4096,
        }
    }
}

/// Lower a design into a netlist. The result is behaviorally equivalent to
/// the source under the same cycle model; run
/// [`fold_constants`](crate::fold_constants) afterwards to reduce it.
pub fn lower(design: &Design, params: &LowerParams) -> Netlist {
    let mut lowerer = Lowerer::new(design, params);
    lowerer.run();
    let netlist = lowerer.netlist;
    debug!(
        design = %design.name(),
        gates = netlist.gates.len(),
        dffs = netlist.dffs.len(),
        nets = netlist.net_count(),
        "lowered"
    );
    netlist
}

struct Lowerer<'d> {
    design: &'d Design,
    netlist: Netlist,
    /// Per-signal bit nets, LSB first. Filled as drivers are lowered.
    bits: Vec<Vec<NetId>>,
    /// Flattened memory cells: `cells[mem][addr]` is the per-bit q nets.
    cells: Vec<Vec<Vec<NetId>>>,
    is_primitive: Vec<bool>,
}

impl<'d> Lowerer<'d> {
    fn new(design: &'d Design, params: &LowerParams) -> Self {
        let netlist = Netlist::new(
            design.name().to_owned(),
            design.clocks().iter().map(|c| c.name.clone()).collect(),
        );
        let is_primitive = design
            .memories()
            .iter()
            .map(|memory| {
                let bits = memory.depth * memory.width as usize;
                let clocks: Vec<_> = memory
                    .write_ports
                    .iter()
                    .map(|p| p.clock)
                    .unique()
                    .collect();
                bits > params.max_flattened_memory_bits || clocks.len() > 1
            })
            .collect();
        Self {
            design,
            netlist,
            bits: vec![Vec::new(); design.signals().len()],
            cells: Vec::new(),
            is_primitive,
        }
    }

    fn run(&mut self) {
        self.allocate_ports_and_storage();
        self.lower_combinational();
        self.lower_sequential();
        self.lower_memories();
    }

    /// Ports and every storage bit get their nets first, so combinational
    /// lowering can reference registers and memory cells freely.
    fn allocate_ports_and_storage(&mut self) {
        for (index, signal) in self.design.signals().iter().enumerate() {
            match &signal.kind {
                SignalKind::Input { .. } => {
                    let bits = self.named_bits(&signal.name, signal.width);
                    self.netlist.inputs.push((signal.name.clone(), bits.clone()));
                    self.bits[index] = bits;
                }
                SignalKind::Register { .. } => {
                    self.bits[index] = self.named_bits(&signal.name, signal.width);
                }
                SignalKind::Output | SignalKind::Wire => {}
            }
        }
        // Synchronous read data wires are storage; async data on opaque
        // memories needs stable nets for the primitive to drive.
        for (mem_index, memory) in self.design.memories().iter().enumerate() {
            for port in &memory.read_ports {
                let data = &self.design.signals()[port.data.0];
                if port.mode == ReadMode::Synchronous || self.is_primitive[mem_index] {
                    self.bits[port.data.0] = self.named_bits(&data.name, data.width);
                }
            }
        }
        // Flip-flop banks for flattened memories.
        for (mem_index, memory) in self.design.memories().iter().enumerate() {
            if self.is_primitive[mem_index] {
                self.cells.push(Vec::new());
                continue;
            }
            if memory.write_ports.is_empty() {
                // Never written: every cell holds its reset value.
                self.cells.push(
                    (0..memory.depth)
                        .map(|_| vec![CONST0; memory.width as usize])
                        .collect(),
                );
                continue;
            }
            let bank = (0..memory.depth)
                .map(|addr| {
                    (0..memory.width)
                        .map(|bit| {
                            self.netlist.fresh_net(Some(format!(
                                "{}_{addr}_{bit}",
                                memory.name
                            )))
                        })
                        .collect()
                })
                .collect();
            self.cells.push(bank);
        }
    }

    fn lower_combinational(&mut self) {
        for op in self.design.comb_order() {
            match *op {
                CombOp::Assign(index) => {
                    let assignment = &self.design.assignments()[index];
                    let mut env = Vec::new();
                    let bits = self.expr(&assignment.expr, &mut env);
                    let signal = &self.design.signals()[assignment.lhs.0];
                    if signal.kind.is_output() {
                        // Outputs get named nets behind buffers.
                        let named = self.named_bits(&signal.name, signal.width);
                        for (src, dst) in bits.iter().zip(&named) {
                            self.netlist.gates.push(Gate {
                                kind: GateKind::Buf,
                                inputs: vec![*src],
                                output: *dst,
                            });
                        }
                        self.netlist
                            .outputs
                            .push((signal.name.clone(), named.clone()));
                        self.bits[assignment.lhs.0] = named;
                    } else {
                        self.bits[assignment.lhs.0] = bits;
                    }
                }
                CombOp::MemRead { memory, port } => {
                    let read = &self.design.memories()[memory.0].read_ports[port];
                    let mut env = Vec::new();
                    let addr = self.expr(&read.addr, &mut env);
                    if self.is_primitive[memory.0] {
                        // Data nets exist; the primitive port records the
                        // decoded address.
                        let data = self.bits[read.data.0].clone();
                        let slot = self.primitive_slot(memory.0);
                        self.netlist.memories[slot].read_ports.push(MemReadPort {
                            addr,
                            data,
                            clock: None,
                        });
                    } else {
                        let width = self.design.memories()[memory.0].width;
                        let bits = self.read_mux(memory.0, &addr, width);
                        self.bits[read.data.0] = bits;
                    }
                }
            }
        }
    }

    fn lower_sequential(&mut self) {
        for register in self.design.registers() {
            let signal = &self.design.signals()[register.signal.0];
            let SignalKind::Register { reset, .. } = &signal.kind else {
                continue;
            };
            let q = self.bits[register.signal.0].clone();

            let rule = self
                .design
                .processes()
                .iter()
                .filter(|p| p.clock == register.clock)
                .flat_map(|p| &p.rules)
                .find(|r| r.lhs == register.signal);
            let mut d = match rule {
                Some(rule) => {
                    let mut env = Vec::new();
                    self.expr(&rule.expr, &mut env)
                }
                None => q.clone(),
            };

            let mut async_reset = None;
            if let Some(spec) = register.reset_spec {
                let raw = self.bits[spec.signal.0][0];
                match spec.kind {
                    ResetKind::Synchronous => {
                        let assert = match spec.polarity {
                            ResetPolarity::ActiveHigh => raw,
                            ResetPolarity::ActiveLow => self.gate1(GateKind::Not, raw),
                        };
                        let reset_bits = self.const_bits(reset.value(), signal.width);
                        d = self.mux_bits(assert, &reset_bits, &d);
                    }
                    ResetKind::Asynchronous => {
                        async_reset = Some((raw, spec.polarity == ResetPolarity::ActiveHigh));
                    }
                }
            }

            for (bit, (&d, &q)) in d.iter().zip(&q).enumerate() {
                let init = reset.value() >> bit & 1 == 1;
                self.netlist.dffs.push(Dff {
                    d,
                    q,
                    clock: register.clock,
                    init,
                    reset: async_reset.map(|(net, active_high)| AsyncResetBit {
                        net,
                        active_high,
                        value: init,
                    }),
                });
            }
        }
    }

    fn lower_memories(&mut self) {
        // Async read ports on primitives were recorded during the
        // combinational pass; the rest of the port wiring lands here.
        for (mem_index, memory) in self.design.memories().iter().enumerate() {
            if self.is_primitive[mem_index] {
                for port in &memory.read_ports {
                    if port.mode != ReadMode::Synchronous {
                        continue;
                    }
                    let mut env = Vec::new();
                    let addr = self.expr(&port.addr, &mut env);
                    let data = self.bits[port.data.0].clone();
                    let slot = self.primitive_slot(mem_index);
                    self.netlist.memories[slot].read_ports.push(MemReadPort {
                        addr,
                        data,
                        clock: port.clock,
                    });
                }
                for port in &memory.write_ports {
                    let mut env = Vec::new();
                    let addr = self.expr(&port.addr, &mut env);
                    let data = self.expr(&port.data, &mut env);
                    let enable = self.expr(&port.enable, &mut env)[0];
                    let slot = self.primitive_slot(mem_index);
                    self.netlist.memories[slot].write_ports.push(MemWritePort {
                        addr,
                        data,
                        enable,
                        clock: port.clock,
                    });
                }
                continue;
            }
            if memory.write_ports.is_empty() {
                // Never written: async reads already see constant zeros;
                // synchronous data flops hold zero.
                for port in &memory.read_ports {
                    if port.mode == ReadMode::Synchronous {
                        let q = self.bits[port.data.0].clone();
                        for &q in &q {
                            self.netlist.dffs.push(Dff {
                                d: CONST0,
                                q,
                                clock: port.clock.expect("checked at elaboration"),
                                init: false,
                                reset: None,
                            });
                        }
                    }
                }
                continue;
            }

            let clock = memory.write_ports[0].clock;

            // Per-cell next-state networks: start from hold, then each
            // write port in declaration order muxes itself in front, so
            // the last declared port wins a same-edge conflict.
            let mut cell_d: Vec<Vec<NetId>> = self.cells[mem_index].clone();
            for port in &memory.write_ports {
                let mut env = Vec::new();
                let addr = self.expr(&port.addr, &mut env);
                let data = self.expr(&port.data, &mut env);
                let enable = self.expr(&port.enable, &mut env)[0];
                for cell in 0..memory.depth {
                    let selected = self.eq_const(&addr, cell as Word);
                    let write_here = self.gate2(GateKind::And, enable, selected);
                    cell_d[cell] = self.mux_bits(write_here, &data, &cell_d[cell]);
                }
            }
            for cell in 0..memory.depth {
                for bit in 0..memory.width as usize {
                    self.netlist.dffs.push(Dff {
                        d: cell_d[cell][bit],
                        q: self.cells[mem_index][cell][bit],
                        clock,
                        init: false,
                        reset: None,
                    });
                }
            }

            // Synchronous read ports: a register bank on the read clock
            // samples the pre-edge mux over cell outputs.
            for port in &memory.read_ports {
                if port.mode != ReadMode::Synchronous {
                    continue;
                }
                let mut env = Vec::new();
                let addr = self.expr(&port.addr, &mut env);
                let mux = self.read_mux(mem_index, &addr, memory.width);
                let q = self.bits[port.data.0].clone();
                for (&d, &q) in mux.iter().zip(&q) {
                    self.netlist.dffs.push(Dff {
                        d,
                        q,
                        clock: port.clock.expect("checked at elaboration"),
                        init: false,
                        reset: None,
                    });
                }
            }
        }
    }

    /// Address-decoded OR tree over the cells of a flattened memory.
    fn read_mux(&mut self, mem_index: usize, addr: &[NetId], width: u32) -> Vec<NetId> {
        let depth = self.cells[mem_index].len();
        let mut terms: Vec<Vec<NetId>> = Vec::with_capacity(depth);
        for cell in 0..depth {
            let selected = self.eq_const(addr, cell as Word);
            let term = (0..width as usize)
                .map(|bit| {
                    let q = self.cells[mem_index][cell][bit];
                    self.gate2(GateKind::And, selected, q)
                })
                .collect();
            terms.push(term);
        }
        (0..width as usize)
            .map(|bit| self.or_tree(terms.iter().map(|t| t[bit]).collect()))
            .collect()
    }

    /// Index of the primitive record for a memory, creating it on first
    /// use.
    fn primitive_slot(&mut self, mem_index: usize) -> usize {
        let memory = &self.design.memories()[mem_index];
        if let Some(pos) = self
            .netlist
            .memories
            .iter()
            .position(|m| m.name == memory.name)
        {
            return pos;
        }
        self.netlist.memories.push(MemoryPrimitive {
            name: memory.name.clone(),
            depth: memory.depth,
            width: memory.width,
            read_ports: Vec::new(),
            write_ports: Vec::new(),
        });
        self.netlist.memories.len() - 1
    }

    /// Lower an expression to its bit nets, LSB first.
    fn expr(&mut self, expr: &Expr, env: &mut Vec<(String, Vec<NetId>)>) -> Vec<NetId> {
        match expr {
            Expr::Literal(value) => self.const_bits(value.value(), value.width()),
            Expr::Signal(id) => self.bits[id.0].clone(),
            Expr::Local(name) => env
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, bits)| bits.clone())
                .unwrap_or_else(|| unreachable!("unbound local `{name}`")),
            Expr::Slice { operand, high, low } => {
                let bits = self.expr(operand, env);
                bits[*low as usize..=*high as usize].to_vec()
            }
            Expr::Concat(parts) => {
                let lowered: Vec<Vec<NetId>> =
                    parts.iter().map(|p| self.expr(p, env)).collect();
                let mut bits = Vec::new();
                for part in lowered.into_iter().rev() {
                    bits.extend(part);
                }
                bits
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.expr(lhs, env);
                let b = self.expr(rhs, env);
                self.binary(*op, &a, &b)
            }
            Expr::Unary { op, operand } => {
                let a = self.expr(operand, env);
                match op {
                    UnaryOp::Not => a.iter().map(|&n| self.gate1(GateKind::Not, n)).collect(),
                    UnaryOp::Neg => {
                        let inverted: Vec<NetId> =
                            a.iter().map(|&n| self.gate1(GateKind::Not, n)).collect();
                        let zeros = vec![CONST0; a.len()];
                        self.ripple(&inverted, &zeros, CONST1).0
                    }
                    UnaryOp::ReduceAnd => vec![self.and_tree(a)],
                    UnaryOp::ReduceOr => vec![self.or_tree(a)],
                    UnaryOp::ReduceXor => vec![self.xor_tree(a)],
                }
            }
            Expr::Mux { sel, then_, else_ } => {
                let sel = self.expr(sel, env)[0];
                let t = self.expr(then_, env);
                let e = self.expr(else_, env);
                self.mux_bits(sel, &t, &e)
            }
            Expr::Case { sel, arms, default } => {
                let sel = self.expr(sel, env);
                let matches: Vec<NetId> = arms
                    .iter()
                    .map(|(key, _)| self.eq_const(&sel, key.value()))
                    .collect();
                let lowered: Vec<Vec<NetId>> =
                    arms.iter().map(|(_, arm)| self.expr(arm, env)).collect();
                let default_bits = self.expr(default, env);
                let any_match = self.or_tree(matches.clone());
                let no_match = self.gate1(GateKind::Not, any_match);
                (0..default_bits.len())
                    .map(|bit| {
                        let mut terms: Vec<NetId> = matches
                            .iter()
                            .zip(&lowered)
                            .map(|(&m, arm)| self.gate2(GateKind::And, m, arm[bit]))
                            .collect();
                        terms.push(self.gate2(GateKind::And, no_match, default_bits[bit]));
                        self.or_tree(terms)
                    })
                    .collect()
            }
            Expr::Let { name, value, body } => {
                let bits = self.expr(value, env);
                env.push((name.clone(), bits));
                let result = self.expr(body, env);
                env.pop();
                result
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, a: &[NetId], b: &[NetId]) -> Vec<NetId> {
        match op {
            BinaryOp::And => self.zip2(GateKind::And, a, b),
            BinaryOp::Or => self.zip2(GateKind::Or, a, b),
            BinaryOp::Xor => self.zip2(GateKind::Xor, a, b),
            BinaryOp::Add => self.ripple(a, b, CONST0).0,
            BinaryOp::Sub => {
                let inverted: Vec<NetId> =
                    b.iter().map(|&n| self.gate1(GateKind::Not, n)).collect();
                self.ripple(a, &inverted, CONST1).0
            }
            BinaryOp::Eq => {
                let eq_bits = self.zip2(GateKind::Xnor, a, b);
                vec![self.and_tree(eq_bits)]
            }
            BinaryOp::Ne => {
                let eq_bits = self.zip2(GateKind::Xnor, a, b);
                let all = self.and_tree(eq_bits);
                vec![self.gate1(GateKind::Not, all)]
            }
            BinaryOp::Lt => vec![self.less_than(a, b)],
            BinaryOp::Gt => vec![self.less_than(b, a)],
            BinaryOp::Le => {
                let gt = self.less_than(b, a);
                vec![self.gate1(GateKind::Not, gt)]
            }
            BinaryOp::Ge => {
                let lt = self.less_than(a, b);
                vec![self.gate1(GateKind::Not, lt)]
            }
            BinaryOp::Shl => self.barrel(a, b, true),
            BinaryOp::Shr => self.barrel(a, b, false),
        }
    }

    /// Borrow of `a - b`: the inverted carry out of `a + !b + 1`.
    fn less_than(&mut self, a: &[NetId], b: &[NetId]) -> NetId {
        let inverted: Vec<NetId> = b.iter().map(|&n| self.gate1(GateKind::Not, n)).collect();
        let (_, carry) = self.ripple(a, &inverted, CONST1);
        self.gate1(GateKind::Not, carry)
    }

    /// Ripple carry adder; returns sum bits and the carry out.
    fn ripple(&mut self, a: &[NetId], b: &[NetId], carry_in: NetId) -> (Vec<NetId>, NetId) {
        let mut carry = carry_in;
        let mut sum = Vec::with_capacity(a.len());
        for (&a, &b) in a.iter().zip(b) {
            let half = self.gate2(GateKind::Xor, a, b);
            sum.push(self.gate2(GateKind::Xor, half, carry));
            let direct = self.gate2(GateKind::And, a, b);
            let propagated = self.gate2(GateKind::And, half, carry);
            carry = self.gate2(GateKind::Or, direct, propagated);
        }
        (sum, carry)
    }

    /// Mux-stage shifter; `left` picks the direction. Amounts at or past
    /// the width produce zero.
    fn barrel(&mut self, a: &[NetId], amount: &[NetId], left: bool) -> Vec<NetId> {
        let width = a.len();
        let mut current = a.to_vec();
        let mut overflow_bits = Vec::new();
        for (k, &amount_bit) in amount.iter().enumerate() {
            if k >= usize::BITS as usize || 1usize << k >= width {
                overflow_bits.push(amount_bit);
                continue;
            }
            let step = 1usize << k;
            let shifted: Vec<NetId> = (0..width)
                .map(|bit| {
                    if left {
                        if bit >= step {
                            current[bit - step]
                        } else {
                            CONST0
                        }
                    } else if bit + step < width {
                        current[bit + step]
                    } else {
                        CONST0
                    }
                })
                .collect();
            current = self.mux_bits(amount_bit, &shifted, &current);
        }
        if !overflow_bits.is_empty() {
            let overflow = self.or_tree(overflow_bits);
            let zeros = vec![CONST0; width];
            current = self.mux_bits(overflow, &zeros, &current);
        }
        current
    }

    fn zip2(&mut self, kind: GateKind, a: &[NetId], b: &[NetId]) -> Vec<NetId> {
        a.iter()
            .zip(b)
            .map(|(&a, &b)| self.gate2(kind, a, b))
            .collect()
    }

    fn mux_bits(&mut self, sel: NetId, then_: &[NetId], else_: &[NetId]) -> Vec<NetId> {
        let not_sel = self.gate1(GateKind::Not, sel);
        then_
            .iter()
            .zip(else_)
            .map(|(&t, &e)| {
                let take_then = self.gate2(GateKind::And, sel, t);
                let take_else = self.gate2(GateKind::And, not_sel, e);
                self.gate2(GateKind::Or, take_then, take_else)
            })
            .collect()
    }

    fn eq_const(&mut self, bits: &[NetId], value: Word) -> NetId {
        // A value that does not fit the compared bits can never match.
        if bits.len() < Word::BITS as usize && value >> bits.len() != 0 {
            return CONST0;
        }
        let terms: Vec<NetId> = bits
            .iter()
            .enumerate()
            .map(|(bit, &net)| {
                if value >> bit & 1 == 1 {
                    net
                } else {
                    self.gate1(GateKind::Not, net)
                }
            })
            .collect();
        self.and_tree(terms)
    }

    fn const_bits(&mut self, value: Word, width: u32) -> Vec<NetId> {
        (0..width)
            .map(|bit| if value >> bit & 1 == 1 { CONST1 } else { CONST0 })
            .collect()
    }

    fn named_bits(&mut self, name: &str, width: u32) -> Vec<NetId> {
        (0..width)
            .map(|bit| {
                let net_name = if width == 1 {
                    name.to_owned()
                } else {
                    format!("{name}_{bit}")
                };
                self.netlist.fresh_net(Some(net_name))
            })
            .collect()
    }

    fn and_tree(&mut self, bits: Vec<NetId>) -> NetId {
        self.tree(GateKind::And, bits, CONST1)
    }

    fn or_tree(&mut self, bits: Vec<NetId>) -> NetId {
        self.tree(GateKind::Or, bits, CONST0)
    }

    fn xor_tree(&mut self, bits: Vec<NetId>) -> NetId {
        self.tree(GateKind::Xor, bits, CONST0)
    }

    fn tree(&mut self, kind: GateKind, mut bits: Vec<NetId>, empty: NetId) -> NetId {
        match bits.len() {
            0 => empty,
            1 => bits[0],
            _ => {
                while bits.len() > 1 {
                    let mut next = Vec::with_capacity(bits.len().div_ceil(2));
                    for pair in bits.chunks(2) {
                        next.push(if pair.len() == 2 {
                            self.gate2(kind, pair[0], pair[1])
                        } else {
                            pair[0]
                        });
                    }
                    bits = next;
                }
                bits[0]
            }
        }
    }

    fn gate1(&mut self, kind: GateKind, input: NetId) -> NetId {
        let output = self.netlist.fresh_net(None);
        self.netlist.gates.push(Gate {
            kind,
            inputs: vec![input],
            output,
        });
        output
    }

    fn gate2(&mut self, kind: GateKind, a: NetId, b: NetId) -> NetId {
        let output = self.netlist.fresh_net(None);
        self.netlist.gates.push(Gate {
            kind,
            inputs: vec![a, b],
            output,
        });
        output
    }
}
