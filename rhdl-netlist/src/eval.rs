//! Netlist evaluation under the behavioral cycle model.
//!
//! This exists so the equivalence laws can be tested: for any input
//! sequence, peeks at corresponding outputs of the netlist and of the
//! source design must match. It is an observer, not a fourth production
//! backend.

use rhdl_bir::ClockId;
use rhdl_bitvec::Word;

use crate::netlist::{GateKind, NetId, Netlist, CONST0, CONST1};

/// Cycle-accurate evaluator over a [`Netlist`].
pub struct NetlistSim {
    netlist: Netlist,
    values: Vec<bool>,
    /// Primitive memory storage, one bank per [`Netlist::memories`] entry.
    storage: Vec<Vec<Word>>,
    ticks: Vec<u64>,
}

impl NetlistSim {
    /// Take ownership of a netlist and initialize all state to reset
    /// values.
    pub fn new(netlist: Netlist) -> Self {
        let values = vec![false; netlist.net_count()];
        let storage = netlist
            .memories
            .iter()
            .map(|m| vec![0; m.depth])
            .collect();
        let ticks = vec![0; netlist.clocks.len()];
        let mut sim = Self {
            netlist,
            values,
            storage,
            ticks,
        };
        sim.reset();
        sim
    }

    /// The evaluated netlist.
    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    /// Restore flip-flops to their init bits, memories to zero, and tick
    /// counters to zero.
    pub fn reset(&mut self) {
        for dff in &self.netlist.dffs {
            self.values[dff.q.0] = dff.init;
        }
        for bank in &mut self.storage {
            bank.fill(0);
        }
        for port in self
            .netlist
            .memories
            .iter()
            .flat_map(|m| m.read_ports.iter())
        {
            if port.clock.is_some() {
                for &net in &port.data {
                    self.values[net.0] = false;
                }
            }
        }
        self.ticks.fill(0);
    }

    /// Drive an input port. Returns false if the port name is unknown.
    #[must_use]
    pub fn poke(&mut self, port: &str, value: Word) -> bool {
        let Some((_, bits)) = self.netlist.inputs.iter().find(|(name, _)| name == port)
        else {
            return false;
        };
        for (bit, &net) in bits.iter().enumerate() {
            self.values[net.0] = value >> bit & 1 == 1;
        }
        true
    }

    /// Settle and read an output port.
    pub fn peek(&mut self, port: &str) -> Option<Word> {
        self.settle();
        let (_, bits) = self.netlist.outputs.iter().find(|(name, _)| name == port)?;
        Some(assemble(&self.values, bits))
    }

    /// Advance the default clock one edge.
    pub fn tick(&mut self) {
        self.tick_clock(ClockId(0));
    }

    /// Advance a clock one edge: settle, sample flip-flop inputs and
    /// memory ports, then commit.
    pub fn tick_clock(&mut self, clock: ClockId) {
        self.settle();

        let mut next_q: Vec<(NetId, bool)> = Vec::new();
        for dff in &self.netlist.dffs {
            if dff.clock == clock {
                next_q.push((dff.q, self.values[dff.d.0]));
            }
        }

        // Memory primitives: sync reads sample pre-edge storage; writes
        // apply afterwards, last declared port winning a conflict.
        let mut read_commits: Vec<(Vec<NetId>, Word)> = Vec::new();
        let mut writes: Vec<(usize, Word, Word)> = Vec::new();
        for (index, memory) in self.netlist.memories.iter().enumerate() {
            for port in &memory.read_ports {
                if port.clock == Some(clock) {
                    let addr = assemble(&self.values, &port.addr);
                    let data = cell_at(&self.storage[index], addr);
                    read_commits.push((port.data.clone(), data));
                }
            }
            for port in &memory.write_ports {
                if port.clock == clock && self.values[port.enable.0] {
                    let addr = assemble(&self.values, &port.addr);
                    let data = assemble(&self.values, &port.data);
                    writes.push((index, addr, data));
                }
            }
        }

        for (q, value) in next_q {
            self.values[q.0] = value;
        }
        for (bits, data) in read_commits {
            for (bit, net) in bits.iter().enumerate() {
                self.values[net.0] = data >> bit & 1 == 1;
            }
        }
        for (index, addr, data) in writes {
            let slot = usize::try_from(addr)
                .ok()
                .and_then(|a| self.storage[index].get_mut(a));
            if let Some(cell) = slot {
                *cell = data;
            }
        }

        self.ticks[clock.0] += 1;
        self.settle();
    }

    /// Ticks of the default clock.
    pub fn tick_count(&self) -> u64 {
        self.ticks.first().copied().unwrap_or(0)
    }

    /// Run gates to a fixed point, re-applying asynchronous resets and
    /// asynchronous memory reads between sweeps. The netlist is acyclic,
    /// so this converges in a handful of sweeps.
    fn settle(&mut self) {
        self.values[CONST0.0] = false;
        self.values[CONST1.0] = true;
        for _ in 0..64 {
            let mut changed = false;
            for gate in &self.netlist.gates {
                let out = match gate.kind {
                    GateKind::Buf => self.values[gate.inputs[0].0],
                    GateKind::Not => !self.values[gate.inputs[0].0],
                    kind => {
                        let a = self.values[gate.inputs[0].0];
                        let b = self.values[gate.inputs[1].0];
                        match kind {
                            GateKind::And => a & b,
                            GateKind::Or => a | b,
                            GateKind::Xor => a ^ b,
                            GateKind::Nand => !(a & b),
                            GateKind::Nor => !(a | b),
                            GateKind::Xnor => !(a ^ b),
                            GateKind::Not | GateKind::Buf => unreachable!(),
                        }
                    }
                };
                if self.values[gate.output.0] != out {
                    self.values[gate.output.0] = out;
                    changed = true;
                }
            }
            for dff in &self.netlist.dffs {
                let Some(reset) = dff.reset else { continue };
                let asserted = self.values[reset.net.0] == reset.active_high;
                if asserted && self.values[dff.q.0] != reset.value {
                    self.values[dff.q.0] = reset.value;
                    changed = true;
                }
            }
            for (index, memory) in self.netlist.memories.iter().enumerate() {
                for port in &memory.read_ports {
                    if port.clock.is_some() {
                        continue;
                    }
                    let addr = assemble(&self.values, &port.addr);
                    let data = cell_at(&self.storage[index], addr);
                    for (bit, net) in port.data.iter().enumerate() {
                        let value = data >> bit & 1 == 1;
                        if self.values[net.0] != value {
                            self.values[net.0] = value;
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }
}

fn assemble(values: &[bool], bits: &[NetId]) -> Word {
    bits.iter()
        .enumerate()
        .fold(0, |acc, (bit, net)| acc | (values[net.0] as Word) << bit)
}

/// Out-of-range addresses read as zero, per the primitive's documented
/// timing contract.
fn cell_at(bank: &[Word], addr: Word) -> Word {
    usize::try_from(addr)
        .ok()
        .and_then(|a| bank.get(a))
        .copied()
        .unwrap_or(0)
}
