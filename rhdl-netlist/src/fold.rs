//! Post-lowering constant folding.
//!
//! Nets proven constant collapse onto the shared constant nets, gates with
//! constant inputs reduce or disappear, buffers alias through, and gates
//! whose outputs nothing consumes are swept. Nets that carry a port name
//! keep their driving gate so the interface stays intact.

use hashbrown::HashSet;

use crate::netlist::{Gate, GateKind, NetId, Netlist, CONST0, CONST1};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repl {
    Keep,
    Alias(NetId),
}

/// Fold constants and sweep dead gates in place.
pub fn fold_constants(netlist: &mut Netlist) {
    let mut repl = vec![Repl::Keep; netlist.net_count()];

    let mut protected: HashSet<NetId> = HashSet::new();
    for (_, bits) in &netlist.outputs {
        protected.extend(bits.iter().copied());
    }

    let resolve = |repl: &[Repl], mut net: NetId| -> NetId {
        // Alias chains always point at earlier nets; a few hops at most.
        loop {
            match repl[net.0] {
                Repl::Keep => return net,
                Repl::Alias(target) => net = target,
            }
        }
    };
    let const_of = |net: NetId| -> Option<bool> {
        match net {
            CONST0 => Some(false),
            CONST1 => Some(true),
            _ => None,
        }
    };

    let mut kept: Vec<Gate> = Vec::with_capacity(netlist.gates.len());
    for gate in netlist.gates.drain(..) {
        let inputs: Vec<NetId> = gate
            .inputs
            .iter()
            .map(|&net| resolve(&repl, net))
            .collect();
        let output = gate.output;
        let is_protected = protected.contains(&output);

        let reduced = reduce(gate.kind, &inputs, &const_of);
        match reduced {
            Reduced::Const(value) => {
                let target = if value { CONST1 } else { CONST0 };
                if is_protected {
                    kept.push(Gate {
                        kind: GateKind::Buf,
                        inputs: vec![target],
                        output,
                    });
                } else {
                    repl[output.0] = Repl::Alias(target);
                }
            }
            Reduced::Wire(net) => {
                if is_protected {
                    kept.push(Gate {
                        kind: GateKind::Buf,
                        inputs: vec![net],
                        output,
                    });
                } else {
                    repl[output.0] = Repl::Alias(net);
                }
            }
            Reduced::Invert(net) => kept.push(Gate {
                kind: GateKind::Not,
                inputs: vec![net],
                output,
            }),
            Reduced::Unchanged => kept.push(Gate {
                kind: gate.kind,
                inputs,
                output,
            }),
        }
    }
    netlist.gates = kept;

    // Rewrite every remaining consumer through the alias map.
    for dff in &mut netlist.dffs {
        dff.d = resolve(&repl, dff.d);
        if let Some(reset) = &mut dff.reset {
            reset.net = resolve(&repl, reset.net);
        }
    }
    for memory in &mut netlist.memories {
        for port in &mut memory.read_ports {
            for net in &mut port.addr {
                *net = resolve(&repl, *net);
            }
        }
        for port in &mut memory.write_ports {
            for net in &mut port.addr {
                *net = resolve(&repl, *net);
            }
            for net in &mut port.data {
                *net = resolve(&repl, *net);
            }
            port.enable = resolve(&repl, port.enable);
        }
    }
    for (_, bits) in &mut netlist.outputs {
        for net in bits {
            *net = resolve(&repl, *net);
        }
    }

    sweep_dead_gates(netlist);
}

enum Reduced {
    Const(bool),
    Wire(NetId),
    Invert(NetId),
    Unchanged,
}

fn reduce(
    kind: GateKind,
    inputs: &[NetId],
    const_of: &impl Fn(NetId) -> Option<bool>,
) -> Reduced {
    match kind {
        GateKind::Buf => match const_of(inputs[0]) {
            Some(v) => Reduced::Const(v),
            None => Reduced::Wire(inputs[0]),
        },
        GateKind::Not => match const_of(inputs[0]) {
            Some(v) => Reduced::Const(!v),
            None => Reduced::Unchanged,
        },
        _ => {
            let (a, b) = (inputs[0], inputs[1]);
            let (ka, kb) = (const_of(a), const_of(b));
            match (kind, ka, kb) {
                (_, Some(a), Some(b)) => Reduced::Const(eval2(kind, a, b)),

                (GateKind::And, Some(false), _) | (GateKind::And, _, Some(false)) => {
                    Reduced::Const(false)
                }
                (GateKind::And, Some(true), None) => Reduced::Wire(b),
                (GateKind::And, None, Some(true)) => Reduced::Wire(a),

                (GateKind::Or, Some(true), _) | (GateKind::Or, _, Some(true)) => {
                    Reduced::Const(true)
                }
                (GateKind::Or, Some(false), None) => Reduced::Wire(b),
                (GateKind::Or, None, Some(false)) => Reduced::Wire(a),

                (GateKind::Xor, Some(false), None) => Reduced::Wire(b),
                (GateKind::Xor, None, Some(false)) => Reduced::Wire(a),
                (GateKind::Xor, Some(true), None) => Reduced::Invert(b),
                (GateKind::Xor, None, Some(true)) => Reduced::Invert(a),

                (GateKind::Nand, Some(false), _) | (GateKind::Nand, _, Some(false)) => {
                    Reduced::Const(true)
                }
                (GateKind::Nand, Some(true), None) => Reduced::Invert(b),
                (GateKind::Nand, None, Some(true)) => Reduced::Invert(a),

                (GateKind::Nor, Some(true), _) | (GateKind::Nor, _, Some(true)) => {
                    Reduced::Const(false)
                }
                (GateKind::Nor, Some(false), None) => Reduced::Invert(b),
                (GateKind::Nor, None, Some(false)) => Reduced::Invert(a),

                (GateKind::Xnor, Some(true), None) => Reduced::Wire(b),
                (GateKind::Xnor, None, Some(true)) => Reduced::Wire(a),
                (GateKind::Xnor, Some(false), None) => Reduced::Invert(b),
                (GateKind::Xnor, None, Some(false)) => Reduced::Invert(a),

                (GateKind::And, None, None) if a == b => Reduced::Wire(a),
                (GateKind::Or, None, None) if a == b => Reduced::Wire(a),
                (GateKind::Xor, None, None) if a == b => Reduced::Const(false),
                (GateKind::Xnor, None, None) if a == b => Reduced::Const(true),

                _ => Reduced::Unchanged,
            }
        }
    }
}

fn eval2(kind: GateKind, a: bool, b: bool) -> bool {
    match kind {
        GateKind::And => a & b,
        GateKind::Or => a | b,
        GateKind::Xor => a ^ b,
        GateKind::Nand => !(a & b),
        GateKind::Nor => !(a | b),
        GateKind::Xnor => !(a ^ b),
        GateKind::Not | GateKind::Buf => unreachable!("unary kinds handled earlier"),
    }
}

/// Drop gates whose outputs feed nothing: no output port, flip-flop,
/// memory port, or surviving gate.
fn sweep_dead_gates(netlist: &mut Netlist) {
    let mut used: HashSet<NetId> = HashSet::new();
    for (_, bits) in &netlist.outputs {
        used.extend(bits.iter().copied());
    }
    for dff in &netlist.dffs {
        used.insert(dff.d);
        if let Some(reset) = dff.reset {
            used.insert(reset.net);
        }
    }
    for memory in &netlist.memories {
        for port in &memory.read_ports {
            used.extend(port.addr.iter().copied());
        }
        for port in &memory.write_ports {
            used.extend(port.addr.iter().copied());
            used.extend(port.data.iter().copied());
            used.insert(port.enable);
        }
    }

    // Gates are in topological order; a reverse scan propagates liveness.
    let mut keep = vec![false; netlist.gates.len()];
    for (index, gate) in netlist.gates.iter().enumerate().rev() {
        if used.contains(&gate.output) {
            keep[index] = true;
            used.extend(gate.inputs.iter().copied());
        }
    }
    let mut index = 0;
    netlist.gates.retain(|_| {
        let kept = keep[index];
        index += 1;
        kept
    });
}
