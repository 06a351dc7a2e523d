//! JSON wire format for designs.
//!
//! This is the format the simulator front-ends and external tools agree on:
//! a top component with `ports`, `nets`, `regs`, `memories`, `assignments`,
//! `processes`, and `instances`, plus the definitions of any instantiated
//! child components. Loading resolves names back to arena ids and reports
//! structural problems as [`ElaborationError`]s.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use itertools::Itertools;
use rhdl_bitvec::BitVec;
use serde::{Deserialize, Serialize};

use crate::component::{
    Assignment, Clock, ClockId, Component, ComponentProcess, Instance, Memory, ReadMode,
    ReadPort, Registry, ResetKind, ResetPolarity, ResetSpec, SeqRule, Signal, SignalId,
    SignalKind, WritePort,
};
use crate::error::ElaborationError;
use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::Result;

#[derive(Debug, Serialize, Deserialize)]
struct IrFile {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    clocks: Vec<String>,
    ports: Vec<IrPort>,
    nets: Vec<IrNet>,
    regs: Vec<IrReg>,
    memories: Vec<IrMemory>,
    assignments: Vec<IrAssignment>,
    processes: Vec<IrProcess>,
    instances: Vec<IrInstance>,
    /// Definitions of instantiated components, by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<IrFileComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrFileComponent {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    clocks: Vec<String>,
    ports: Vec<IrPort>,
    nets: Vec<IrNet>,
    regs: Vec<IrReg>,
    memories: Vec<IrMemory>,
    assignments: Vec<IrAssignment>,
    processes: Vec<IrProcess>,
    instances: Vec<IrInstance>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrPort {
    name: String,
    width: u32,
    direction: IrDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<u128>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum IrDirection {
    Input,
    Output,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrNet {
    name: String,
    width: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrReg {
    name: String,
    width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reset: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reset_signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reset_polarity: Option<IrResetPolarity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reset_kind: Option<IrResetKind>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum IrResetPolarity {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum IrResetKind {
    Sync,
    Async,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrMemory {
    name: String,
    depth: usize,
    width: u32,
    ports: Vec<IrMemoryPort>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum IrMemoryPort {
    Read {
        mode: IrReadMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clock: Option<String>,
        addr: IrExpr,
        /// Net the port drives.
        target: String,
    },
    Write {
        clock: String,
        addr: IrExpr,
        data: IrExpr,
        enable: IrExpr,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum IrReadMode {
    Sync,
    Async,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrAssignment {
    lhs: String,
    expr: IrExpr,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrProcess {
    clock: String,
    rules: Vec<IrRule>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrRule {
    lhs: String,
    expr: IrExpr,
    /// Alternative spelling for the register's reset value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reset: Option<u128>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrInstance {
    name: String,
    component: String,
    /// Ordered map keeps emission stable across runs.
    bindings: BTreeMap<String, IrBinding>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum IrBinding {
    /// A parent signal or clock, by name. Direction of the child port
    /// decides the interpretation.
    Name(String),
    /// A parent expression bound to a child input.
    Expr(IrExpr),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum IrExpr {
    Literal {
        value: u128,
        width: u32,
    },
    Signal {
        name: String,
    },
    Local {
        name: String,
    },
    Slice {
        operand: Box<IrExpr>,
        high: u32,
        low: u32,
    },
    Concat {
        parts: Vec<IrExpr>,
    },
    Binary {
        op: String,
        lhs: Box<IrExpr>,
        rhs: Box<IrExpr>,
    },
    Unary {
        op: String,
        operand: Box<IrExpr>,
    },
    Mux {
        sel: Box<IrExpr>,
        #[serde(rename = "then")]
        then_: Box<IrExpr>,
        #[serde(rename = "else")]
        else_: Box<IrExpr>,
    },
    Case {
        sel: Box<IrExpr>,
        arms: Vec<IrCaseArm>,
        default: Box<IrExpr>,
    },
    Let {
        name: String,
        value: Box<IrExpr>,
        body: Box<IrExpr>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct IrCaseArm {
    key: u128,
    key_width: u32,
    value: IrExpr,
}

/// Serialize a top component and the children it references (transitively,
/// resolved through `registry`) into the JSON wire format.
pub fn design_to_json(top: &Component, registry: &Registry) -> Result<String> {
    let mut children: Vec<&Component> = Vec::new();
    let mut pending: Vec<&Component> = vec![top];
    let mut seen: Vec<String> = vec![top.name.clone()];
    while let Some(component) = pending.pop() {
        for instance in &component.instances {
            if seen.iter().any(|n| *n == instance.component) {
                continue;
            }
            let child = registry.get(&instance.component).ok_or_else(|| {
                ElaborationError::UnknownComponent {
                    component: component.name.clone(),
                    instance: instance.name.clone(),
                    target: instance.component.clone(),
                }
            })?;
            seen.push(child.name.clone());
            children.push(child);
            pending.push(child);
        }
    }
    children.sort_by(|a, b| a.name.cmp(&b.name));

    let body = component_to_ir(top);
    let file = IrFile {
        name: body.name,
        clocks: body.clocks,
        ports: body.ports,
        nets: body.nets,
        regs: body.regs,
        memories: body.memories,
        assignments: body.assignments,
        processes: body.processes,
        instances: body.instances,
        components: children.into_iter().map(component_to_ir).collect(),
    };
    serde_json::to_string_pretty(&file)
        .map_err(|e| ElaborationError::MalformedIr(e.to_string()))
}

/// Load a design from the JSON wire format. Returns the top component and
/// a registry holding the child definitions the file carried.
pub fn design_from_json(text: &str) -> Result<(Component, Registry)> {
    let file: IrFile =
        serde_json::from_str(text).map_err(|e| ElaborationError::MalformedIr(e.to_string()))?;
    let mut registry = Registry::new();
    for child in &file.components {
        let component = component_from_ir(child)?;
        registry.insert(component);
    }
    let top = IrFileComponent {
        name: file.name,
        clocks: file.clocks,
        ports: file.ports,
        nets: file.nets,
        regs: file.regs,
        memories: file.memories,
        assignments: file.assignments,
        processes: file.processes,
        instances: file.instances,
    };
    let top = component_from_ir(&top)?;
    Ok((top, registry))
}

fn component_to_ir(component: &Component) -> IrFileComponent {
    let clock_name = |id: ClockId| component.clocks[id.0].name.clone();
    let signal_name = |id: SignalId| component.signals[id.0].name.clone();
    let expr = |e: &Expr| expr_to_ir(e, component);

    let mut ports = Vec::new();
    let mut nets = Vec::new();
    let mut regs = Vec::new();
    for signal in &component.signals {
        match &signal.kind {
            SignalKind::Input { default } => ports.push(IrPort {
                name: signal.name.clone(),
                width: signal.width,
                direction: IrDirection::Input,
                default: (!default.is_zero()).then(|| default.value()),
            }),
            SignalKind::Output => ports.push(IrPort {
                name: signal.name.clone(),
                width: signal.width,
                direction: IrDirection::Output,
                default: None,
            }),
            SignalKind::Wire => nets.push(IrNet {
                name: signal.name.clone(),
                width: signal.width,
            }),
            SignalKind::Register {
                reset,
                clock,
                reset_spec,
            } => regs.push(IrReg {
                name: signal.name.clone(),
                width: signal.width,
                reset: Some(reset.value()),
                clock: Some(clock_name(*clock)),
                reset_signal: reset_spec.map(|s| signal_name(s.signal)),
                reset_polarity: reset_spec.map(|s| match s.polarity {
                    ResetPolarity::ActiveHigh => IrResetPolarity::High,
                    ResetPolarity::ActiveLow => IrResetPolarity::Low,
                }),
                reset_kind: reset_spec.map(|s| match s.kind {
                    ResetKind::Synchronous => IrResetKind::Sync,
                    ResetKind::Asynchronous => IrResetKind::Async,
                }),
            }),
        }
    }

    IrFileComponent {
        name: component.name.clone(),
        clocks: component.clocks.iter().map(|c| c.name.clone()).collect(),
        ports,
        nets,
        regs,
        memories: component
            .memories
            .iter()
            .map(|memory| IrMemory {
                name: memory.name.clone(),
                depth: memory.depth,
                width: memory.width,
                ports: memory
                    .read_ports
                    .iter()
                    .map(|port| IrMemoryPort::Read {
                        mode: match port.mode {
                            ReadMode::Synchronous => IrReadMode::Sync,
                            ReadMode::Asynchronous => IrReadMode::Async,
                        },
                        clock: port.clock.map(clock_name),
                        addr: expr(&port.addr),
                        target: signal_name(port.data),
                    })
                    .chain(memory.write_ports.iter().map(|port| IrMemoryPort::Write {
                        clock: clock_name(port.clock),
                        addr: expr(&port.addr),
                        data: expr(&port.data),
                        enable: expr(&port.enable),
                    }))
                    .collect(),
            })
            .collect(),
        assignments: component
            .assignments
            .iter()
            .map(|a| IrAssignment {
                lhs: signal_name(a.lhs),
                expr: expr(&a.expr),
            })
            .collect(),
        processes: component
            .processes
            .iter()
            .map(|p| IrProcess {
                clock: clock_name(p.clock),
                rules: p
                    .rules
                    .iter()
                    .map(|r| IrRule {
                        lhs: signal_name(r.lhs),
                        expr: expr(&r.expr),
                        reset: None,
                    })
                    .collect(),
            })
            .collect(),
        instances: component
            .instances
            .iter()
            .map(|instance| IrInstance {
                name: instance.name.clone(),
                component: instance.component.clone(),
                bindings: instance
                    .inputs
                    .iter()
                    .map(|(port, e)| (port.clone(), IrBinding::Expr(expr(e))))
                    .chain(
                        instance
                            .outputs
                            .iter()
                            .map(|(port, id)| (port.clone(), IrBinding::Name(signal_name(*id)))),
                    )
                    .chain(
                        instance
                            .clocks
                            .iter()
                            .map(|(port, id)| (port.clone(), IrBinding::Name(clock_name(*id)))),
                    )
                    .collect(),
            })
            .collect(),
    }
}

fn expr_to_ir(expr: &Expr, component: &Component) -> IrExpr {
    match expr {
        Expr::Literal(v) => IrExpr::Literal {
            value: v.value(),
            width: v.width(),
        },
        Expr::Signal(id) => IrExpr::Signal {
            name: component.signals[id.0].name.clone(),
        },
        Expr::Local(name) => IrExpr::Local { name: name.clone() },
        Expr::Slice { operand, high, low } => IrExpr::Slice {
            operand: Box::new(expr_to_ir(operand, component)),
            high: *high,
            low: *low,
        },
        Expr::Concat(parts) => IrExpr::Concat {
            parts: parts.iter().map(|p| expr_to_ir(p, component)).collect(),
        },
        Expr::Binary { op, lhs, rhs } => IrExpr::Binary {
            op: op.symbol().to_owned(),
            lhs: Box::new(expr_to_ir(lhs, component)),
            rhs: Box::new(expr_to_ir(rhs, component)),
        },
        Expr::Unary { op, operand } => IrExpr::Unary {
            op: unary_symbol(*op).to_owned(),
            operand: Box::new(expr_to_ir(operand, component)),
        },
        Expr::Mux { sel, then_, else_ } => IrExpr::Mux {
            sel: Box::new(expr_to_ir(sel, component)),
            then_: Box::new(expr_to_ir(then_, component)),
            else_: Box::new(expr_to_ir(else_, component)),
        },
        Expr::Case { sel, arms, default } => IrExpr::Case {
            sel: Box::new(expr_to_ir(sel, component)),
            arms: arms
                .iter()
                .map(|(key, value)| IrCaseArm {
                    key: key.value(),
                    key_width: key.width(),
                    value: expr_to_ir(value, component),
                })
                .collect(),
            default: Box::new(expr_to_ir(default, component)),
        },
        Expr::Let { name, value, body } => IrExpr::Let {
            name: name.clone(),
            value: Box::new(expr_to_ir(value, component)),
            body: Box::new(expr_to_ir(body, component)),
        },
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "not",
        UnaryOp::Neg => "neg",
        UnaryOp::ReduceAnd => "reduce_and",
        UnaryOp::ReduceOr => "reduce_or",
        UnaryOp::ReduceXor => "reduce_xor",
    }
}

fn component_from_ir(ir: &IrFileComponent) -> Result<Component> {
    let name = &ir.name;
    if let Some(dup) = ir
        .ports
        .iter()
        .map(|p| &p.name)
        .chain(ir.nets.iter().map(|n| &n.name))
        .chain(ir.regs.iter().map(|r| &r.name))
        .duplicates()
        .next()
    {
        return Err(ElaborationError::DuplicateName {
            component: name.clone(),
            name: dup.clone(),
        });
    }

    // Clocks: declared list first, then any name mentioned by a process,
    // register, or memory port, in order of first mention.
    let mut clocks: Vec<String> = ir.clocks.clone();
    let mention = |clock: &Option<String>, clocks: &mut Vec<String>| {
        if let Some(c) = clock {
            if !clocks.iter().any(|k| k == c) {
                clocks.push(c.clone());
            }
        }
    };
    for process in &ir.processes {
        mention(&Some(process.clock.clone()), &mut clocks);
    }
    for reg in &ir.regs {
        mention(&reg.clock, &mut clocks);
    }
    for memory in &ir.memories {
        for port in &memory.ports {
            match port {
                IrMemoryPort::Read { clock, .. } => mention(clock, &mut clocks),
                IrMemoryPort::Write { clock, .. } => {
                    mention(&Some(clock.clone()), &mut clocks)
                }
            }
        }
    }
    let clock_id = |clock: &str| -> Result<ClockId> {
        clocks
            .iter()
            .position(|c| c == clock)
            .map(ClockId)
            .ok_or_else(|| ElaborationError::UnresolvedSignal {
                component: name.clone(),
                name: clock.to_owned(),
            })
    };

    // Signal arena: ports, then nets, then regs, in file order.
    let mut signals: Vec<Signal> = Vec::new();
    let mut ids: HashMap<String, SignalId> = HashMap::new();
    let value_err = ElaborationError::value(name);
    for port in &ir.ports {
        let kind = match port.direction {
            IrDirection::Input => SignalKind::Input {
                default: BitVec::new(port.default.unwrap_or(0), port.width)
                    .map_err(&value_err)?,
            },
            IrDirection::Output => SignalKind::Output,
        };
        ids.insert(port.name.clone(), SignalId(signals.len()));
        signals.push(Signal {
            name: port.name.clone(),
            width: port.width,
            kind,
        });
    }
    for net in &ir.nets {
        BitVec::zero(net.width).map_err(&value_err)?;
        ids.insert(net.name.clone(), SignalId(signals.len()));
        signals.push(Signal {
            name: net.name.clone(),
            width: net.width,
            kind: SignalKind::Wire,
        });
    }
    for reg in &ir.regs {
        // Reset may also arrive on a process rule; fill it in below.
        let reset = match reg.reset {
            Some(value) => BitVec::new(value, reg.width).map_err(&value_err)?,
            None => {
                let from_rule = ir
                    .processes
                    .iter()
                    .flat_map(|p| &p.rules)
                    .find(|r| r.lhs == reg.name)
                    .and_then(|r| r.reset);
                match from_rule {
                    Some(value) => BitVec::new(value, reg.width).map_err(&value_err)?,
                    None => {
                        return Err(ElaborationError::MissingResetValue {
                            component: name.clone(),
                            register: reg.name.clone(),
                        })
                    }
                }
            }
        };
        let clock = match &reg.clock {
            Some(clock) => clock_id(clock)?,
            None => {
                if clocks.is_empty() {
                    return Err(ElaborationError::MalformedIr(format!(
                        "register `{}` has no clock and the design declares none",
                        reg.name
                    )));
                }
                ClockId(0)
            }
        };
        ids.insert(reg.name.clone(), SignalId(signals.len()));
        signals.push(Signal {
            name: reg.name.clone(),
            width: reg.width,
            kind: SignalKind::Register {
                reset,
                clock,
                // reset_spec resolved after the arena is complete.
                reset_spec: None,
            },
        });
    }

    // Patch reset wiring now that every name has an id.
    for reg in &ir.regs {
        let Some(reset_signal) = &reg.reset_signal else {
            continue;
        };
        let signal = *ids
            .get(reset_signal)
            .ok_or_else(|| ElaborationError::UnresolvedSignal {
                component: name.clone(),
                name: reset_signal.clone(),
            })?;
        let spec = ResetSpec {
            signal,
            polarity: match reg.reset_polarity.unwrap_or(IrResetPolarity::High) {
                IrResetPolarity::High => ResetPolarity::ActiveHigh,
                IrResetPolarity::Low => ResetPolarity::ActiveLow,
            },
            kind: match reg.reset_kind.unwrap_or(IrResetKind::Async) {
                IrResetKind::Sync => ResetKind::Synchronous,
                IrResetKind::Async => ResetKind::Asynchronous,
            },
        };
        let id = ids[&reg.name];
        if let SignalKind::Register { reset_spec, .. } = &mut signals[id.0].kind {
            *reset_spec = Some(spec);
        }
    }

    let resolve = |signal: &str| -> Result<SignalId> {
        ids.get(signal)
            .copied()
            .ok_or_else(|| ElaborationError::UnresolvedSignal {
                component: name.clone(),
                name: signal.to_owned(),
            })
    };
    let expr = |e: &IrExpr| expr_from_ir(e, name, &ids);

    let memories = ir
        .memories
        .iter()
        .map(|memory| {
            let mut read_ports = Vec::new();
            let mut write_ports = Vec::new();
            for port in &memory.ports {
                match port {
                    IrMemoryPort::Read {
                        mode,
                        clock,
                        addr,
                        target,
                    } => read_ports.push(ReadPort {
                        addr: expr(addr)?,
                        data: resolve(target)?,
                        mode: match mode {
                            IrReadMode::Sync => ReadMode::Synchronous,
                            IrReadMode::Async => ReadMode::Asynchronous,
                        },
                        clock: clock.as_deref().map(&clock_id).transpose()?,
                    }),
                    IrMemoryPort::Write {
                        clock,
                        addr,
                        data,
                        enable,
                    } => write_ports.push(WritePort {
                        clock: clock_id(clock)?,
                        addr: expr(addr)?,
                        data: expr(data)?,
                        enable: expr(enable)?,
                    }),
                }
            }
            Ok(Memory {
                name: memory.name.clone(),
                depth: memory.depth,
                width: memory.width,
                read_ports,
                write_ports,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let assignments = ir
        .assignments
        .iter()
        .map(|a| {
            Ok(Assignment {
                lhs: resolve(&a.lhs)?,
                expr: expr(&a.expr)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let processes = ir
        .processes
        .iter()
        .map(|p| {
            Ok(ComponentProcess {
                clock: clock_id(&p.clock)?,
                rules: p
                    .rules
                    .iter()
                    .map(|r| {
                        Ok(SeqRule {
                            lhs: resolve(&r.lhs)?,
                            expr: expr(&r.expr)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // Instance bindings split by interpretation at elaboration time; here
    // names may be signals or clocks, so keep both candidate forms.
    let instances = ir
        .instances
        .iter()
        .map(|instance| {
            let mut inputs = Vec::new();
            let mut outputs = Vec::new();
            let mut clock_binds = Vec::new();
            for (port, binding) in &instance.bindings {
                match binding {
                    IrBinding::Expr(e) => inputs.push((port.clone(), expr(e)?)),
                    IrBinding::Name(n) => {
                        if let Some(id) = ids.get(n) {
                            // A bare signal name: output mirror if the
                            // parent side is a wire, else an input feed.
                            if matches!(signals[id.0].kind, SignalKind::Wire) {
                                outputs.push((port.clone(), *id));
                            } else {
                                inputs.push((port.clone(), Expr::Signal(*id)));
                            }
                        } else if clocks.iter().any(|c| c == n) {
                            clock_binds.push((port.clone(), clock_id(n)?));
                        } else {
                            return Err(ElaborationError::UnresolvedSignal {
                                component: name.clone(),
                                name: n.clone(),
                            });
                        }
                    }
                }
            }
            Ok(Instance {
                name: instance.name.clone(),
                component: instance.component.clone(),
                inputs,
                outputs,
                clocks: clock_binds,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Component {
        name: name.clone(),
        signals,
        clocks: clocks.into_iter().map(|name| Clock { name }).collect(),
        memories,
        assignments,
        processes,
        instances,
    })
}

fn expr_from_ir(
    ir: &IrExpr,
    component: &str,
    ids: &HashMap<String, SignalId>,
) -> Result<Expr> {
    let value_err = ElaborationError::value(component);
    Ok(match ir {
        IrExpr::Literal { value, width } => {
            Expr::Literal(BitVec::new(*value, *width).map_err(&value_err)?)
        }
        IrExpr::Signal { name } => Expr::Signal(*ids.get(name).ok_or_else(|| {
            ElaborationError::UnresolvedSignal {
                component: component.to_owned(),
                name: name.clone(),
            }
        })?),
        IrExpr::Local { name } => Expr::Local(name.clone()),
        IrExpr::Slice { operand, high, low } => Expr::Slice {
            operand: Box::new(expr_from_ir(operand, component, ids)?),
            high: *high,
            low: *low,
        },
        IrExpr::Concat { parts } => Expr::Concat(
            parts
                .iter()
                .map(|p| expr_from_ir(p, component, ids))
                .collect::<Result<Vec<_>>>()?,
        ),
        IrExpr::Binary { op, lhs, rhs } => Expr::Binary {
            op: binary_from_symbol(op).ok_or_else(|| {
                ElaborationError::MalformedIr(format!("unknown binary operator `{op}`"))
            })?,
            lhs: Box::new(expr_from_ir(lhs, component, ids)?),
            rhs: Box::new(expr_from_ir(rhs, component, ids)?),
        },
        IrExpr::Unary { op, operand } => Expr::Unary {
            op: unary_from_symbol(op).ok_or_else(|| {
                ElaborationError::MalformedIr(format!("unknown unary operator `{op}`"))
            })?,
            operand: Box::new(expr_from_ir(operand, component, ids)?),
        },
        IrExpr::Mux { sel, then_, else_ } => Expr::Mux {
            sel: Box::new(expr_from_ir(sel, component, ids)?),
            then_: Box::new(expr_from_ir(then_, component, ids)?),
            else_: Box::new(expr_from_ir(else_, component, ids)?),
        },
        IrExpr::Case { sel, arms, default } => Expr::Case {
            sel: Box::new(expr_from_ir(sel, component, ids)?),
            arms: arms
                .iter()
                .map(|arm| {
                    Ok((
                        BitVec::new(arm.key, arm.key_width).map_err(&value_err)?,
                        expr_from_ir(&arm.value, component, ids)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?,
            default: Box::new(expr_from_ir(default, component, ids)?),
        },
        IrExpr::Let { name, value, body } => Expr::Let {
            name: name.clone(),
            value: Box::new(expr_from_ir(value, component, ids)?),
            body: Box::new(expr_from_ir(body, component, ids)?),
        },
    })
}

fn binary_from_symbol(symbol: &str) -> Option<BinaryOp> {
    Some(match symbol {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "&" => BinaryOp::And,
        "|" => BinaryOp::Or,
        "^" => BinaryOp::Xor,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "<<" => BinaryOp::Shl,
        ">>" => BinaryOp::Shr,
        _ => return None,
    })
}

fn unary_from_symbol(symbol: &str) -> Option<UnaryOp> {
    Some(match symbol {
        "not" | "~" => UnaryOp::Not,
        "neg" => UnaryOp::Neg,
        "reduce_and" => UnaryOp::ReduceAnd,
        "reduce_or" => UnaryOp::ReduceOr,
        "reduce_xor" => UnaryOp::ReduceXor,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_binary_op_symbol_round_trips() {
        for op in BinaryOp::iter() {
            assert_eq!(binary_from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(binary_from_symbol("***"), None);
    }

    #[test]
    fn every_unary_op_symbol_round_trips() {
        for op in UnaryOp::iter() {
            assert_eq!(unary_from_symbol(unary_symbol(op)), Some(op));
        }
    }
}
