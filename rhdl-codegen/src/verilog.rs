//! Behavioral Verilog emission: one module per component, continuous
//! assignments for combinational logic, clocked always-blocks for
//! sequential rules, reg arrays for memories, child module instantiation
//! for hierarchy.

use std::fmt::Write;

use rhdl_bir::{
    BinaryOp, Component, Expr, ReadMode, Registry, ResetKind, ResetPolarity, SignalKind,
    UnaryOp,
};
use rhdl_bitvec::{BitVec, Width};

use crate::error::CodegenError;
use crate::sanitize::sanitize_identifier;
use crate::Result;

/// Emit a hierarchical behavioral Verilog design: children first (sorted
/// by name for stable output), then the top module.
pub fn behavioral_verilog(top: &Component, registry: &Registry) -> Result<String> {
    let mut order = Vec::new();
    collect_children(top, registry, &mut order)?;
    order.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    writeln!(out, "// Generated by rhdl-codegen; do not edit.")?;
    for component in order {
        writeln!(out)?;
        emit_module(&component, &mut out)?;
    }
    writeln!(out)?;
    emit_module(top, &mut out)?;
    Ok(out)
}

fn collect_children(
    component: &Component,
    registry: &Registry,
    out: &mut Vec<Component>,
) -> Result<()> {
    for instance in &component.instances {
        if out.iter().any(|c| c.name == instance.component) {
            continue;
        }
        let child = registry.get(&instance.component).ok_or_else(|| {
            CodegenError::UnknownComponent {
                component: component.name.clone(),
                target: instance.component.clone(),
            }
        })?;
        out.push(Component::clone(child));
        collect_children(child, registry, out)?;
    }
    Ok(())
}

fn emit_module(component: &Component, out: &mut String) -> Result<()> {
    let mut e = ModuleEmitter::new(component);
    e.build()?;
    e.print(out)
}

struct ModuleEmitter<'c> {
    component: &'c Component,
    names: Vec<String>,
    decls: Vec<String>,
    assigns: Vec<String>,
    blocks: Vec<String>,
    hoisted: usize,
}

impl<'c> ModuleEmitter<'c> {
    fn new(component: &'c Component) -> Self {
        let names = component
            .signals
            .iter()
            .map(|s| sanitize_identifier(&s.name))
            .collect();
        Self {
            component,
            names,
            decls: Vec::new(),
            assigns: Vec::new(),
            blocks: Vec::new(),
            hoisted: 0,
        }
    }

    fn build(&mut self) -> Result<()> {
        let component = self.component;

        // Synchronous read data wires become regs.
        let sync_data: Vec<usize> = component
            .memories
            .iter()
            .flat_map(|m| &m.read_ports)
            .filter(|p| p.mode == ReadMode::Synchronous)
            .map(|p| p.data.0)
            .collect();

        for (index, signal) in component.signals.iter().enumerate() {
            let name = &self.names[index];
            match &signal.kind {
                SignalKind::Input { .. } | SignalKind::Output => {}
                SignalKind::Wire => {
                    if sync_data.contains(&index) {
                        self.decls
                            .push(format!("reg {}{name};", range(signal.width)));
                        self.decls
                            .push(format!("initial {name} = {}'d0;", signal.width));
                    } else {
                        self.decls
                            .push(format!("wire {}{name};", range(signal.width)));
                    }
                }
                SignalKind::Register { reset, .. } => {
                    self.decls
                        .push(format!("reg {}{name};", range(signal.width)));
                    self.decls
                        .push(format!("initial {name} = {};", literal(reset)));
                }
            }
        }
        for memory in &component.memories {
            self.decls.push(format!(
                "reg {}{} [0:{}];",
                range(memory.width),
                sanitize_identifier(&memory.name),
                memory.depth - 1
            ));
        }

        for assignment in &component.assignments {
            let mut env = Vec::new();
            let text = self.expr(&assignment.expr, &mut env)?;
            let lhs = self.names[assignment.lhs.0].clone();
            self.assigns.push(format!("assign {lhs} = {text};"));
        }

        for memory in &component.memories {
            let mem_name = sanitize_identifier(&memory.name);
            for port in &memory.read_ports {
                let mut env = Vec::new();
                let addr = self.expr(&port.addr, &mut env)?;
                let data = self.names[port.data.0].clone();
                match port.mode {
                    ReadMode::Asynchronous => self
                        .assigns
                        .push(format!("assign {data} = {mem_name}[{addr}];")),
                    ReadMode::Synchronous => {
                        let clock = self.clock_name(port.clock.map(|c| c.0).unwrap_or(0));
                        self.blocks.push(format!(
                            "always @(posedge {clock}) begin\n    {data} <= {mem_name}[{addr}];\n  end"
                        ));
                    }
                }
            }
            // One block per clock keeps declaration order: a later write
            // port wins a same-edge, same-address conflict.
            for clock_index in 0..component.clocks.len() {
                let ports: Vec<_> = memory
                    .write_ports
                    .iter()
                    .filter(|p| p.clock.0 == clock_index)
                    .collect();
                if ports.is_empty() {
                    continue;
                }
                let clock = self.clock_name(clock_index);
                let mut body = String::new();
                for port in ports {
                    let mut env = Vec::new();
                    let enable = self.expr(&port.enable, &mut env)?;
                    let addr = self.expr(&port.addr, &mut env)?;
                    let data = self.expr(&port.data, &mut env)?;
                    write!(
                        body,
                        "\n    if ({enable}) {mem_name}[{addr}] <= {data};"
                    )?;
                }
                self.blocks
                    .push(format!("always @(posedge {clock}) begin{body}\n  end"));
            }
        }

        for process in &component.processes {
            for rule in &process.rules {
                self.emit_rule(process.clock.0, rule)?;
            }
        }

        for instance in &component.instances {
            let mut bindings = Vec::new();
            for (port, clock) in &instance.clocks {
                bindings.push(format!(
                    ".{}({})",
                    sanitize_identifier(port),
                    self.clock_name(clock.0)
                ));
            }
            for (port, expr) in &instance.inputs {
                let mut env = Vec::new();
                let text = self.expr(expr, &mut env)?;
                bindings.push(format!(".{}({text})", sanitize_identifier(port)));
            }
            for (port, signal) in &instance.outputs {
                bindings.push(format!(
                    ".{}({})",
                    sanitize_identifier(port),
                    self.names[signal.0]
                ));
            }
            self.blocks.push(format!(
                "{} {} (\n    {}\n  );",
                sanitize_identifier(&instance.component),
                sanitize_identifier(&instance.name),
                bindings.join(",\n    ")
            ));
        }

        Ok(())
    }

    fn emit_rule(&mut self, clock_index: usize, rule: &rhdl_bir::SeqRule) -> Result<()> {
        let component = self.component;
        let clock = self.clock_name(clock_index);
        let lhs = self.names[rule.lhs.0].clone();
        let mut env = Vec::new();
        let text = self.expr(&rule.expr, &mut env)?;

        let SignalKind::Register {
            reset, reset_spec, ..
        } = &component.signals[rule.lhs.0].kind
        else {
            return Ok(());
        };
        let block = match reset_spec {
            None => format!(
                "always @(posedge {clock}) begin\n    {lhs} <= {text};\n  end"
            ),
            Some(spec) => {
                let reset_name = self.names[spec.signal.0].clone();
                let (edge, condition) = match spec.polarity {
                    ResetPolarity::ActiveHigh => {
                        (format!("posedge {reset_name}"), reset_name.clone())
                    }
                    ResetPolarity::ActiveLow => {
                        (format!("negedge {reset_name}"), format!("!{reset_name}"))
                    }
                };
                let reset_text = literal(reset);
                match spec.kind {
                    ResetKind::Asynchronous => format!(
                        "always @(posedge {clock} or {edge}) begin\n    \
                         if ({condition}) {lhs} <= {reset_text};\n    \
                         else {lhs} <= {text};\n  end"
                    ),
                    ResetKind::Synchronous => format!(
                        "always @(posedge {clock}) begin\n    \
                         if ({condition}) {lhs} <= {reset_text};\n    \
                         else {lhs} <= {text};\n  end"
                    ),
                }
            }
        };
        self.blocks.push(block);
        Ok(())
    }

    fn print(&self, out: &mut String) -> Result<()> {
        let component = self.component;
        let mut ports = Vec::new();
        for clock in &component.clocks {
            ports.push(format!("input wire {}", sanitize_identifier(&clock.name)));
        }
        for (index, signal) in component.signals.iter().enumerate() {
            match signal.kind {
                SignalKind::Input { .. } => ports.push(format!(
                    "input wire {}{}",
                    range(signal.width),
                    self.names[index]
                )),
                SignalKind::Output => ports.push(format!(
                    "output wire {}{}",
                    range(signal.width),
                    self.names[index]
                )),
                _ => {}
            }
        }

        writeln!(
            out,
            "module {} (\n  {}\n);",
            sanitize_identifier(&component.name),
            ports.join(",\n  ")
        )?;
        for decl in &self.decls {
            writeln!(out, "  {decl}")?;
        }
        if !self.decls.is_empty() {
            writeln!(out)?;
        }
        for assign in &self.assigns {
            writeln!(out, "  {assign}")?;
        }
        for block in &self.blocks {
            writeln!(out)?;
            writeln!(out, "  {block}")?;
        }
        writeln!(out, "endmodule")?;
        Ok(())
    }

    fn clock_name(&self, index: usize) -> String {
        sanitize_identifier(&self.component.clocks[index].name)
    }

    /// Allocate an intermediate wire for a value that must be a named net
    /// (slice operands, let bindings).
    fn hoist(&mut self, width: Width, text: String) -> String {
        let name = format!("t{}_", self.hoisted);
        self.hoisted += 1;
        self.decls.push(format!("wire {}{name};", range(width)));
        self.assigns.push(format!("assign {name} = {text};"));
        name
    }

    fn expr(&mut self, expr: &Expr, env: &mut Vec<(String, String)>) -> Result<String> {
        Ok(match expr {
            Expr::Literal(value) => literal(value),
            Expr::Signal(id) => self.names[id.0].clone(),
            Expr::Local(name) => env
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, text)| text.clone())
                .unwrap_or_else(|| unreachable!("unbound local `{name}`")),
            Expr::Slice { operand, high, low } => {
                let base = match operand.as_ref() {
                    Expr::Signal(id) => self.names[id.0].clone(),
                    other => {
                        let width = self.expr_width(other);
                        let text = self.expr(other, env)?;
                        self.hoist(width, text)
                    }
                };
                if high == low {
                    format!("{base}[{high}]")
                } else {
                    format!("{base}[{high}:{low}]")
                }
            }
            Expr::Concat(parts) => {
                let parts = parts
                    .iter()
                    .map(|p| self.expr(p, env))
                    .collect::<Result<Vec<_>>>()?;
                format!("{{{}}}", parts.join(", "))
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.expr(lhs, env)?;
                let b = self.expr(rhs, env)?;
                format!("({a} {} {b})", verilog_binary(*op))
            }
            Expr::Unary { op, operand } => {
                let a = self.expr(operand, env)?;
                let symbol = match op {
                    UnaryOp::Not => "~",
                    UnaryOp::Neg => "-",
                    UnaryOp::ReduceAnd => "&",
                    UnaryOp::ReduceOr => "|",
                    UnaryOp::ReduceXor => "^",
                };
                format!("({symbol}{a})")
            }
            Expr::Mux { sel, then_, else_ } => {
                let sel = self.expr(sel, env)?;
                let t = self.expr(then_, env)?;
                let e = self.expr(else_, env)?;
                format!("({sel} ? {t} : {e})")
            }
            Expr::Case { sel, arms, default } => {
                let sel_width = self.expr_width(sel);
                let sel_text = self.expr(sel, env)?;
                let sel_name = match sel.as_ref() {
                    Expr::Signal(id) => self.names[id.0].clone(),
                    _ => self.hoist(sel_width, sel_text),
                };
                let mut text = self.expr(default, env)?;
                for (key, arm) in arms.iter().rev() {
                    let arm_text = self.expr(arm, env)?;
                    text = format!(
                        "(({sel_name} == {}) ? {arm_text} : {text})",
                        literal(key)
                    );
                }
                text
            }
            Expr::Let { name, value, body } => {
                let width = self.expr_width(value);
                let text = self.expr(value, env)?;
                let hoisted = self.hoist(width, text);
                env.push((name.clone(), hoisted));
                let result = self.expr(body, env)?;
                env.pop();
                result
            }
        })
    }

    /// Widths were checked at elaboration; this recomputation only feeds
    /// hoisted wire declarations.
    fn expr_width(&self, expr: &Expr) -> Width {
        expr_width_of(expr, self.component)
    }
}

/// Width of an already-elaborated expression, for hoisted declarations.
pub(crate) fn expr_width_of(expr: &Expr, component: &Component) -> Width {
    expr_width(expr, component, &mut Vec::new())
}

fn expr_width(expr: &Expr, component: &Component, locals: &mut Vec<(String, Width)>) -> Width {
    match expr {
        Expr::Literal(value) => value.width(),
        Expr::Signal(id) => component.signals[id.0].width,
        Expr::Local(name) => locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, w)| *w)
            .unwrap_or(1),
        Expr::Slice { high, low, .. } => high - low + 1,
        Expr::Concat(parts) => parts
            .iter()
            .map(|p| expr_width(p, component, locals))
            .sum(),
        Expr::Binary { op, lhs, .. } => {
            if op.is_comparison() {
                1
            } else {
                expr_width(lhs, component, locals)
            }
        }
        Expr::Unary { op, operand } => {
            if op.is_reduction() {
                1
            } else {
                expr_width(operand, component, locals)
            }
        }
        Expr::Mux { then_, .. } => expr_width(then_, component, locals),
        Expr::Case { default, .. } => expr_width(default, component, locals),
        Expr::Let { name, value, body } => {
            let width = expr_width(value, component, locals);
            locals.push((name.clone(), width));
            let result = expr_width(body, component, locals);
            locals.pop();
            result
        }
    }
}

fn verilog_binary(op: BinaryOp) -> &'static str {
    // The BIR symbols are already Verilog's.
    op.symbol()
}

/// `[W-1:0] ` for multi-bit signals, empty for single bits.
fn range(width: Width) -> String {
    if width == 1 {
        String::new()
    } else {
        format!("[{}:0] ", width - 1)
    }
}

/// Sized literal: decimal for values that fit in 64 bits, hex beyond.
pub(crate) fn literal(value: &BitVec) -> String {
    if value.value() <= u64::MAX as u128 {
        format!("{}'d{}", value.width(), value.value())
    } else {
        format!("{}'h{:x}", value.width(), value.value())
    }
}
