//! Behavioral VHDL emission.
//!
//! Ports use `std_logic` / `std_logic_vector` per the external contract;
//! internal signals are `numeric_std` unsigned vectors, converted at the
//! port boundary. Muxes, case selects, let bindings, and sliced
//! subexpressions hoist into named signals with concurrent assignments,
//! since VHDL only allows conditional forms at the top of an assignment.

use std::fmt::Write;

use rhdl_bir::{
    BinaryOp, Component, Expr, ReadMode, Registry, ResetKind, ResetPolarity, SignalKind,
    UnaryOp,
};
use rhdl_bitvec::{BitVec, Width};

use crate::error::CodegenError;
use crate::sanitize::sanitize_identifier;
use crate::Result;

/// Emit a hierarchical behavioral VHDL design: children first (sorted by
/// name), then the top entity.
pub fn behavioral_vhdl(top: &Component, registry: &Registry) -> Result<String> {
    let mut order = Vec::new();
    collect_children(top, registry, &mut order)?;
    order.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    writeln!(out, "-- Generated by rhdl-codegen; do not edit.")?;
    for component in &order {
        writeln!(out)?;
        emit_entity(component, &mut out)?;
    }
    writeln!(out)?;
    emit_entity(top, &mut out)?;
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

fn emit_entity(component: &Component, out: &mut String) -> Result<()> {
    let mut e = EntityEmitter::new(component);
    e.build()?;
    e.print(out)
}

struct EntityEmitter<'c> {
    component: &'c Component,
    /// Expression-level name of each signal (ports go through an internal
    /// unsigned mirror).
    names: Vec<String>,
    decls: Vec<String>,
    concurrent: Vec<String>,
    processes: Vec<String>,
    hoisted: usize,
}

impl<'c> EntityEmitter<'c> {
    fn new(component: &'c Component) -> Self {
        let names = component
            .signals
            .iter()
            .map(|s| {
                let base = sanitize_identifier(&s.name);
                match s.kind {
                    SignalKind::Input { .. } | SignalKind::Output => format!("s_{base}"),
                    _ => base,
                }
            })
            .collect();
        Self {
            component,
            names,
            decls: Vec::new(),
            concurrent: Vec::new(),
            processes: Vec::new(),
            hoisted: 0,
        }
    }

    fn build(&mut self) -> Result<()> {
        let component = self.component;

        // Synchronous read data wires are registered and start at zero.
        let sync_data: Vec<usize> = component
            .memories
            .iter()
            .flat_map(|m| &m.read_ports)
            .filter(|p| p.mode == ReadMode::Synchronous)
            .map(|p| p.data.0)
            .collect();

        for (index, signal) in component.signals.iter().enumerate() {
            let name = self.names[index].clone();
            let port = sanitize_identifier(&signal.name);
            match &signal.kind {
                SignalKind::Input { .. } => {
                    self.decls
                        .push(format!("signal {name} : {};", unsigned_type(signal.width)));
                    if signal.width == 1 {
                        self.concurrent.push(format!("{name}(0) <= {port};"));
                    } else {
                        self.concurrent.push(format!("{name} <= unsigned({port});"));
                    }
                }
                SignalKind::Output => {
                    self.decls
                        .push(format!("signal {name} : {};", unsigned_type(signal.width)));
                    if signal.width == 1 {
                        self.concurrent.push(format!("{port} <= {name}(0);"));
                    } else {
                        self.concurrent
                            .push(format!("{port} <= std_logic_vector({name});"));
                    }
                }
                SignalKind::Wire => {
                    if sync_data.contains(&index) {
                        self.decls.push(format!(
                            "signal {name} : {} := (others => '0');",
                            unsigned_type(signal.width)
                        ));
                    } else {
                        self.decls
                            .push(format!("signal {name} : {};", unsigned_type(signal.width)));
                    }
                }
                SignalKind::Register { reset, .. } => {
                    self.decls.push(format!(
                        "signal {name} : {} := {};",
                        unsigned_type(signal.width),
                        literal(reset)
                    ));
                }
            }
        }
        for memory in &component.memories {
            let name = sanitize_identifier(&memory.name);
            self.decls.push(format!(
                "type {name}_t is array (0 to {}) of unsigned({} downto 0);",
                memory.depth - 1,
                memory.width - 1
            ));
            self.decls
                .push(format!("signal {name} : {name}_t := (others => (others => '0'));"));
        }

        for assignment in &component.assignments {
            let mut env = Vec::new();
            let text = self.expr(&assignment.expr, &mut env)?;
            let lhs = self.names[assignment.lhs.0].clone();
            self.concurrent.push(format!("{lhs} <= {text};"));
        }

        for memory in &component.memories {
            let mem_name = sanitize_identifier(&memory.name);
            for port in &memory.read_ports {
                let mut env = Vec::new();
                let addr = self.expr(&port.addr, &mut env)?;
                let data = self.names[port.data.0].clone();
                match port.mode {
                    ReadMode::Asynchronous => self
                        .concurrent
                        .push(format!("{data} <= {mem_name}(to_integer({addr}));")),
                    ReadMode::Synchronous => {
                        let clock = self.clock_name(port.clock.map(|c| c.0).unwrap_or(0));
                        self.processes.push(format!(
                            "process({clock})\n  begin\n    if rising_edge({clock}) then\n      \
                             {data} <= {mem_name}(to_integer({addr}));\n    end if;\n  end process;"
                        ));
                    }
                }
            }
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
                        "\n      if {enable} = \"1\" then\n        \
                         {mem_name}(to_integer({addr})) <= {data};\n      end if;"
                    )?;
                }
                self.processes.push(format!(
                    "process({clock})\n  begin\n    if rising_edge({clock}) then{body}\n    \
                     end if;\n  end process;"
                ));
            }
        }

        for process in &component.processes {
            for rule in &process.rules {
                self.emit_rule(process.clock.0, rule)?;
            }
        }

        for instance in &component.instances {
            self.emit_instance(instance)?;
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
                "process({clock})\n  begin\n    if rising_edge({clock}) then\n      \
                 {lhs} <= {text};\n    end if;\n  end process;"
            ),
            Some(spec) => {
                // Ports are std_logic; internal reset wires are unsigned
                // and compare through their bit zero.
                let reset_signal = &component.signals[spec.signal.0];
                let (sensitivity, reset_ref) = match reset_signal.kind {
                    SignalKind::Input { .. } => {
                        let port = sanitize_identifier(&reset_signal.name);
                        (port.clone(), port)
                    }
                    _ => {
                        let internal = self.names[spec.signal.0].clone();
                        (internal.clone(), format!("{internal}(0)"))
                    }
                };
                let level = match spec.polarity {
                    ResetPolarity::ActiveHigh => "'1'",
                    ResetPolarity::ActiveLow => "'0'",
                };
                let reset_text = literal(reset);
                match spec.kind {
                    ResetKind::Asynchronous => format!(
                        "process({clock}, {sensitivity})\n  begin\n    \
                         if {reset_ref} = {level} then\n      {lhs} <= {reset_text};\n    \
                         elsif rising_edge({clock}) then\n      {lhs} <= {text};\n    \
                         end if;\n  end process;"
                    ),
                    ResetKind::Synchronous => format!(
                        "process({clock})\n  begin\n    if rising_edge({clock}) then\n      \
                         if {reset_ref} = {level} then\n        {lhs} <= {reset_text};\n      \
                         else\n        {lhs} <= {text};\n      end if;\n    end if;\n  \
                         end process;"
                    ),
                }
            }
        };
        self.processes.push(block);
        Ok(())
    }

    fn emit_instance(&mut self, instance: &rhdl_bir::Instance) -> Result<()> {
        let inst_name = sanitize_identifier(&instance.name);
        let mut pins = Vec::new();
        for (port, clock) in &instance.clocks {
            pins.push(format!(
                "{} => {}",
                sanitize_identifier(port),
                self.clock_name(clock.0)
            ));
        }
        for (port, expr) in &instance.inputs {
            let width = self.expr_width(expr);
            let mut env = Vec::new();
            let text = self.expr(expr, &mut env)?;
            let raw = format!("{inst_name}_{}_raw", sanitize_identifier(port));
            self.decls
                .push(format!("signal {raw} : {};", logic_type(width)));
            if width == 1 {
                let value = self.hoist_named(width, text);
                self.concurrent.push(format!("{raw} <= {value}(0);"));
            } else {
                self.concurrent
                    .push(format!("{raw} <= std_logic_vector({text});"));
            }
            pins.push(format!("{} => {raw}", sanitize_identifier(port)));
        }
        for (port, signal) in &instance.outputs {
            let width = self.component.signals[signal.0].width;
            let raw = format!("{inst_name}_{}_raw", sanitize_identifier(port));
            self.decls
                .push(format!("signal {raw} : {};", logic_type(width)));
            let target = self.names[signal.0].clone();
            if width == 1 {
                self.concurrent.push(format!("{target}(0) <= {raw};"));
            } else {
                self.concurrent.push(format!("{target} <= unsigned({raw});"));
            }
            pins.push(format!("{} => {raw}", sanitize_identifier(port)));
        }
        self.processes.push(format!(
            "{inst_name} : entity work.{} port map (\n    {}\n  );",
            sanitize_identifier(&instance.component),
            pins.join(",\n    ")
        ));
        Ok(())
    }

    fn print(&self, out: &mut String) -> Result<()> {
        let component = self.component;
        let entity = sanitize_identifier(&component.name);

        writeln!(out, "library ieee;")?;
        writeln!(out, "use ieee.std_logic_1164.all;")?;
        writeln!(out, "use ieee.numeric_std.all;")?;
        writeln!(out)?;

        let mut ports = Vec::new();
        for clock in &component.clocks {
            ports.push(format!(
                "{} : in std_logic",
                sanitize_identifier(&clock.name)
            ));
        }
        for signal in &component.signals {
            match signal.kind {
                SignalKind::Input { .. } => ports.push(format!(
                    "{} : in {}",
                    sanitize_identifier(&signal.name),
                    logic_type(signal.width)
                )),
                SignalKind::Output => ports.push(format!(
                    "{} : out {}",
                    sanitize_identifier(&signal.name),
                    logic_type(signal.width)
                )),
                _ => {}
            }
        }
        writeln!(out, "entity {entity} is")?;
        if !ports.is_empty() {
            writeln!(out, "  port (\n    {}\n  );", ports.join(";\n    "))?;
        }
        writeln!(out, "end entity;")?;
        writeln!(out)?;

        writeln!(out, "architecture rtl of {entity} is")?;
        emit_helpers(out)?;
        for decl in &self.decls {
            writeln!(out, "  {decl}")?;
        }
        writeln!(out, "begin")?;
        for stmt in &self.concurrent {
            writeln!(out, "  {stmt}")?;
        }
        for process in &self.processes {
            writeln!(out)?;
            writeln!(out, "  {process}")?;
        }
        writeln!(out, "end architecture;")?;
        Ok(())
    }

    fn clock_name(&self, index: usize) -> String {
        sanitize_identifier(&self.component.clocks[index].name)
    }

    /// Hoist a value into a named signal with a concurrent assignment.
    fn hoist_named(&mut self, width: Width, text: String) -> String {
        let name = format!("t{}_", self.hoisted);
        self.hoisted += 1;
        self.decls
            .push(format!("signal {name} : {};", unsigned_type(width)));
        self.concurrent.push(format!("{name} <= {text};"));
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
                        self.hoist_named(width, text)
                    }
                };
                // `downto` slicing keeps the unsigned vector shape even
                // for single bits.
                format!("{base}({high} downto {low})")
            }
            Expr::Concat(parts) => {
                let parts = parts
                    .iter()
                    .map(|p| self.expr(p, env))
                    .collect::<Result<Vec<_>>>()?;
                format!("({})", parts.join(" & "))
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.expr(lhs, env)?;
                let b = self.expr(rhs, env)?;
                match op {
                    BinaryOp::Add => format!("({a} + {b})"),
                    BinaryOp::Sub => format!("({a} - {b})"),
                    BinaryOp::And => format!("({a} and {b})"),
                    BinaryOp::Or => format!("({a} or {b})"),
                    BinaryOp::Xor => format!("({a} xor {b})"),
                    BinaryOp::Eq => format!("b2u({a} = {b})"),
                    BinaryOp::Ne => format!("b2u({a} /= {b})"),
                    BinaryOp::Lt => format!("b2u({a} < {b})"),
                    BinaryOp::Le => format!("b2u({a} <= {b})"),
                    BinaryOp::Gt => format!("b2u({a} > {b})"),
                    BinaryOp::Ge => format!("b2u({a} >= {b})"),
                    BinaryOp::Shl => format!("u_shl({a}, {b})"),
                    BinaryOp::Shr => format!("u_shr({a}, {b})"),
                }
            }
            Expr::Unary { op, operand } => {
                let a = self.expr(operand, env)?;
                match op {
                    UnaryOp::Not => format!("(not {a})"),
                    UnaryOp::Neg => format!("((not {a}) + 1)"),
                    UnaryOp::ReduceAnd => format!("r_and({a})"),
                    UnaryOp::ReduceOr => format!("r_or({a})"),
                    UnaryOp::ReduceXor => format!("r_xor({a})"),
                }
            }
            Expr::Mux { sel, then_, else_ } => {
                let sel_name = self.hoist_expr(sel, env)?;
                let width = self.expr_width(then_);
                let t = self.expr(then_, env)?;
                let e = self.expr(else_, env)?;
                let text = format!("{t} when {sel_name} = \"1\" else {e}");
                self.hoist_named(width, text)
            }
            Expr::Case { sel, arms, default } => {
                let sel_width = self.expr_width(sel);
                let sel_name = self.hoist_expr(sel, env)?;
                let width = self.expr_width(default);
                let mut clauses = Vec::new();
                for (key, arm) in arms {
                    let arm_text = self.expr(arm, env)?;
                    clauses.push(format!(
                        "{arm_text} when {sel_name} = {}",
                        bit_string(key.value(), sel_width)
                    ));
                }
                clauses.push(self.expr(default, env)?);
                self.hoist_named(width, clauses.join(" else "))
            }
            Expr::Let { name, value, body } => {
                let hoisted = self.hoist_expr(value, env)?;
                env.push((name.clone(), hoisted));
                let result = self.expr(body, env)?;
                env.pop();
                result
            }
        })
    }

    /// Hoist unless the expression is already a bare signal name.
    fn hoist_expr(
        &mut self,
        expr: &Expr,
        env: &mut Vec<(String, String)>,
    ) -> Result<String> {
        if let Expr::Signal(id) = expr {
            return Ok(self.names[id.0].clone());
        }
        let width = self.expr_width(expr);
        let text = self.expr(expr, env)?;
        Ok(self.hoist_named(width, text))
    }

    fn expr_width(&self, expr: &Expr) -> Width {
        crate::verilog::expr_width_of(expr, self.component)
    }
}

fn emit_helpers(out: &mut String) -> Result<()> {
    writeln!(
        out,
        "  function b2u(b : boolean) return unsigned is\n  begin\n    \
         if b then return \"1\"; else return \"0\"; end if;\n  end function;"
    )?;
    writeln!(
        out,
        "  function u_shl(a : unsigned; n : unsigned) return unsigned is\n  begin\n    \
         if n >= a'length then return to_unsigned(0, a'length); end if;\n    \
         return shift_left(a, to_integer(resize(n, 30)));\n  end function;"
    )?;
    writeln!(
        out,
        "  function u_shr(a : unsigned; n : unsigned) return unsigned is\n  begin\n    \
         if n >= a'length then return to_unsigned(0, a'length); end if;\n    \
         return shift_right(a, to_integer(resize(n, 30)));\n  end function;"
    )?;
    writeln!(
        out,
        "  function r_and(a : unsigned) return unsigned is\n    \
         variable acc : std_logic := '1';\n    variable r : unsigned(0 downto 0);\n  \
         begin\n    for i in a'range loop acc := acc and a(i); end loop;\n    \
         r(0) := acc;\n    return r;\n  end function;"
    )?;
    writeln!(
        out,
        "  function r_or(a : unsigned) return unsigned is\n    \
         variable acc : std_logic := '0';\n    variable r : unsigned(0 downto 0);\n  \
         begin\n    for i in a'range loop acc := acc or a(i); end loop;\n    \
         r(0) := acc;\n    return r;\n  end function;"
    )?;
    writeln!(
        out,
        "  function r_xor(a : unsigned) return unsigned is\n    \
         variable acc : std_logic := '0';\n    variable r : unsigned(0 downto 0);\n  \
         begin\n    for i in a'range loop acc := acc xor a(i); end loop;\n    \
         r(0) := acc;\n    return r;\n  end function;"
    )?;
    Ok(())
}

fn unsigned_type(width: Width) -> String {
    format!("unsigned({} downto 0)", width - 1)
}

fn logic_type(width: Width) -> String {
    if width == 1 {
        "std_logic".to_owned()
    } else {
        format!("std_logic_vector({} downto 0)", width - 1)
    }
}

fn bit_string(value: u128, width: Width) -> String {
    let mut s = String::with_capacity(width as usize + 2);
    s.push('"');
    for bit in (0..width).rev() {
        s.push(if value >> bit & 1 == 1 { '1' } else { '0' });
    }
    s.push('"');
    s
}

fn literal(value: &BitVec) -> String {
    format!("unsigned'({})", bit_string(value.value(), value.width()))
}
