//! Tree-walking reference backend.
//!
//! Evaluation goes through the [`BitVec`] kernel so the cycle semantics are
//! written exactly once, in terms of the value type's own operations. The
//! bytecode and compiled backends must match this backend bit for bit.

use std::sync::Arc;

use rhdl_bir::{
    BinaryOp, ClockId, CombOp, Design, Expr, ReadMode, ResetKind, ResetPolarity, SignalKind,
    UnaryOp,
};
use rhdl_bitvec::BitVec;

use crate::state::SimState;
use crate::Result;

pub(crate) struct InterpEngine {
    design: Arc<Design>,
}

impl InterpEngine {
    pub fn new(design: Arc<Design>) -> Self {
        Self { design }
    }

    /// Evaluate every combinational op in dependency order.
    pub fn settle(&mut self, state: &mut SimState) -> Result<()> {
        let design = Arc::clone(&self.design);
        for op in design.comb_order() {
            match *op {
                CombOp::Assign(index) => {
                    let assignment = &design.assignments()[index];
                    let value = self.eval(&assignment.expr, state)?;
                    state.values[assignment.lhs.0] = value.value();
                }
                CombOp::MemRead { memory, port } => {
                    let port = &design.memories()[memory.0].read_ports[port];
                    let addr = self.eval(&port.addr, state)?;
                    state.values[port.data.0] = state.memories[memory.0].read(addr.value())?;
                }
            }
        }
        Ok(())
    }

    /// Sample every sequential rule and memory port on `clock` against the
    /// settled snapshot, then commit atomically: registers and synchronous
    /// read data first, memory writes last, in declaration order.
    pub fn tick_clock(&mut self, clock: ClockId, state: &mut SimState) -> Result<()> {
        let design = Arc::clone(&self.design);

        let mut reg_next: Vec<(usize, u128)> = Vec::new();
        for process in design.processes() {
            if process.clock != clock {
                continue;
            }
            for rule in &process.rules {
                let next = self.eval(&rule.expr, state)?;
                reg_next.push((rule.lhs.0, next.value()));
            }
        }

        // A synchronous reset overrides the rule (or the held value) on
        // the same edge.
        for register in design.registers() {
            if register.clock != clock {
                continue;
            }
            let Some(spec) = register.reset_spec else {
                continue;
            };
            if spec.kind != ResetKind::Synchronous {
                continue;
            }
            let raw = state.values[spec.signal.0] & 1;
            let asserted = match spec.polarity {
                ResetPolarity::ActiveHigh => raw == 1,
                ResetPolarity::ActiveLow => raw == 0,
            };
            if asserted {
                let reset = match &design.signals()[register.signal.0].kind {
                    SignalKind::Register { reset, .. } => reset.value(),
                    _ => 0,
                };
                if let Some(slot) = reg_next.iter_mut().find(|(s, _)| *s == register.signal.0)
                {
                    slot.1 = reset;
                } else {
                    reg_next.push((register.signal.0, reset));
                }
            }
        }

        // Synchronous reads sample storage before this edge's writes.
        let mut read_next: Vec<(usize, u128)> = Vec::new();
        let mut writes: Vec<(usize, u128, u128)> = Vec::new();
        for (mem_index, memory) in design.memories().iter().enumerate() {
            for port in &memory.read_ports {
                if port.mode == ReadMode::Synchronous && port.clock == Some(clock) {
                    let addr = self.eval(&port.addr, state)?;
                    read_next
                        .push((port.data.0, state.memories[mem_index].read(addr.value())?));
                }
            }
            for port in &memory.write_ports {
                if port.clock != clock {
                    continue;
                }
                let enable = self.eval(&port.enable, state)?;
                if enable.is_zero() {
                    continue;
                }
                let addr = self.eval(&port.addr, state)?;
                let data = self.eval(&port.data, state)?;
                writes.push((mem_index, addr.value(), data.value()));
            }
        }

        for (slot, value) in reg_next.into_iter().chain(read_next) {
            state.values[slot] = value;
        }
        // In-order application makes the last declared port win on an
        // address conflict.
        for (mem_index, addr, data) in writes {
            state.memories[mem_index].write(addr, data)?;
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, state: &SimState) -> Result<BitVec> {
        let mut locals = Vec::new();
        self.eval_in(expr, state, &mut locals)
    }

    fn eval_in(
        &self,
        expr: &Expr,
        state: &SimState,
        locals: &mut Vec<(String, BitVec)>,
    ) -> Result<BitVec> {
        Ok(match expr {
            Expr::Literal(value) => *value,
            Expr::Signal(id) => {
                BitVec::new(state.values[id.0], self.design.width_of(*id))?
            }
            Expr::Local(name) => {
                // Elaboration proved the binding exists.
                locals
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| *v)
                    .ok_or(rhdl_bitvec::BitVecError::ZeroWidth)?
            }
            Expr::Slice { operand, high, low } => {
                self.eval_in(operand, state, locals)?.slice(*high, *low)?
            }
            Expr::Concat(parts) => {
                let parts = parts
                    .iter()
                    .map(|p| self.eval_in(p, state, locals))
                    .collect::<Result<Vec<_>>>()?;
                BitVec::concat(&parts)?
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval_in(lhs, state, locals)?;
                let b = self.eval_in(rhs, state, locals)?;
                match op {
                    BinaryOp::Add => a.add(&b)?,
                    BinaryOp::Sub => a.sub(&b)?,
                    BinaryOp::And => a.and(&b)?,
                    BinaryOp::Or => a.or(&b)?,
                    BinaryOp::Xor => a.xor(&b)?,
                    BinaryOp::Eq => a.eq_bit(&b)?,
                    BinaryOp::Ne => a.eq_bit(&b)?.not(),
                    BinaryOp::Lt => a.lt_u(&b)?,
                    BinaryOp::Le => a.le_u(&b)?,
                    BinaryOp::Gt => b.lt_u(&a)?,
                    BinaryOp::Ge => b.le_u(&a)?,
                    BinaryOp::Shl => a.shl(shift_amount(&b)),
                    BinaryOp::Shr => a.shr(shift_amount(&b)),
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.eval_in(operand, state, locals)?;
                match op {
                    UnaryOp::Not => value.not(),
                    UnaryOp::Neg => value.negate(),
                    UnaryOp::ReduceAnd => value.reduce_and(),
                    UnaryOp::ReduceOr => value.reduce_or(),
                    UnaryOp::ReduceXor => value.reduce_xor(),
                }
            }
            Expr::Mux { sel, then_, else_ } => {
                let sel = self.eval_in(sel, state, locals)?;
                if sel.is_zero() {
                    self.eval_in(else_, state, locals)?
                } else {
                    self.eval_in(then_, state, locals)?
                }
            }
            Expr::Case { sel, arms, default } => {
                let sel = self.eval_in(sel, state, locals)?;
                let mut result = None;
                for (key, arm) in arms {
                    if key.value() == sel.value() {
                        result = Some(self.eval_in(arm, state, locals)?);
                        break;
                    }
                }
                match result {
                    Some(value) => value,
                    None => self.eval_in(default, state, locals)?,
                }
            }
            Expr::Let { name, value, body } => {
                let bound = self.eval_in(value, state, locals)?;
                locals.push((name.clone(), bound));
                let result = self.eval_in(body, state, locals);
                locals.pop();
                result?
            }
        })
    }
}

/// Shift amounts larger than any width saturate; the kernel clears the
/// result for amounts at or past the operand width.
pub(crate) fn shift_amount(amount: &BitVec) -> u32 {
    amount.value().min(u32::MAX as u128) as u32
}
