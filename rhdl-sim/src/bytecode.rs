//! Bytecode backend: each design compiles once into linear opcode streams
//! over a slot file (one slot per signal, plus temporaries), then a small VM
//! executes the streams per tick. The combinational stream is emitted in the
//! design's settle order, so every opcode's inputs are produced by earlier
//! opcodes; each clock gets a second stream that samples into temporaries
//! and commits them atomically.

use std::sync::Arc;

use rhdl_bir::{
    BinaryOp, ClockId, CombOp, Design, Expr, ReadMode, ResetKind, ResetPolarity, SignalKind,
    UnaryOp,
};
use rhdl_bitvec::{mask, Width, Word};

use crate::ops::{apply_binary, apply_unary};
use crate::state::{MemBank, SimState};
use crate::Result;

/// Slot reference; the high bit selects the temporary file.
type Slot = u32;
const TEMP_BIT: Slot = 1 << 31;

#[derive(Debug, Clone)]
enum Op {
    Const {
        dst: Slot,
        value: Word,
    },
    Copy {
        dst: Slot,
        src: Slot,
    },
    Binary {
        op: BinaryOp,
        dst: Slot,
        lhs: Slot,
        rhs: Slot,
        width: Width,
    },
    Unary {
        op: UnaryOp,
        dst: Slot,
        src: Slot,
        width: Width,
    },
    Slice {
        dst: Slot,
        src: Slot,
        high: Width,
        low: Width,
    },
    Concat {
        dst: Slot,
        /// MSB-first `(slot, width)` parts.
        parts: Vec<(Slot, Width)>,
    },
    Mux {
        dst: Slot,
        sel: Slot,
        then_: Slot,
        else_: Slot,
    },
    Case {
        dst: Slot,
        sel: Slot,
        arms: Vec<(Word, Slot)>,
        default: Slot,
    },
    MemRead {
        dst: Slot,
        memory: usize,
        addr: Slot,
    },
}

#[derive(Debug, Clone)]
struct MemWriteOp {
    memory: usize,
    addr: Slot,
    data: Slot,
    enable: Slot,
}

#[derive(Debug, Clone, Default)]
struct ClockProgram {
    eval: Vec<Op>,
    /// `(signal slot, sampled slot)` pairs applied after `eval` completes.
    commits: Vec<(usize, Slot)>,
    /// Applied after the commits, in declaration order; on an address
    /// conflict the last write wins.
    writes: Vec<MemWriteOp>,
}

pub(crate) struct BytecodeEngine {
    comb: Vec<Op>,
    clocks: Vec<ClockProgram>,
    temps: Vec<Word>,
}

impl BytecodeEngine {
    pub fn new(design: &Arc<Design>) -> Self {
        let mut compiler = Compiler {
            design: design.as_ref(),
            temps: 0,
            code: Vec::new(),
        };

        for op in design.comb_order() {
            match *op {
                CombOp::Assign(index) => {
                    let assignment = &design.assignments()[index];
                    let mut env = Vec::new();
                    let (src, _) = compiler.expr(&assignment.expr, &mut env);
                    compiler.code.push(Op::Copy {
                        dst: assignment.lhs.0 as Slot,
                        src,
                    });
                }
                CombOp::MemRead { memory, port } => {
                    let port = &design.memories()[memory.0].read_ports[port];
                    let mut env = Vec::new();
                    let (addr, _) = compiler.expr(&port.addr, &mut env);
                    compiler.code.push(Op::MemRead {
                        dst: port.data.0 as Slot,
                        memory: memory.0,
                        addr,
                    });
                }
            }
        }
        let comb = std::mem::take(&mut compiler.code);

        let mut clocks = Vec::new();
        for clock_index in 0..design.clocks().len() {
            clocks.push(compiler.clock_program(ClockId(clock_index)));
        }

        Self {
            comb,
            clocks,
            temps: vec![0; compiler.temps as usize],
        }
    }

    pub fn settle(&mut self, state: &mut SimState) -> Result<()> {
        exec(&self.comb, &mut self.temps, &mut state.values, &state.memories)
    }

    pub fn tick_clock(&mut self, clock: ClockId, state: &mut SimState) -> Result<()> {
        let program = &self.clocks[clock.0];
        exec(
            &program.eval,
            &mut self.temps,
            &mut state.values,
            &state.memories,
        )?;
        // Sample everything against the pre-edge snapshot before any slot
        // or memory cell changes; the commit is atomic per edge.
        let next: Vec<(usize, Word)> = program
            .commits
            .iter()
            .map(|&(signal, src)| (signal, read(&self.temps, &state.values, src)))
            .collect();
        let mut writes: Vec<(usize, Word, Word)> = Vec::new();
        for write in &program.writes {
            if read(&self.temps, &state.values, write.enable) & 1 == 1 {
                writes.push((
                    write.memory,
                    read(&self.temps, &state.values, write.addr),
                    read(&self.temps, &state.values, write.data),
                ));
            }
        }
        for (signal, value) in next {
            state.values[signal] = value;
        }
        for (memory, addr, data) in writes {
            state.memories[memory].write(addr, data)?;
        }
        Ok(())
    }
}

#[inline]
fn read(temps: &[Word], values: &[Word], slot: Slot) -> Word {
    if slot & TEMP_BIT != 0 {
        temps[(slot & !TEMP_BIT) as usize]
    } else {
        values[slot as usize]
    }
}

#[inline]
fn write(temps: &mut [Word], values: &mut [Word], slot: Slot, value: Word) {
    if slot & TEMP_BIT != 0 {
        temps[(slot & !TEMP_BIT) as usize] = value;
    } else {
        values[slot as usize] = value;
    }
}

fn exec(
    code: &[Op],
    temps: &mut [Word],
    values: &mut [Word],
    memories: &[MemBank],
) -> Result<()> {
    for op in code {
        match op {
            Op::Const { dst, value } => write(temps, values, *dst, *value),
            Op::Copy { dst, src } => {
                let v = read(temps, values, *src);
                write(temps, values, *dst, v);
            }
            Op::Binary {
                op,
                dst,
                lhs,
                rhs,
                width,
            } => {
                let a = read(temps, values, *lhs);
                let b = read(temps, values, *rhs);
                write(temps, values, *dst, apply_binary(*op, a, b, *width));
            }
            Op::Unary {
                op,
                dst,
                src,
                width,
            } => {
                let a = read(temps, values, *src);
                write(temps, values, *dst, apply_unary(*op, a, *width));
            }
            Op::Slice {
                dst,
                src,
                high,
                low,
            } => {
                let a = read(temps, values, *src);
                write(temps, values, *dst, a >> low & mask(high - low + 1));
            }
            Op::Concat { dst, parts } => {
                let mut acc: Word = 0;
                for &(slot, width) in parts {
                    acc = acc << width | read(temps, values, slot);
                }
                write(temps, values, *dst, acc);
            }
            Op::Mux {
                dst,
                sel,
                then_,
                else_,
            } => {
                let slot = if read(temps, values, *sel) & 1 == 1 {
                    *then_
                } else {
                    *else_
                };
                let v = read(temps, values, slot);
                write(temps, values, *dst, v);
            }
            Op::Case {
                dst,
                sel,
                arms,
                default,
            } => {
                let key = read(temps, values, *sel);
                let slot = arms
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, s)| *s)
                    .unwrap_or(*default);
                let v = read(temps, values, slot);
                write(temps, values, *dst, v);
            }
            Op::MemRead { dst, memory, addr } => {
                let addr = read(temps, values, *addr);
                let v = memories[*memory].read(addr)?;
                write(temps, values, *dst, v);
            }
        }
    }
    Ok(())
}

struct Compiler<'d> {
    design: &'d Design,
    temps: u32,
    code: Vec<Op>,
}

impl Compiler<'_> {
    fn temp(&mut self) -> Slot {
        let slot = self.temps | TEMP_BIT;
        self.temps += 1;
        slot
    }

    /// Compile `expr` into the current stream; returns the slot holding the
    /// result and its width. Values in slots are always masked to their
    /// width.
    fn expr(&mut self, expr: &Expr, env: &mut Vec<(String, Slot, Width)>) -> (Slot, Width) {
        match expr {
            Expr::Literal(value) => {
                let dst = self.temp();
                self.code.push(Op::Const {
                    dst,
                    value: value.value(),
                });
                (dst, value.width())
            }
            Expr::Signal(id) => (id.0 as Slot, self.design.width_of(*id)),
            Expr::Local(name) => env
                .iter()
                .rev()
                .find(|(n, _, _)| n == name)
                .map(|(_, slot, width)| (*slot, *width))
                .unwrap_or_else(|| {
                    // Elaboration rejects unbound locals before compilation.
                    unreachable!("unbound local `{name}`")
                }),
            Expr::Slice { operand, high, low } => {
                let (src, _) = self.expr(operand, env);
                let dst = self.temp();
                self.code.push(Op::Slice {
                    dst,
                    src,
                    high: *high,
                    low: *low,
                });
                (dst, high - low + 1)
            }
            Expr::Concat(parts) => {
                let compiled: Vec<(Slot, Width)> =
                    parts.iter().map(|p| self.expr(p, env)).collect();
                let width = compiled.iter().map(|(_, w)| *w).sum();
                let dst = self.temp();
                self.code.push(Op::Concat {
                    dst,
                    parts: compiled,
                });
                (dst, width)
            }
            Expr::Binary { op, lhs, rhs } => {
                let (a, width) = self.expr(lhs, env);
                let (b, _) = self.expr(rhs, env);
                let dst = self.temp();
                self.code.push(Op::Binary {
                    op: *op,
                    dst,
                    lhs: a,
                    rhs: b,
                    width,
                });
                (dst, if op.is_comparison() { 1 } else { width })
            }
            Expr::Unary { op, operand } => {
                let (src, width) = self.expr(operand, env);
                let dst = self.temp();
                self.code.push(Op::Unary {
                    op: *op,
                    dst,
                    src,
                    width,
                });
                (dst, if op.is_reduction() { 1 } else { width })
            }
            Expr::Mux { sel, then_, else_ } => {
                let (sel, _) = self.expr(sel, env);
                let (t, width) = self.expr(then_, env);
                let (e, _) = self.expr(else_, env);
                let dst = self.temp();
                self.code.push(Op::Mux {
                    dst,
                    sel,
                    then_: t,
                    else_: e,
                });
                (dst, width)
            }
            Expr::Case { sel, arms, default } => {
                let (sel, _) = self.expr(sel, env);
                let compiled: Vec<(Word, Slot)> = arms
                    .iter()
                    .map(|(key, arm)| (key.value(), self.expr(arm, env).0))
                    .collect();
                let (default, width) = self.expr(default, env);
                let dst = self.temp();
                self.code.push(Op::Case {
                    dst,
                    sel,
                    arms: compiled,
                    default,
                });
                (dst, width)
            }
            Expr::Let { name, value, body } => {
                let (slot, width) = self.expr(value, env);
                env.push((name.clone(), slot, width));
                let result = self.expr(body, env);
                env.pop();
                result
            }
        }
    }

    /// Compile the sample-and-commit stream for one clock.
    fn clock_program(&mut self, clock: ClockId) -> ClockProgram {
        debug_assert!(self.code.is_empty());
        let design = self.design;
        let mut commits: Vec<(usize, Slot)> = Vec::new();

        for process in design.processes() {
            if process.clock != clock {
                continue;
            }
            for rule in &process.rules {
                let mut env = Vec::new();
                let (slot, _) = self.expr(&rule.expr, &mut env);
                commits.push((rule.lhs.0, slot));
            }
        }

        // Fuse synchronous resets as a mux in front of the commit.
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
            let asserted = match spec.polarity {
                ResetPolarity::ActiveHigh => spec.signal.0 as Slot,
                ResetPolarity::ActiveLow => {
                    let dst = self.temp();
                    self.code.push(Op::Unary {
                        op: UnaryOp::Not,
                        dst,
                        src: spec.signal.0 as Slot,
                        width: 1,
                    });
                    dst
                }
            };
            let reset_value = match &design.signals()[register.signal.0].kind {
                SignalKind::Register { reset, .. } => reset.value(),
                _ => 0,
            };
            let reset_slot = self.temp();
            self.code.push(Op::Const {
                dst: reset_slot,
                value: reset_value,
            });
            let held = commits
                .iter()
                .position(|(signal, _)| *signal == register.signal.0);
            let current = match held {
                Some(index) => commits[index].1,
                None => register.signal.0 as Slot,
            };
            let dst = self.temp();
            self.code.push(Op::Mux {
                dst,
                sel: asserted,
                then_: reset_slot,
                else_: current,
            });
            match held {
                Some(index) => commits[index].1 = dst,
                None => commits.push((register.signal.0, dst)),
            }
        }

        // Synchronous reads sample storage before this edge's writes land.
        let mut writes = Vec::new();
        for (mem_index, memory) in design.memories().iter().enumerate() {
            for port in &memory.read_ports {
                if port.mode == ReadMode::Synchronous && port.clock == Some(clock) {
                    let mut env = Vec::new();
                    let (addr, _) = self.expr(&port.addr, &mut env);
                    let dst = self.temp();
                    self.code.push(Op::MemRead {
                        dst,
                        memory: mem_index,
                        addr,
                    });
                    commits.push((port.data.0, dst));
                }
            }
            for port in &memory.write_ports {
                if port.clock != clock {
                    continue;
                }
                let mut env = Vec::new();
                let (enable, _) = self.expr(&port.enable, &mut env);
                let (addr, _) = self.expr(&port.addr, &mut env);
                let (data, _) = self.expr(&port.data, &mut env);
                writes.push(MemWriteOp {
                    memory: mem_index,
                    addr,
                    data,
                    enable,
                });
            }
        }

        ClockProgram {
            eval: std::mem::take(&mut self.code),
            commits,
            writes,
        }
    }
}
