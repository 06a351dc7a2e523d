//! The simulation handle: one owner of all mutable simulation state, and
//! the uniform control surface over every backend.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rhdl_bir::{ClockId, Design, ResetKind, ResetPolarity, SignalKind};
use rhdl_bitvec::BitVec;
use tracing::trace;

use crate::bytecode::BytecodeEngine;
use crate::compiled::CompiledEngine;
use crate::error::SimulationError;
use crate::interp::InterpEngine;
use crate::params::{BackendKind, SimParams};
use crate::state::SimState;
use crate::trace::{Trace, TraceStatus};
use crate::Result;

/// Cooperative stop flag for long runs. Clone it into another thread and
/// call [`stop`](Self::stop); the running `run_*` call returns
/// [`RunState::Stopped`] at the next tick boundary. No partial-tick state
/// is ever exposed.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Fresh, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next tick boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Clear the flag so runs proceed again.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    /// True when a stop has been requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a `run_*` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// All requested ticks ran.
    Done {
        /// Ticks advanced.
        ticks: u64,
    },
    /// A breakpoint matched after `ticks` ticks.
    Break {
        /// Id of the matched breakpoint.
        id: usize,
        /// Ticks advanced, including the breaking one.
        ticks: u64,
    },
    /// The stop signal was observed between ticks.
    Stopped {
        /// Ticks advanced before stopping.
        ticks: u64,
    },
}

impl RunState {
    /// Ticks the call actually advanced.
    pub const fn ticks(&self) -> u64 {
        match self {
            RunState::Done { ticks }
            | RunState::Break { ticks, .. }
            | RunState::Stopped { ticks } => *ticks,
        }
    }
}

/// A watched `(signal, value)` pair for
/// [`Simulation::run_clock_ticks_with_watch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    /// Watched signal, by flat name.
    pub signal: String,
    /// Value whose arrival ends the run.
    pub value: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakpointKind {
    Cycle(u64),
    Signal(usize, u128),
}

/// A registered breakpoint. Evaluated between ticks during `run_*` calls;
/// referenced from outside by the id `add_breakpoint_*` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Breakpoint {
    id: usize,
    kind: BreakpointKind,
}

enum Engine {
    Interp(InterpEngine),
    Bytecode(BytecodeEngine),
    Compiled(CompiledEngine),
}

impl Engine {
    fn settle(&mut self, state: &mut SimState) -> Result<()> {
        match self {
            Engine::Interp(e) => e.settle(state),
            Engine::Bytecode(e) => e.settle(state),
            Engine::Compiled(e) => e.settle(state),
        }
    }

    fn tick_clock(&mut self, clock: ClockId, state: &mut SimState) -> Result<()> {
        match self {
            Engine::Interp(e) => e.tick_clock(clock, state),
            Engine::Bytecode(e) => e.tick_clock(clock, state),
            Engine::Compiled(e) => e.tick_clock(clock, state),
        }
    }
}

/// A running simulation of one elaborated design.
///
/// The handle exclusively owns register state, memory state, and the trace
/// buffer; peeks and pokes go through it. Several handles may share one
/// [`Design`] and run concurrently in separate threads; they share nothing
/// mutable. Within a handle everything is sequential: each tick is atomic
/// from the caller's view.
pub struct Simulation {
    design: Arc<Design>,
    backend: BackendKind,
    engine: Engine,
    state: SimState,
    trace: Trace,
    stop: StopSignal,
    breakpoints: Vec<Breakpoint>,
    next_breakpoint: usize,
    has_async_reset: bool,
}

impl Simulation {
    /// Create a handle over `design` with the chosen backend.
    pub fn new(design: Arc<Design>, backend: BackendKind, params: SimParams) -> Self {
        let engine = match backend {
            BackendKind::Interpreter => Engine::Interp(InterpEngine::new(Arc::clone(&design))),
            BackendKind::Bytecode => Engine::Bytecode(BytecodeEngine::new(&design)),
            BackendKind::Compiled => Engine::Compiled(CompiledEngine::new(&design)),
        };
        let state = SimState::new(&design);
        let has_async_reset = design.registers().iter().any(|r| {
            matches!(
                r.reset_spec,
                Some(spec) if spec.kind == ResetKind::Asynchronous
            )
        });
        Self {
            design,
            backend,
            engine,
            state,
            trace: Trace::new(params.trace_capacity),
            stop: StopSignal::new(),
            breakpoints: Vec::new(),
            next_breakpoint: 0,
            has_async_reset,
        }
    }

    /// Reference interpreter handle with default parameters.
    pub fn interpreter(design: Arc<Design>) -> Self {
        Self::new(design, BackendKind::Interpreter, SimParams::default())
    }

    /// Bytecode VM handle with default parameters.
    pub fn bytecode(design: Arc<Design>) -> Self {
        Self::new(design, BackendKind::Bytecode, SimParams::default())
    }

    /// Compiled handle with default parameters.
    pub fn compiled(design: Arc<Design>) -> Self {
        Self::new(design, BackendKind::Compiled, SimParams::default())
    }

    /// The shared, immutable design this handle runs.
    pub fn design(&self) -> &Arc<Design> {
        &self.design
    }

    /// Which backend this handle executes on.
    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    /// The cooperative stop flag; clone it to another thread to interrupt
    /// `run_*` calls between ticks.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Ticks of the default clock since construction or the last reset.
    pub fn tick_count(&self) -> u64 {
        self.design
            .default_clock()
            .map(|c| self.state.ticks[c.0])
            .unwrap_or(0)
    }

    /// Advance the default clock by one edge.
    pub fn tick(&mut self) -> Result<()> {
        let clock = self.design.default_clock().ok_or(SimulationError::NoClock)?;
        self.tick_on(clock)
    }

    /// Advance the default clock by `n` edges. `run_ticks(0)` is a no-op:
    /// neither register state nor the tick counter changes.
    pub fn run_ticks(&mut self, n: u64) -> Result<RunState> {
        let clock = self.design.default_clock().ok_or(SimulationError::NoClock)?;
        self.run_clock(clock, n)
    }

    /// Advance a named clock by `n` edges.
    pub fn run_clock_ticks(&mut self, clock: &str, n: u64) -> Result<RunState> {
        let clock = self.resolve_clock(clock)?;
        self.run_clock(clock, n)
    }

    /// Advance a named clock up to `n` edges, returning early when any
    /// watched signal changes to its stored value. Returns the number of
    /// ticks advanced: the matching tick, or `n` when nothing matched.
    pub fn run_clock_ticks_with_watch(
        &mut self,
        clock: &str,
        n: u64,
        watches: &[Watch],
    ) -> Result<u64> {
        let clock = self.resolve_clock(clock)?;
        let mut resolved = Vec::with_capacity(watches.len());
        self.settle_observed()?;
        for watch in watches {
            let id = self
                .design
                .signal_id(&watch.signal)
                .ok_or_else(|| SimulationError::UnknownSignal(watch.signal.clone()))?;
            resolved.push((id, watch.value, self.state.values[id.0]));
        }
        for i in 0..n {
            self.tick_on(clock)?;
            self.settle_observed()?;
            for (id, target, prev) in &mut resolved {
                let now = self.state.values[id.0];
                if now != *prev && now == *target {
                    return Ok(i + 1);
                }
                *prev = now;
            }
        }
        Ok(n)
    }

    /// Restore registers and memories to their declared reset values and
    /// zero every tick counter. Idempotent.
    pub fn reset(&mut self) {
        self.state.reset(&self.design);
    }

    /// Settle combinational values now, without advancing any clock. Peeks
    /// do this lazily; front-ends stepping "half a cycle" call it
    /// directly.
    pub fn settle(&mut self) -> Result<()> {
        self.settle_observed()
    }

    /// Current settled value of a signal, by flat name.
    pub fn peek(&mut self, signal: &str) -> Result<BitVec> {
        let id = self
            .design
            .signal_id(signal)
            .ok_or_else(|| SimulationError::UnknownSignal(signal.to_owned()))?;
        self.peek_by_idx(id.0)
    }

    /// Current settled value of a signal, by stable index. Indices are the
    /// design's signal ids and never change for a given design.
    pub fn peek_by_idx(&mut self, index: usize) -> Result<BitVec> {
        if index >= self.design.signals().len() {
            return Err(SimulationError::UnknownSignal(format!("#{index}")));
        }
        self.settle_observed()?;
        Ok(BitVec::new(
            self.state.values[index],
            self.design.signals()[index].width,
        )?)
    }

    /// Stable index of a signal name, for [`peek_by_idx`](Self::peek_by_idx).
    pub fn signal_index(&self, signal: &str) -> Option<usize> {
        self.design.signal_id(signal).map(|id| id.0)
    }

    /// Drive an input port. The next settle consumes the value.
    pub fn poke(&mut self, signal: &str, value: BitVec) -> Result<()> {
        let id = self
            .design
            .signal_id(signal)
            .ok_or_else(|| SimulationError::UnknownSignal(signal.to_owned()))?;
        let decl = &self.design.signals()[id.0];
        if !matches!(decl.kind, SignalKind::Input { .. }) {
            return Err(SimulationError::NotAnInput(signal.to_owned()));
        }
        if value.width() != decl.width {
            return Err(SimulationError::PokeWidth {
                signal: signal.to_owned(),
                expected: decl.width,
                actual: value.width(),
            });
        }
        self.state.values[id.0] = value.value();
        self.state.dirty = true;
        Ok(())
    }

    /// Read a memory cell, as if a read port fired this instant, bypassing
    /// the clock.
    pub fn memory_read(&mut self, memory: &str, addr: u128) -> Result<BitVec> {
        let id = self
            .design
            .memory_id(memory)
            .ok_or_else(|| SimulationError::UnknownMemory(memory.to_owned()))?;
        let bank = &self.state.memories[id.0];
        Ok(BitVec::new(bank.read(addr)?, bank.width)?)
    }

    /// Write a memory cell, as if a write port fired this instant,
    /// bypassing the clock.
    pub fn memory_write(&mut self, memory: &str, addr: u128, value: BitVec) -> Result<()> {
        let id = self
            .design
            .memory_id(memory)
            .ok_or_else(|| SimulationError::UnknownMemory(memory.to_owned()))?;
        self.state.memories[id.0].write(addr, value.value())?;
        self.state.dirty = true;
        Ok(())
    }

    /// Low byte of a memory cell.
    pub fn memory_read_byte(&mut self, memory: &str, addr: u128) -> Result<u8> {
        Ok((self.memory_read(memory, addr)?.value() & 0xff) as u8)
    }

    /// Write the low byte of a memory cell; upper bits clear.
    pub fn memory_write_byte(&mut self, memory: &str, addr: u128, value: u8) -> Result<()> {
        let id = self
            .design
            .memory_id(memory)
            .ok_or_else(|| SimulationError::UnknownMemory(memory.to_owned()))?;
        self.state.memories[id.0].write(addr, value as u128)?;
        self.state.dirty = true;
        Ok(())
    }

    /// Watch a signal in the trace buffer.
    pub fn trace_add_signal(&mut self, signal: &str) -> Result<()> {
        let id = self
            .design
            .signal_id(signal)
            .ok_or_else(|| SimulationError::UnknownSignal(signal.to_owned()))?;
        self.trace
            .add_signal(id, signal, self.design.signals()[id.0].width);
        Ok(())
    }

    /// Enable or disable per-tick capture. Enabling with an empty buffer
    /// records a baseline sample at the current tick so the dump starts
    /// from known values.
    pub fn set_trace_enabled(&mut self, enabled: bool) -> Result<()> {
        self.trace.enabled = enabled;
        if enabled && self.trace.is_empty() && self.trace.has_signals() {
            self.trace_capture()?;
        }
        Ok(())
    }

    /// True when per-tick capture is on.
    pub fn trace_enabled(&self) -> bool {
        self.trace.enabled
    }

    /// Capture a sample of every watched signal right now.
    pub fn trace_capture(&mut self) -> Result<()> {
        self.settle_observed()?;
        self.trace.capture(self.tick_count(), &self.state.values);
        Ok(())
    }

    /// Buffer fill, capacity, and drop counters.
    pub fn trace_status(&self) -> TraceStatus {
        self.trace.status()
    }

    /// Forget buffered samples; watched signals stay registered.
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Write the buffered samples as a Value Change Dump. Reads the buffer
    /// only; ticks are not blocked by concurrent emission of a snapshot
    /// taken earlier.
    pub fn write_vcd<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.trace.write_vcd(self.design.name(), w)
    }

    /// Break after the default clock reaches `cycle` ticks.
    pub fn add_breakpoint_cycle(&mut self, cycle: u64) -> usize {
        self.push_breakpoint(BreakpointKind::Cycle(cycle))
    }

    /// Break when `signal` settles to `value` after a tick.
    pub fn add_breakpoint_signal(&mut self, signal: &str, value: u128) -> Result<usize> {
        let id = self
            .design
            .signal_id(signal)
            .ok_or_else(|| SimulationError::UnknownSignal(signal.to_owned()))?;
        Ok(self.push_breakpoint(BreakpointKind::Signal(id.0, value)))
    }

    /// Remove one breakpoint; returns whether it existed.
    pub fn delete_breakpoint(&mut self, id: usize) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|b| b.id != id);
        self.breakpoints.len() != before
    }

    /// Remove all breakpoints.
    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    fn push_breakpoint(&mut self, kind: BreakpointKind) -> usize {
        let id = self.next_breakpoint;
        self.next_breakpoint += 1;
        self.breakpoints.push(Breakpoint { id, kind });
        id
    }

    fn resolve_clock(&self, clock: &str) -> Result<ClockId> {
        self.design
            .clock_id(clock)
            .ok_or_else(|| SimulationError::UnknownClock(clock.to_owned()))
    }

    fn run_clock(&mut self, clock: ClockId, n: u64) -> Result<RunState> {
        for i in 0..n {
            if self.stop.is_set() {
                trace!(ticks = i, "stop signal observed");
                return Ok(RunState::Stopped { ticks: i });
            }
            self.tick_on(clock)?;
            if let Some(id) = self.matched_breakpoint()? {
                return Ok(RunState::Break { id, ticks: i + 1 });
            }
        }
        Ok(RunState::Done { ticks: n })
    }

    fn matched_breakpoint(&mut self) -> Result<Option<usize>> {
        if self.breakpoints.is_empty() {
            return Ok(None);
        }
        if self
            .breakpoints
            .iter()
            .any(|b| matches!(b.kind, BreakpointKind::Signal(..)))
        {
            self.settle_observed()?;
        }
        let ticks = self.tick_count();
        for breakpoint in &self.breakpoints {
            let hit = match breakpoint.kind {
                BreakpointKind::Cycle(cycle) => ticks == cycle,
                BreakpointKind::Signal(slot, value) => self.state.values[slot] == value,
            };
            if hit {
                return Ok(Some(breakpoint.id));
            }
        }
        Ok(None)
    }

    /// One edge of `clock`: settle, sample-and-commit, count, and capture.
    fn tick_on(&mut self, clock: ClockId) -> Result<()> {
        self.settle_observed()?;
        self.engine.tick_clock(clock, &mut self.state)?;
        self.state.ticks[clock.0] += 1;
        self.state.dirty = true;
        if self.has_async_reset {
            // An asserted asynchronous reset must override the commit even
            // if nobody observes the state before the next edge.
            self.settle_observed()?;
        }
        if self.trace.enabled {
            self.settle_observed()?;
            self.trace.capture(self.tick_count(), &self.state.values);
        }
        Ok(())
    }

    /// Settle combinational values if anything changed since the last
    /// settle, then force asynchronously-reset registers and re-settle so
    /// downstream logic sees the forced values.
    fn settle_observed(&mut self) -> Result<()> {
        if !self.state.dirty {
            return Ok(());
        }
        self.engine.settle(&mut self.state)?;
        if self.force_async_resets() {
            self.engine.settle(&mut self.state)?;
            self.force_async_resets();
        }
        self.state.dirty = false;
        Ok(())
    }

    fn force_async_resets(&mut self) -> bool {
        let mut changed = false;
        for register in self.design.registers() {
            let Some(spec) = register.reset_spec else {
                continue;
            };
            if spec.kind != ResetKind::Asynchronous {
                continue;
            }
            let raw = self.state.values[spec.signal.0] & 1;
            let asserted = match spec.polarity {
                ResetPolarity::ActiveHigh => raw == 1,
                ResetPolarity::ActiveLow => raw == 0,
            };
            if !asserted {
                continue;
            }
            let reset = match &self.design.signals()[register.signal.0].kind {
                SignalKind::Register { reset, .. } => reset.value(),
                _ => 0,
            };
            if self.state.values[register.signal.0] != reset {
                self.state.values[register.signal.0] = reset;
                changed = true;
            }
        }
        changed
    }
}
