//! Newline-delimited JSON control protocol between a UI host and the
//! simulator process.
//!
//! Command handlers return explicit results; a malformed line or unknown
//! command becomes an `error` event and the session continues. Only `quit`
//! ends the session.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use rhdl_sim::{RunState, Simulation};

/// Commands accepted on stdin, one JSON object per line.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Re-announce readiness and the design surface.
    Init,
    /// One full tick of the default clock.
    Step,
    /// Settle combinational logic without a clock edge.
    StepHalf,
    /// Run `cycles` ticks (default 1), honoring breakpoints.
    Run {
        /// Tick budget.
        cycles: Option<u64>,
    },
    /// Request a stop of an in-flight run at the next tick boundary.
    Stop,
    /// Reset registers, memories, and the tick counter.
    Reset,
    /// Run until a breakpoint or the continue budget is exhausted.
    Continue,
    /// Drive an input port.
    SetSignal {
        /// Flat signal path.
        path: String,
        /// New value.
        value: u128,
    },
    /// Add a cycle breakpoint (`cycle`) or a signal-value breakpoint
    /// (`signal` + `value`).
    AddBreakpoint {
        /// Breaking cycle count.
        cycle: Option<u64>,
        /// Watched signal path.
        signal: Option<String>,
        /// Breaking value.
        value: Option<u128>,
    },
    /// Alias for a signal-value breakpoint.
    AddWatchpoint {
        /// Watched signal path.
        signal: String,
        /// Breaking value.
        value: u128,
    },
    /// Remove one breakpoint by id.
    DeleteBreakpoint {
        /// Id from the `break`/`log` events.
        id: usize,
    },
    /// Remove all breakpoints.
    ClearBreakpoints,
    /// Forget captured waveform samples.
    ClearWaveforms,
    /// Write the captured waveform buffer as VCD.
    ExportVcd {
        /// Target path.
        filename: String,
    },
    /// End the session.
    Quit,
}

/// Events emitted on stdout, one JSON object per line.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// The simulator is ready for commands.
    Ready {
        /// Design name.
        design: String,
        /// Execution backend.
        backend: String,
    },
    /// Current simulation state snapshot.
    State {
        /// Ticks of the default clock.
        cycle: u64,
        /// Register values by flat name.
        registers: BTreeMap<String, u128>,
        /// Output port values by name.
        watches: BTreeMap<String, u128>,
    },
    /// Informational text.
    Log {
        /// Message.
        message: String,
    },
    /// A breakpoint fired.
    Break {
        /// Breakpoint id.
        id: usize,
        /// Tick at which it fired.
        cycle: u64,
    },
    /// A command failed; the session continues.
    Error {
        /// What went wrong.
        message: String,
    },
    /// The session is over.
    Quit,
}

/// Ticks `continue` advances before reporting back, so a runaway design
/// cannot wedge the host.
const CONTINUE_BUDGET: u64 = 1_000_000;

/// One interactive session over a simulation handle.
pub struct Session {
    sim: Simulation,
    done: bool,
}

impl Session {
    /// Wrap a handle; every output port is watched for waveform capture.
    pub fn new(mut sim: Simulation) -> Self {
        let outputs: Vec<String> = sim
            .design()
            .outputs()
            .iter()
            .map(|id| sim.design().signals()[id.0].name.clone())
            .collect();
        for name in outputs {
            // Output names come from the design itself.
            let _ = sim.trace_add_signal(&name);
        }
        let _ = sim.set_trace_enabled(true);
        Self { sim, done: false }
    }

    /// True once `quit` has been handled.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The ready announcement for session start.
    pub fn ready(&self) -> Event {
        Event::Ready {
            design: self.sim.design().name().to_owned(),
            backend: format!("{:?}", self.sim.backend()).to_lowercase(),
        }
    }

    /// Parse and handle one input line, producing the events to emit.
    pub fn handle_line(&mut self, line: &str) -> Vec<Event> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Command>(line) {
            Ok(command) => self.handle(command),
            Err(error) => vec![Event::Error {
                message: format!("malformed command: {error}"),
            }],
        }
    }

    fn handle(&mut self, command: Command) -> Vec<Event> {
        debug!(?command, "handling");
        match command {
            Command::Init => vec![self.ready(), self.state()],
            Command::Step => match self.sim.tick() {
                Ok(()) => vec![self.state()],
                Err(error) => vec![error_event(error)],
            },
            Command::StepHalf => match self.sim.settle() {
                Ok(()) => vec![self.state()],
                Err(error) => vec![error_event(error)],
            },
            Command::Run { cycles } => self.run(cycles.unwrap_or(1)),
            Command::Stop => {
                self.sim.stop_signal().stop();
                vec![Event::Log {
                    message: "stop requested".into(),
                }]
            }
            Command::Reset => {
                self.sim.reset();
                vec![self.state()]
            }
            Command::Continue => self.run(CONTINUE_BUDGET),
            Command::SetSignal { path, value } => {
                let result = self
                    .sim
                    .design()
                    .signal_id(&path)
                    .ok_or_else(|| rhdl_sim::SimulationError::UnknownSignal(path.clone()))
                    .and_then(|id| {
                        let width = self.sim.design().signals()[id.0].width;
                        let value = rhdl_bitvec::BitVec::new(value, width)?;
                        self.sim.poke(&path, value)
                    });
                match result {
                    Ok(()) => vec![self.state()],
                    Err(error) => vec![error_event(error)],
                }
            }
            Command::AddBreakpoint {
                cycle,
                signal,
                value,
            } => match (cycle, signal, value) {
                (Some(cycle), None, None) => {
                    let id = self.sim.add_breakpoint_cycle(cycle);
                    vec![Event::Log {
                        message: format!("breakpoint {id} at cycle {cycle}"),
                    }]
                }
                (None, Some(signal), Some(value)) => {
                    match self.sim.add_breakpoint_signal(&signal, value) {
                        Ok(id) => vec![Event::Log {
                            message: format!("breakpoint {id} on {signal} == {value}"),
                        }],
                        Err(error) => vec![error_event(error)],
                    }
                }
                _ => vec![Event::Error {
                    message: "breakpoint needs either `cycle` or `signal`+`value`".into(),
                }],
            },
            Command::AddWatchpoint { signal, value } => {
                match self.sim.add_breakpoint_signal(&signal, value) {
                    Ok(id) => vec![Event::Log {
                        message: format!("watchpoint {id} on {signal} == {value}"),
                    }],
                    Err(error) => vec![error_event(error)],
                }
            }
            Command::DeleteBreakpoint { id } => {
                if self.sim.delete_breakpoint(id) {
                    vec![Event::Log {
                        message: format!("breakpoint {id} removed"),
                    }]
                } else {
                    vec![Event::Error {
                        message: format!("no breakpoint {id}"),
                    }]
                }
            }
            Command::ClearBreakpoints => {
                self.sim.clear_breakpoints();
                vec![Event::Log {
                    message: "breakpoints cleared".into(),
                }]
            }
            Command::ClearWaveforms => {
                self.sim.clear_trace();
                vec![Event::Log {
                    message: "waveforms cleared".into(),
                }]
            }
            Command::ExportVcd { filename } => match self.export_vcd(&filename) {
                Ok(()) => vec![Event::Log {
                    message: format!("vcd written to {filename}"),
                }],
                Err(error) => vec![Event::Error {
                    message: format!("vcd export failed: {error}"),
                }],
            },
            Command::Quit => {
                self.done = true;
                vec![Event::Quit]
            }
        }
    }

    fn run(&mut self, cycles: u64) -> Vec<Event> {
        self.sim.stop_signal().clear();
        match self.sim.run_ticks(cycles) {
            Ok(RunState::Done { .. }) => vec![self.state()],
            Ok(RunState::Break { id, .. }) => vec![
                Event::Break {
                    id,
                    cycle: self.sim.tick_count(),
                },
                self.state(),
            ],
            Ok(RunState::Stopped { ticks }) => vec![
                Event::Log {
                    message: format!("stopped after {ticks} ticks"),
                },
                self.state(),
            ],
            Err(error) => vec![error_event(error)],
        }
    }

    fn export_vcd(&mut self, filename: &str) -> std::io::Result<()> {
        let file = File::create(filename)?;
        let mut writer = BufWriter::new(file);
        self.sim.write_vcd(&mut writer)?;
        writer.flush()
    }

    fn state(&mut self) -> Event {
        let mut registers = BTreeMap::new();
        let register_ids: Vec<_> = self
            .sim
            .design()
            .registers()
            .iter()
            .map(|r| r.signal)
            .collect();
        for id in register_ids {
            let name = self.sim.design().signals()[id.0].name.clone();
            if let Ok(value) = self.sim.peek_by_idx(id.0) {
                registers.insert(name, value.value());
            }
        }
        let mut watches = BTreeMap::new();
        let output_ids: Vec<_> = self.sim.design().outputs().to_vec();
        for id in output_ids {
            let name = self.sim.design().signals()[id.0].name.clone();
            if let Ok(value) = self.sim.peek_by_idx(id.0) {
                watches.insert(name, value.value());
            }
        }
        Event::State {
            cycle: self.sim.tick_count(),
            registers,
            watches,
        }
    }
}

fn error_event(error: rhdl_sim::SimulationError) -> Event {
    Event::Error {
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rhdl_bir::{dsl::*, ComponentBuilder, Design, Registry};
    use rhdl_bitvec::BitVec;
    use rhdl_sim::Simulation;

    use super::*;

    fn counter_session() -> Session {
        let mut b = ComponentBuilder::new("counter");
        let clk = b.clock("clk");
        let q = b.register("q", 4, BitVec::zero(4).unwrap(), clk).unwrap();
        let count = b.output("count", 4).unwrap();
        b.assign(count, sig(q)).unwrap();
        b.process(clk).rule(q, add(sig(q), lit(1, 4)));
        let design =
            Arc::new(Design::elaborate(&b.build().unwrap(), &Registry::new()).unwrap());
        Session::new(Simulation::bytecode(design))
    }

    fn state_cycle(event: &Event) -> u64 {
        match event {
            Event::State { cycle, .. } => *cycle,
            other => panic!("expected a state event, got {other:?}"),
        }
    }

    #[test]
    fn step_and_run_advance_the_cycle() {
        let mut session = counter_session();
        let events = session.handle_line(r#"{"cmd":"step"}"#);
        assert_eq!(state_cycle(&events[0]), 1);
        let events = session.handle_line(r#"{"cmd":"run","cycles":5}"#);
        assert_eq!(state_cycle(&events[0]), 6);
    }

    #[test]
    fn state_carries_registers_and_watches() {
        let mut session = counter_session();
        session.handle_line(r#"{"cmd":"run","cycles":3}"#);
        let events = session.handle_line(r#"{"cmd":"init"}"#);
        match &events[1] {
            Event::State {
                registers, watches, ..
            } => {
                assert_eq!(registers.get("q"), Some(&3));
                assert_eq!(watches.get("count"), Some(&3));
            }
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[test]
    fn malformed_and_unknown_commands_are_errors_not_exits() {
        let mut session = counter_session();
        let events = session.handle_line("{ nonsense");
        assert!(matches!(events[0], Event::Error { .. }));
        let events = session.handle_line(r#"{"cmd":"warp_ten"}"#);
        assert!(matches!(events[0], Event::Error { .. }));
        assert!(!session.is_done());
    }

    #[test]
    fn breakpoints_break_runs() {
        let mut session = counter_session();
        session.handle_line(r#"{"cmd":"add_breakpoint","cycle":4}"#);
        let events = session.handle_line(r#"{"cmd":"run","cycles":10}"#);
        assert!(matches!(events[0], Event::Break { cycle: 4, .. }));
    }

    #[test]
    fn set_signal_rejects_unknown_paths() {
        let mut session = counter_session();
        let events = session.handle_line(r#"{"cmd":"set_signal","path":"ghost","value":1}"#);
        assert!(matches!(events[0], Event::Error { .. }));
    }

    #[test]
    fn reset_zeroes_the_cycle() {
        let mut session = counter_session();
        session.handle_line(r#"{"cmd":"run","cycles":7}"#);
        let events = session.handle_line(r#"{"cmd":"reset"}"#);
        assert_eq!(state_cycle(&events[0]), 0);
    }

    #[test]
    fn quit_ends_the_session() {
        let mut session = counter_session();
        let events = session.handle_line(r#"{"cmd":"quit"}"#);
        assert!(matches!(events[0], Event::Quit));
        assert!(session.is_done());
    }
}
