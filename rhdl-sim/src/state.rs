use rhdl_bir::{Design, SignalKind};
use rhdl_bitvec::{mask, Width, Word};

use crate::error::SimulationError;
use crate::Result;

/// Storage of one memory array.
#[derive(Debug, Clone)]
pub(crate) struct MemBank {
    pub name: String,
    pub width: Width,
    pub cells: Vec<Word>,
}

impl MemBank {
    pub fn read(&self, addr: Word) -> Result<Word> {
        usize::try_from(addr)
            .ok()
            .and_then(|index| self.cells.get(index))
            .copied()
            .ok_or_else(|| SimulationError::AddressOutOfRange {
                memory: self.name.clone(),
                addr,
                depth: self.cells.len(),
            })
    }

    pub fn write(&mut self, addr: Word, value: Word) -> Result<()> {
        let depth = self.cells.len();
        let masked = value & mask(self.width);
        let cell = usize::try_from(addr)
            .ok()
            .and_then(|index| self.cells.get_mut(index))
            .ok_or_else(|| SimulationError::AddressOutOfRange {
                memory: self.name.clone(),
                addr,
                depth,
            })?;
        *cell = masked;
        Ok(())
    }
}

/// All mutable state of one simulation handle: signal values, memory
/// storage, and per-clock tick counters. Exclusively owned by the handle.
#[derive(Debug, Clone)]
pub(crate) struct SimState {
    pub values: Vec<Word>,
    pub memories: Vec<MemBank>,
    pub ticks: Vec<u64>,
    /// Set after anything that can invalidate combinational values; the
    /// next observation settles first.
    pub dirty: bool,
}

impl SimState {
    pub fn new(design: &Design) -> Self {
        let values = design
            .signals()
            .iter()
            .map(|signal| match &signal.kind {
                SignalKind::Input { default } => default.value(),
                SignalKind::Register { reset, .. } => reset.value(),
                _ => 0,
            })
            .collect();
        let memories = design
            .memories()
            .iter()
            .map(|memory| MemBank {
                name: memory.name.clone(),
                width: memory.width,
                cells: vec![0; memory.depth],
            })
            .collect();
        Self {
            values,
            memories,
            ticks: vec![0; design.clocks().len()],
            dirty: true,
        }
    }

    /// Restore declared reset values: registers to their reset constants,
    /// memories to zero, tick counters to zero. Poked inputs are external
    /// state and keep their values.
    pub fn reset(&mut self, design: &Design) {
        for register in design.registers() {
            let reset = match &design.signals()[register.signal.0].kind {
                SignalKind::Register { reset, .. } => reset.value(),
                _ => 0,
            };
            self.values[register.signal.0] = reset;
        }
        // Synchronous read data wires are storage too.
        for memory in design.memories() {
            for port in &memory.read_ports {
                if port.mode == rhdl_bir::ReadMode::Synchronous {
                    self.values[port.data.0] = 0;
                }
            }
        }
        for bank in &mut self.memories {
            bank.cells.fill(0);
        }
        self.ticks.fill(0);
        self.dirty = true;
    }
}
