//! JSON-wrapped memory snapshots.
//!
//! The wrapper is opaque to the core: a byte payload with an offset,
//! base64-encoded, stamped with wall-clock save times. Interpretation of
//! the bytes is application-level; the core only captures and restores
//! them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::handle::Simulation;
use crate::Result;

/// A saved span of one memory array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// Application-chosen discriminator for the payload.
    pub kind: String,
    /// Format version of the payload.
    pub version: u32,
    /// First cell the payload covers.
    pub offset: usize,
    /// Number of payload bytes.
    pub length: usize,
    /// Save time, milliseconds since the Unix epoch.
    pub saved_at_ms: u64,
    /// Save time, ISO-8601.
    pub saved_at_iso: String,
    /// Base64 payload.
    pub data_b64: String,
    /// Optional resume address for CPU-shaped applications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_pc: Option<u64>,
}

impl MemorySnapshot {
    /// Capture `length` bytes of `memory` starting at cell `offset`, one
    /// byte per cell.
    pub fn capture(
        sim: &mut Simulation,
        memory: &str,
        kind: &str,
        offset: usize,
        length: usize,
        start_pc: Option<u64>,
    ) -> Result<Self> {
        let mut bytes = Vec::with_capacity(length);
        for addr in offset..offset + length {
            bytes.push(sim.memory_read_byte(memory, addr as u128)?);
        }
        let now = Utc::now();
        Ok(Self {
            kind: kind.to_owned(),
            version: 1,
            offset,
            length,
            saved_at_ms: now.timestamp_millis().max(0) as u64,
            saved_at_iso: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            data_b64: STANDARD.encode(&bytes),
            start_pc,
        })
    }

    /// Write the payload back into `memory` at its recorded offset.
    /// Simulation state other than the targeted cells is untouched.
    pub fn restore(&self, sim: &mut Simulation, memory: &str) -> Result<()> {
        let bytes = self.decode()?;
        for (index, byte) in bytes.iter().enumerate() {
            sim.memory_write_byte(memory, (self.offset + index) as u128, *byte)?;
        }
        Ok(())
    }

    /// Decode the base64 payload.
    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data_b64)
            .map_err(|e| crate::SimulationError::SnapshotDecode(e.to_string()))
    }

    /// Serialize the wrapper to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a wrapper from JSON.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
