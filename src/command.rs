//! Pilot-wire commands
//!
//! Each heater is driven by a four-state pilot wire. The state is encoded on
//! the expander as two bits per wire; the mapping below is the half-wave
//! signalling convention the heaters understand and must not be renumbered.

use crate::error::{HeatshedError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of pilot wires driven by one expander module
pub const WIRES_PER_PHASE: usize = 8;

/// Number of phases, one expander module each
pub const PHASE_COUNT: usize = 3;

/// Desired or effective state of a single pilot wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// No signal: comfort
    On,
    /// Positive half-wave: off
    Off,
    /// Negative half-wave: frost guard
    FrostGuard,
    /// Full wave: economy
    Eco,
}

impl Command {
    /// All commands, in hardware code order
    pub const ALL: [Command; 4] = [
        Command::On,
        Command::Off,
        Command::FrostGuard,
        Command::Eco,
    ];

    /// Two-bit hardware code
    pub const fn code(self) -> u8 {
        match self {
            Command::On => 0b00,
            Command::Off => 0b01,
            Command::FrostGuard => 0b10,
            Command::Eco => 0b11,
        }
    }

    /// Decode the two low bits of `code`. Every 2-bit value is a command.
    pub const fn from_bits(code: u8) -> Self {
        match code & 0b11 {
            0b00 => Command::On,
            0b01 => Command::Off,
            0b10 => Command::FrostGuard,
            _ => Command::Eco,
        }
    }

    /// Strict conversion for values arriving from clients and stores
    pub fn from_code(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Command::On),
            1 => Ok(Command::Off),
            2 => Ok(Command::FrostGuard),
            3 => Ok(Command::Eco),
            other => Err(HeatshedError::invalid_command(other)),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Command::On => "on",
            Command::Off => "off",
            Command::FrostGuard => "frost_guard",
            Command::Eco => "eco",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i64> for Command {
    type Error = HeatshedError;

    fn try_from(value: i64) -> Result<Self> {
        Command::from_code(value)
    }
}

// Stores and clients exchange the numeric code, as the heater table always did
impl Serialize for Command {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Command::from_code(value).map_err(serde::de::Error::custom)
    }
}

/// The eight wires of one phase, wire 1 first
pub type PhaseCommands = [Command; WIRES_PER_PHASE];

/// Force the `forced_off` highest wires to OFF, keep the others as desired.
///
/// Wire 1 is the last one to be forced off.
pub fn apply_shedding(desired: &PhaseCommands, forced_off: usize) -> PhaseCommands {
    let limit = WIRES_PER_PHASE.saturating_sub(forced_off);
    let mut out = *desired;
    for (index, command) in out.iter_mut().enumerate() {
        if index >= limit {
            *command = Command::Off;
        }
    }
    out
}
