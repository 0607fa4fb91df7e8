//! Heater bank driver
//!
//! One expander module per phase. The bank keeps the desired command of every
//! wire so that shed wires can be given back their command later; it is the
//! only component that talks to the bus.

use crate::bus::RegisterBus;
use crate::command::{Command, PHASE_COUNT, PhaseCommands, WIRES_PER_PHASE, apply_shedding};
use crate::error::{HeatshedError, Result};
use crate::logging::get_logger;
use crate::persistence::HeaterRow;
use crate::registers::{
    ALL_OUTPUTS, GPIOA, GPIOB, IODIRA, IODIRB, MODULE_BASE_ADDRESS, OLATA, OLATB, decode_commands,
    encode,
};

/// Bus address of the expander driving phase `index + 1`
pub fn module_address(index: usize) -> Result<u8> {
    if index >= PHASE_COUNT {
        return Err(HeatshedError::invalid_module(index));
    }
    Ok(MODULE_BASE_ADDRESS | index as u8)
}

fn phase_index(phase: u8) -> Result<usize> {
    match phase {
        1..=3 => Ok(usize::from(phase - 1)),
        other => Err(HeatshedError::invalid_phase(i64::from(other))),
    }
}

/// Desired-command table plus the bus it is applied to
pub struct HeaterBank {
    bus: Box<dyn RegisterBus>,
    desired: [PhaseCommands; PHASE_COUNT],
    logger: crate::logging::StructuredLogger,
}

impl HeaterBank {
    pub fn new(bus: Box<dyn RegisterBus>) -> Self {
        Self {
            bus,
            desired: [[Command::Off; WIRES_PER_PHASE]; PHASE_COUNT],
            logger: get_logger("heaters"),
        }
    }

    /// Configure both ports of every module as outputs
    pub fn init_modules(&mut self) -> Result<()> {
        for index in 0..PHASE_COUNT {
            let device = module_address(index)?;
            self.bus.write_byte(device, IODIRA, ALL_OUTPUTS)?;
            self.bus.write_byte(device, IODIRB, ALL_OUTPUTS)?;
            self.logger
                .debug(&format!("Module 0x{:02x} configured as outputs", device));
        }
        Ok(())
    }

    /// Read back what the module of `phase` currently drives
    pub fn read_states(&mut self, phase: u8) -> Result<PhaseCommands> {
        let device = module_address(phase_index(phase)?)?;
        self.bus.write_byte(device, IODIRA, ALL_OUTPUTS)?;
        let port_a = self.bus.read_byte(device, GPIOA)?;
        self.bus.write_byte(device, IODIRB, ALL_OUTPUTS)?;
        let port_b = self.bus.read_byte(device, GPIOB)?;
        Ok(decode_commands(port_a, port_b))
    }

    /// Drive the eight wires of `phase`. Does not touch the desired table.
    pub fn write_states(&mut self, phase: u8, commands: &PhaseCommands) -> Result<()> {
        let device = module_address(phase_index(phase)?)?;
        let (port_a, port_b) = encode(commands);
        self.bus.write_byte(device, IODIRA, ALL_OUTPUTS)?;
        self.bus.write_byte(device, OLATA, port_a)?;
        self.bus.write_byte(device, IODIRB, ALL_OUTPUTS)?;
        self.bus.write_byte(device, OLATB, port_b)?;
        self.logger.trace(&format!(
            "phase {} <- A=0b{:08b} B=0b{:08b}",
            phase, port_a, port_b
        ));
        Ok(())
    }

    /// Desired commands of `phase`, wire 1 first
    pub fn desired(&self, phase: u8) -> Result<PhaseCommands> {
        Ok(self.desired[phase_index(phase)?])
    }

    /// Rebuild the desired table from persisted rows and re-apply it.
    ///
    /// `switched_off[p]` highest wires of phase `p + 1` stay forced off. A
    /// phase's desired commands only change once its hardware write succeeded.
    pub fn load_from_persisted(
        &mut self,
        rows: &[HeaterRow],
        switched_off: [usize; PHASE_COUNT],
    ) -> Result<()> {
        let mut table = self.desired;
        for row in rows {
            let p = phase_index(row.phase)?;
            let w = match row.wire {
                1..=8 => usize::from(row.wire - 1),
                other => {
                    return Err(HeatshedError::invalid_wire(format!(
                        "heater {} has wire {}",
                        row.id, other
                    )));
                }
            };
            table[p][w] = row.command;
        }

        for (p, commands) in table.iter().enumerate() {
            let phase = p as u8 + 1;
            let effective = apply_shedding(commands, switched_off[p]);
            if let Err(e) = self.write_states(phase, &effective) {
                self.logger.error(&format!(
                    "Failed to apply commands to phase {}: {}",
                    phase, e
                ));
                return Err(e);
            }
            self.desired[p] = *commands;
        }
        Ok(())
    }
}
