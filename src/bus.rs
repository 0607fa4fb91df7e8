//! Byte-oriented register bus
//!
//! The controller only needs "read/write one byte at device:register".
//! [`I2cBus`] does that over any `embedded-hal` I2C implementation, on Linux
//! through `/dev/i2c-N`. [`SimulatedBus`] keeps a register file in memory and
//! behaves like a bank of expanders whose input registers mirror their output
//! latches.

use crate::config::{BusConfig, BusKind};
use crate::error::{HeatshedError, Result};
use crate::logging::get_logger;
use crate::registers::{GPIOA, GPIOB, OLATA, OLATB};
use embedded_hal::i2c::I2c;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// Synchronous byte access to addressed devices. Every call may fail.
pub trait RegisterBus: Send {
    /// Write `value` into `register` of `device`
    fn write_byte(&mut self, device: u8, register: u8, value: u8) -> Result<()>;

    /// Read `register` of `device`
    fn read_byte(&mut self, device: u8, register: u8) -> Result<u8>;
}

/// Open the bus selected by `config`
pub fn open(config: &BusConfig) -> Result<Box<dyn RegisterBus>> {
    match config.kind {
        BusKind::I2c => open_i2c(config.bus_number),
        BusKind::Simulated => Ok(Box::new(SimulatedBus::new())),
    }
}

#[cfg(target_os = "linux")]
fn open_i2c(bus_number: u8) -> Result<Box<dyn RegisterBus>> {
    let path = format!("/dev/i2c-{}", bus_number);
    let dev = linux_embedded_hal::I2cdev::new(&path)
        .map_err(|e| HeatshedError::hardware(format!("cannot open {}: {}", path, e)))?;
    get_logger("bus").info(&format!("Opened I2C bus {}", path));
    Ok(Box::new(I2cBus::new(dev)))
}

#[cfg(not(target_os = "linux"))]
fn open_i2c(bus_number: u8) -> Result<Box<dyn RegisterBus>> {
    Err(HeatshedError::hardware(format!(
        "I2C bus {} requires Linux i2c-dev",
        bus_number
    )))
}

/// Register access over an `embedded-hal` I2C master
///
/// A write sends `[register, value]`; a read writes the register pointer and
/// reads one byte back in a repeated-start transaction.
#[derive(Debug)]
pub struct I2cBus<I> {
    i2c: I,
}

impl<I: I2c> I2cBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    /// Give back the underlying I2C master
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c + Send> RegisterBus for I2cBus<I> {
    fn write_byte(&mut self, device: u8, register: u8, value: u8) -> Result<()> {
        self.i2c.write(device, &[register, value]).map_err(|e| {
            HeatshedError::hardware(format!(
                "write to device 0x{:02x} register 0x{:02x} failed: {:?}",
                device, register, e
            ))
        })
    }

    fn read_byte(&mut self, device: u8, register: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(device, &[register], &mut buf)
            .map_err(|e| {
                HeatshedError::hardware(format!(
                    "read from device 0x{:02x} register 0x{:02x} failed: {:?}",
                    device, register, e
                ))
            })?;
        Ok(buf[0])
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    registers: BTreeMap<(u8, u8), u8>,
    failing: BTreeSet<u8>,
    writes: Vec<(u8, u8, u8)>,
}

/// In-memory expander bank
///
/// Clones share the same register file, so a test can keep a handle after
/// moving the bus into the controller.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        get_logger("bus").debug("Using simulated register bus");
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SimulatedState>> {
        self.state
            .lock()
            .map_err(|_| HeatshedError::hardware("simulated bus state poisoned"))
    }

    /// Current value of a register (0 when never written)
    pub fn register(&self, device: u8, register: u8) -> u8 {
        self.lock()
            .map(|s| s.registers.get(&(device, register)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Make every access to `device` fail until cleared
    pub fn fail_device(&self, device: u8, failing: bool) {
        if let Ok(mut s) = self.lock() {
            if failing {
                s.failing.insert(device);
            } else {
                s.failing.remove(&device);
            }
        }
    }

    /// Every successful write so far, as (device, register, value)
    pub fn writes(&self) -> Vec<(u8, u8, u8)> {
        self.lock().map(|s| s.writes.clone()).unwrap_or_default()
    }
}

impl RegisterBus for SimulatedBus {
    fn write_byte(&mut self, device: u8, register: u8, value: u8) -> Result<()> {
        let mut s = self.lock()?;
        if s.failing.contains(&device) {
            return Err(HeatshedError::hardware(format!(
                "write to device 0x{:02x} register 0x{:02x} failed",
                device, register
            )));
        }
        s.registers.insert((device, register), value);
        // Output pins read back what the latch drives
        match register {
            OLATA => {
                s.registers.insert((device, GPIOA), value);
            }
            OLATB => {
                s.registers.insert((device, GPIOB), value);
            }
            _ => {}
        }
        s.writes.push((device, register, value));
        Ok(())
    }

    fn read_byte(&mut self, device: u8, register: u8) -> Result<u8> {
        let s = self.lock()?;
        if s.failing.contains(&device) {
            return Err(HeatshedError::hardware(format!(
                "read from device 0x{:02x} register 0x{:02x} failed",
                device, register
            )));
        }
        Ok(s.registers.get(&(device, register)).copied().unwrap_or(0))
    }
}
