//! # Heatshed - load shedding for pilot-wire electric heaters
//!
//! Watches a three-phase installation through the utility meter's teleinfo
//! serial stream and sheds pilot-wire heaters, highest wire first, whenever a
//! phase draws too much current. Heaters are driven through one GPIO expander
//! per phase; desired commands and daily statistics are persisted.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: structured logging and tracing
//! - `command`: pilot-wire commands and their hardware codes
//! - `registers`: expander register map and bit packing
//! - `bus`: register bus capability and the simulated expander bank
//! - `heaters`: heater bank driver
//! - `teleinfo`: teleinfo line decoder and serial line reader
//! - `clock`: wall-clock capability
//! - `statistics`: time-weighted daily statistics
//! - `persistence`: command and statistics stores
//! - `notify`: notification fan-out
//! - `controller`: load-shedding controller and its task loop
//! - `web`: HTTP API and event stream

pub mod bus;
pub mod clock;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod heaters;
pub mod logging;
pub mod notify;
pub mod persistence;
pub mod registers;
pub mod statistics;
pub mod teleinfo;
pub mod web;

// Re-export commonly used types
pub use command::Command;
pub use config::Config;
pub use controller::{Controller, ControllerHandle};
pub use error::{HeatshedError, Result};
