use crate::command::Command;
use serde::Serialize;

/// Shedding state of one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStatus {
    pub phase: u8,
    /// Number of highest wires currently forced off
    pub switched_off: u8,
    /// Persisted desired commands, wire 1 first
    pub desired: Vec<Command>,
    /// What the wires are actually driven with
    pub effective: Vec<Command>,
}

/// Snapshot of the controller for status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub phases: Vec<PhaseStatus>,
    /// Current statistics window, unix seconds
    pub window_start: f64,
    pub window_end: f64,
}
