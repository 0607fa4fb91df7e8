//! Load-shedding controller
//!
//! Owns the per-phase shed count, the heater bank and the statistics window.
//! Each phase keeps a stack of forced-off wires growing from wire 8 down to
//! wire 1: a reading at or above [`SHED_THRESHOLD_AMPERES`] forces one more
//! wire off, any lower reading gives one wire back. Restoration is paced at
//! one wire per reading.
//!
//! The controller runs as a single task (see [`Controller::run`]); serial lines
//! and transport requests are processed one at a time, so the desired table
//! and the shed counts are never touched concurrently.

mod commands;
mod types;

pub use commands::{COMMAND_BUFFER, ControllerCommand, ControllerHandle};
pub use types::{ControllerStatus, PhaseStatus};

use crate::bus::RegisterBus;
use crate::clock::Clock;
use crate::command::{Command, PHASE_COUNT, PhaseCommands, WIRES_PER_PHASE, apply_shedding};
use crate::error::{HeatshedError, Result};
use crate::heaters::HeaterBank;
use crate::logging::{StructuredLogger, get_logger};
use crate::notify::{HistorySnapshot, Notification, NotificationBus};
use crate::persistence::{CommandStore, HeaterRow, HistoryRange, StatisticsStore};
use crate::statistics::StatisticsAggregator;
use crate::teleinfo::{Reading, TariffPeriod, decode_line};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Phase current at or above which one more heater is shed
pub const SHED_THRESHOLD_AMPERES: u32 = 30;

fn phase_index(phase: u8) -> Result<usize> {
    match phase {
        1..=3 => Ok(usize::from(phase - 1)),
        other => Err(HeatshedError::invalid_phase(i64::from(other))),
    }
}

/// The load-shedding controller
pub struct Controller {
    bank: HeaterBank,
    commands: Box<dyn CommandStore>,
    statistics: StatisticsAggregator,
    clock: Arc<dyn Clock>,
    notifications: Arc<NotificationBus>,

    /// Forced-off wires per phase, 0..=8
    switched_off: [usize; PHASE_COUNT],

    logger: StructuredLogger,
}

impl Controller {
    /// Build the controller and configure every expander module.
    ///
    /// A bus failure here is fatal.
    pub fn new(
        bus: Box<dyn RegisterBus>,
        commands: Box<dyn CommandStore>,
        statistics: Box<dyn StatisticsStore>,
        clock: Arc<dyn Clock>,
        notifications: Arc<NotificationBus>,
    ) -> Result<Self> {
        let logger = get_logger("controller");
        let mut bank = HeaterBank::new(bus);
        bank.init_modules().map_err(|e| {
            logger.error(&format!("Failed to initialise expander modules: {}", e));
            e
        })?;
        logger.info("Expander modules initialised");

        Ok(Self {
            bank,
            commands,
            statistics: StatisticsAggregator::new(clock.clone(), statistics),
            clock,
            notifications,
            switched_off: [0; PHASE_COUNT],
            logger,
        })
    }

    /// Apply the persisted commands and log what each module reads back
    pub fn start(&mut self) -> Result<()> {
        self.load_from_persisted()?;
        for phase in 1..=PHASE_COUNT as u8 {
            match self.bank.read_states(phase) {
                Ok(states) => self.logger.info(&format!(
                    "Phase {} reads back [{}]",
                    phase,
                    states
                        .iter()
                        .map(|c| c.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
                Err(e) => self
                    .logger
                    .warn(&format!("Failed to read back phase {}: {}", phase, e)),
            }
        }
        Ok(())
    }

    /// Reload the desired table from the command store and re-apply it,
    /// keeping currently shed wires off
    pub fn load_from_persisted(&mut self) -> Result<()> {
        let rows = self.commands.all().map_err(|e| {
            self.logger
                .error(&format!("Failed to read persisted commands: {}", e));
            e
        })?;
        self.bank.load_from_persisted(&rows, self.switched_off)
    }

    /// Decode and react to one serial line. Bad lines are skipped.
    pub fn handle_line(&mut self, line: &str) {
        let reading = match decode_line(line, self.clock.now_secs()) {
            Ok(Some(reading)) => reading,
            Ok(None) => return,
            Err(e) => {
                self.logger
                    .debug(&format!("Skipping line '{}': {}", line.trim(), e));
                return;
            }
        };
        if let Err(e) = self.on_reading(reading) {
            self.logger
                .error(&format!("Failed to handle {:?}: {}", reading, e));
        }
    }

    /// Publish a reading, account for it, then react to it
    pub fn on_reading(&mut self, reading: Reading) -> Result<()> {
        match reading {
            Reading::Current {
                phase,
                amperes,
                overload,
            } => {
                self.notifications.publish(&Notification::Current {
                    phase,
                    value: amperes,
                });
                self.statistics.add_intensity(phase, amperes)?;
                if overload {
                    self.logger.warn(&format!(
                        "Overload warning on phase {} ({} A)",
                        phase, amperes
                    ));
                    self.shed_one_more(phase)
                } else {
                    self.on_current_reading(phase, amperes)
                }
            }
            Reading::Meter { period, value } => {
                self.notifications
                    .publish(&Notification::Meter { period, value });
                match period {
                    TariffPeriod::Standard => self.statistics.add_standard_meter(value),
                    TariffPeriod::Savings => self.statistics.add_savings_meter(value),
                }
                Ok(())
            }
            Reading::Power { timestamp, watts } => {
                self.notifications.publish(&Notification::Power {
                    time: timestamp,
                    value: watts,
                });
                self.statistics.add_power(watts);
                Ok(())
            }
        }
    }

    /// Shed or restore one wire depending on the phase current
    pub fn on_current_reading(&mut self, phase: u8, amperes: u32) -> Result<()> {
        if amperes >= SHED_THRESHOLD_AMPERES {
            self.shed_one_more(phase)
        } else {
            self.restore_one_more(phase)
        }
    }

    /// Force the next highest wire off. No-op once all eight are off.
    pub fn shed_one_more(&mut self, phase: u8) -> Result<()> {
        let p = phase_index(phase)?;
        if self.switched_off[p] >= WIRES_PER_PHASE {
            return Ok(());
        }
        let effective = apply_shedding(&self.bank.desired(phase)?, self.switched_off[p] + 1);
        self.bank.write_states(phase, &effective)?;
        self.switched_off[p] += 1;

        self.phase_logger(phase)
            .info(&format!("Shed wire {}", WIRES_PER_PHASE + 1 - self.switched_off[p]));
        self.publish_switch(phase);
        self.statistics.add_switch_off(phase)
    }

    /// Give the lowest forced-off wire its desired command back. No-op when
    /// nothing is shed.
    pub fn restore_one_more(&mut self, phase: u8) -> Result<()> {
        let p = phase_index(phase)?;
        if self.switched_off[p] == 0 {
            return Ok(());
        }
        let effective = apply_shedding(&self.bank.desired(phase)?, self.switched_off[p] - 1);
        self.bank.write_states(phase, &effective)?;
        self.switched_off[p] -= 1;

        self.phase_logger(phase)
            .info(&format!("Restored wire {}", WIRES_PER_PHASE - self.switched_off[p]));
        self.publish_switch(phase);
        if self.switched_off[p] == 0 {
            self.statistics.rm_switch_off(phase)?;
        }
        Ok(())
    }

    fn phase_logger(&self, phase: u8) -> StructuredLogger {
        self.logger.for_phase(phase)
    }

    fn publish_switch(&self, phase: u8) {
        let value = self.switched_off[usize::from(phase - 1)] as u8;
        self.notifications
            .publish(&Notification::Switch { phase, value });
    }

    fn publish_heaters(&self) -> Result<()> {
        let rows = self.commands.all()?;
        self.notifications.publish(&Notification::Heaters(rows));
        Ok(())
    }

    /// Persist a new desired command for heater `id`, then re-apply
    pub fn set_command_for_heater_by_id(&mut self, id: u32, command: Command) -> Result<()> {
        self.commands.set_command(id, command).map_err(|e| {
            self.logger.error(&format!(
                "Failed to persist command {} for heater {}: {}",
                command, id, e
            ));
            e
        })?;
        self.logger
            .info(&format!("Heater {} set to {}", id, command));
        self.load_from_persisted()?;
        self.publish_heaters()
    }

    /// Same as [`Self::set_command_for_heater_by_id`], addressed by position
    pub fn set_command_for_heater(&mut self, phase: u8, wire: u8, command: Command) -> Result<()> {
        phase_index(phase)?;
        if !(1..=WIRES_PER_PHASE as u8).contains(&wire) {
            return Err(HeatshedError::invalid_wire(format!("wire {}", wire)));
        }
        let id = self
            .commands
            .all()?
            .into_iter()
            .find(|r| r.phase == phase && r.wire == wire)
            .map(|r| r.id)
            .ok_or_else(|| {
                HeatshedError::invalid_wire(format!("no heater on phase {} wire {}", phase, wire))
            })?;
        self.set_command_for_heater_by_id(id, command)
    }

    /// Persist the same desired command for every heater, then re-apply
    pub fn set_command_for_all_heaters(&mut self, command: Command) -> Result<()> {
        self.commands.set_all(command).map_err(|e| {
            self.logger.error(&format!(
                "Failed to persist command {} for all heaters: {}",
                command, e
            ));
            e
        })?;
        self.logger
            .info(&format!("All heaters set to {}", command));
        self.load_from_persisted()?;
        self.publish_heaters()
    }

    /// Persisted heater rows, ordered by phase then wire
    pub fn heaters(&self) -> Result<Vec<HeaterRow>> {
        self.commands.all()
    }

    /// Flushed statistics windows within `range` of now
    pub fn history(&self, range: HistoryRange) -> Result<HistorySnapshot> {
        let now = DateTime::<Utc>::from_timestamp_millis((self.clock.now_secs() * 1000.0) as i64)
            .unwrap_or_else(Utc::now);
        let history = self.statistics.stored_since(range.cutoff(now))?;
        Ok(HistorySnapshot { range, history })
    }

    pub fn switched_off(&self, phase: u8) -> Result<u8> {
        Ok(self.switched_off[phase_index(phase)?] as u8)
    }

    pub fn desired_commands(&self, phase: u8) -> Result<PhaseCommands> {
        self.bank.desired(phase)
    }

    /// Commands the wires of `phase` are driven with
    pub fn effective_commands(&self, phase: u8) -> Result<PhaseCommands> {
        let p = phase_index(phase)?;
        Ok(apply_shedding(&self.bank.desired(phase)?, self.switched_off[p]))
    }

    pub fn statistics(&self) -> &StatisticsAggregator {
        &self.statistics
    }

    pub fn status(&self) -> Result<ControllerStatus> {
        let mut phases = Vec::with_capacity(PHASE_COUNT);
        for phase in 1..=PHASE_COUNT as u8 {
            phases.push(PhaseStatus {
                phase,
                switched_off: self.switched_off(phase)?,
                desired: self.desired_commands(phase)?.to_vec(),
                effective: self.effective_commands(phase)?.to_vec(),
            });
        }
        Ok(ControllerStatus {
            phases,
            window_start: self.statistics.window_start(),
            window_end: self.statistics.window_end(),
        })
    }

    pub fn notifications(&self) -> &Arc<NotificationBus> {
        &self.notifications
    }

    /// Process serial lines and transport requests until shutdown.
    ///
    /// Returns when `shutdown` fires or its sender is dropped, or when the
    /// line source closes.
    pub async fn run(
        mut self,
        mut lines: mpsc::Receiver<String>,
        mut commands: mpsc::Receiver<ControllerCommand>,
        mut shutdown: mpsc::UnboundedReceiver<()>,
    ) -> Result<()> {
        self.logger.info("Controller running");
        loop {
            // Pending lines are handled before queued requests
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
                line = lines.recv() => match line {
                    Some(line) => self.handle_line(&line),
                    None => {
                        self.logger.warn("Line source closed");
                        break;
                    }
                },
                Some(cmd) = commands.recv() => {
                    self.handle_command(cmd);
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Log the final state. Wires keep whatever they are driven with.
    pub fn shutdown(&mut self) {
        self.logger.info(&format!(
            "Controller stopped; switched off per phase {:?}, {} subscriber(s) attached",
            self.switched_off,
            self.notifications.subscriber_count()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimulatedBus;
    use crate::clock::ManualClock;
    use crate::persistence::{MemoryCommandStore, MemoryStatisticsStore, default_heater_rows};

    fn controller_with(command: Command) -> (Controller, SimulatedBus, ManualClock) {
        let bus = SimulatedBus::new();
        let clock = ManualClock::new(1_700_000_000.0);
        let rows = default_heater_rows()
            .into_iter()
            .map(|mut r| {
                r.command = command;
                r
            })
            .collect();
        let mut controller = Controller::new(
            Box::new(bus.clone()),
            Box::new(MemoryCommandStore::new(rows)),
            Box::new(MemoryStatisticsStore::new()),
            Arc::new(clock.clone()),
            Arc::new(NotificationBus::new()),
        )
        .unwrap();
        controller.start().unwrap();
        (controller, bus, clock)
    }

    #[test]
    fn high_current_sheds_from_the_top() {
        let (mut c, _, _) = controller_with(Command::On);
        c.on_current_reading(1, 35).unwrap();
        assert_eq!(c.switched_off(1).unwrap(), 1);
        let states = c.bank.read_states(1).unwrap();
        assert_eq!(states[7], Command::Off);
        assert_eq!(states[6], Command::On);
    }

    #[test]
    fn threshold_is_inclusive() {
        let (mut c, _, _) = controller_with(Command::On);
        c.on_current_reading(2, 29).unwrap();
        assert_eq!(c.switched_off(2).unwrap(), 0);
        c.on_current_reading(2, 30).unwrap();
        assert_eq!(c.switched_off(2).unwrap(), 1);
    }

    #[test]
    fn shed_count_saturates_at_eight() {
        let (mut c, bus, _) = controller_with(Command::On);
        for _ in 0..12 {
            c.on_current_reading(3, 60).unwrap();
        }
        assert_eq!(c.switched_off(3).unwrap(), 8);
        assert_eq!(c.effective_commands(3).unwrap(), [Command::Off; WIRES_PER_PHASE]);
        let writes = bus.writes().len();
        c.shed_one_more(3).unwrap();
        assert_eq!(bus.writes().len(), writes);
    }

    #[test]
    fn restore_without_shed_is_a_no_op() {
        let (mut c, bus, _) = controller_with(Command::Eco);
        let writes = bus.writes().len();
        c.restore_one_more(1).unwrap();
        assert_eq!(c.switched_off(1).unwrap(), 0);
        assert_eq!(bus.writes().len(), writes);
    }

    #[test]
    fn overload_always_sheds() {
        let (mut c, _, _) = controller_with(Command::On);
        c.handle_line("ADIR1 005 X");
        assert_eq!(c.switched_off(1).unwrap(), 1);
    }

    #[test]
    fn bad_lines_are_skipped() {
        let (mut c, _, _) = controller_with(Command::On);
        c.handle_line("IINST1 ABC");
        c.handle_line("IINST7 040");
        c.handle_line("garbage");
        for phase in 1..=3 {
            assert_eq!(c.switched_off(phase).unwrap(), 0);
        }
    }
}
