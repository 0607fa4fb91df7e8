//! Persistence layer for heater commands and statistics
//!
//! The controller only talks to the [`CommandStore`] and [`StatisticsStore`]
//! traits. JSON-file implementations keep state across restarts; the memory
//! implementations back tests and bench runs.

use crate::command::{Command, PHASE_COUNT, WIRES_PER_PHASE};
use crate::error::{HeatshedError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// One heater of the installation and its persisted desired command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaterRow {
    pub id: u32,
    /// 1..=3
    pub phase: u8,
    /// 1..=8
    pub wire: u8,
    pub command: Command,
    /// Free-form label shown by clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One flushed statistics window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsRow {
    /// Window start, unix seconds
    pub start: i64,
    /// Seconds switched off, per phase
    pub off1: i64,
    pub off2: i64,
    pub off3: i64,
    /// Average intensity (A), per phase
    pub int1: i64,
    pub int2: i64,
    pub int3: i64,
    /// Average apparent power (VA)
    pub watts: i64,
    /// Meter delta over both tariff periods (Wh)
    pub meter: i64,
}

/// Persisted desired commands
pub trait CommandStore: Send {
    /// All rows ordered by phase, then wire
    fn all(&self) -> Result<Vec<HeaterRow>>;

    /// Update the command of the row with `id`
    fn set_command(&mut self, id: u32, command: Command) -> Result<()>;

    /// Update the command of every row
    fn set_all(&mut self, command: Command) -> Result<()>;
}

/// Persisted statistics windows
pub trait StatisticsStore: Send {
    /// Append one flushed window
    fn append(&mut self, row: StatisticsRow) -> Result<()>;

    /// Rows with `start >= since` (all rows when `None`), ordered by start
    fn since(&self, since: Option<i64>) -> Result<Vec<StatisticsRow>>;
}

/// Relative time range of a history query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRange {
    Day,
    Week,
    Month,
    Year,
    All,
}

impl HistoryRange {
    pub const fn as_str(self) -> &'static str {
        match self {
            HistoryRange::Day => "24h",
            HistoryRange::Week => "7j",
            HistoryRange::Month => "1m",
            HistoryRange::Year => "12m",
            HistoryRange::All => "inf",
        }
    }

    /// Earliest window start included by this range, unix seconds
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<i64> {
        let from = match self {
            HistoryRange::Day => now.checked_sub_signed(Duration::hours(24)),
            HistoryRange::Week => now.checked_sub_signed(Duration::days(7)),
            HistoryRange::Month => now.checked_sub_months(Months::new(1)),
            HistoryRange::Year => now.checked_sub_months(Months::new(12)),
            HistoryRange::All => None,
        };
        from.map(|t| t.timestamp())
    }
}

impl FromStr for HistoryRange {
    type Err = std::convert::Infallible;

    // Unknown ranges are unbounded
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "24h" => HistoryRange::Day,
            "7j" | "7d" | "7days" => HistoryRange::Week,
            "1m" => HistoryRange::Month,
            "12m" => HistoryRange::Year,
            _ => HistoryRange::All,
        })
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HistoryRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HistoryRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(HistoryRange::All))
    }
}

/// Default heater table: every wire of every phase, OFF
pub fn default_heater_rows() -> Vec<HeaterRow> {
    let mut rows = Vec::with_capacity(PHASE_COUNT * WIRES_PER_PHASE);
    for phase in 1..=PHASE_COUNT as u8 {
        for wire in 1..=WIRES_PER_PHASE as u8 {
            rows.push(HeaterRow {
                id: u32::from(phase - 1) * WIRES_PER_PHASE as u32 + u32::from(wire),
                phase,
                wire,
                command: Command::Off,
                name: None,
            });
        }
    }
    rows
}

fn sorted(mut rows: Vec<HeaterRow>) -> Vec<HeaterRow> {
    rows.sort_by_key(|r| (r.phase, r.wire));
    rows
}

fn update_one(rows: &mut [HeaterRow], id: u32, command: Command) -> Result<()> {
    let row = rows
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| HeatshedError::invalid_wire(format!("unknown heater id {}", id)))?;
    row.command = command;
    Ok(())
}

fn filter_since(rows: &[StatisticsRow], since: Option<i64>) -> Vec<StatisticsRow> {
    let mut out: Vec<StatisticsRow> = rows
        .iter()
        .filter(|r| since.is_none_or(|s| r.start >= s))
        .cloned()
        .collect();
    out.sort_by_key(|r| r.start);
    out
}

#[derive(Debug, Default)]
struct MemoryCommandState {
    rows: Vec<HeaterRow>,
    fail_writes: bool,
}

/// In-memory command store; clones share the same table
#[derive(Debug, Clone)]
pub struct MemoryCommandStore {
    state: Arc<Mutex<MemoryCommandState>>,
}

impl MemoryCommandStore {
    pub fn new(rows: Vec<HeaterRow>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryCommandState {
                rows: sorted(rows),
                fail_writes: false,
            })),
        }
    }

    /// Make every update fail until cleared
    pub fn fail_writes(&self, failing: bool) {
        if let Ok(mut s) = self.state.lock() {
            s.fail_writes = failing;
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryCommandState>> {
        self.state
            .lock()
            .map_err(|_| HeatshedError::persistence("command store poisoned"))
    }

    fn writable(&self) -> Result<std::sync::MutexGuard<'_, MemoryCommandState>> {
        let s = self.lock()?;
        if s.fail_writes {
            return Err(HeatshedError::persistence("command store is read-only"));
        }
        Ok(s)
    }
}

impl Default for MemoryCommandStore {
    fn default() -> Self {
        Self::new(default_heater_rows())
    }
}

impl CommandStore for MemoryCommandStore {
    fn all(&self) -> Result<Vec<HeaterRow>> {
        Ok(self.lock()?.rows.clone())
    }

    fn set_command(&mut self, id: u32, command: Command) -> Result<()> {
        update_one(&mut self.writable()?.rows, id, command)
    }

    fn set_all(&mut self, command: Command) -> Result<()> {
        for row in self.writable()?.rows.iter_mut() {
            row.command = command;
        }
        Ok(())
    }
}

/// In-memory statistics store; clones share the same rows
#[derive(Debug, Clone, Default)]
pub struct MemoryStatisticsStore {
    rows: Arc<Mutex<Vec<StatisticsRow>>>,
}

impl MemoryStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row appended so far, in append order
    pub fn rows(&self) -> Vec<StatisticsRow> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl StatisticsStore for MemoryStatisticsStore {
    fn append(&mut self, row: StatisticsRow) -> Result<()> {
        self.rows
            .lock()
            .map_err(|_| HeatshedError::persistence("statistics store poisoned"))?
            .push(row);
        Ok(())
    }

    fn since(&self, since: Option<i64>) -> Result<Vec<StatisticsRow>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| HeatshedError::persistence("statistics store poisoned"))?;
        Ok(filter_since(&rows, since))
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| HeatshedError::persistence(format!("read {}: {}", path.display(), e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| HeatshedError::persistence(format!("parse {}: {}", path.display(), e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(path, contents)
        .map_err(|e| HeatshedError::persistence(format!("write {}: {}", path.display(), e)))
}

/// Heater table kept in a JSON file
///
/// Every mutation is written to disk before the in-memory copy changes, so a
/// failed write leaves both untouched.
pub struct JsonCommandStore {
    path: PathBuf,
    rows: Vec<HeaterRow>,
    logger: crate::logging::StructuredLogger,
}

impl JsonCommandStore {
    /// Open the store, seeding a default table when the file does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let logger = get_logger("persistence");

        let rows = if path.exists() {
            let rows: Vec<HeaterRow> = read_json(&path)?;
            logger.info(&format!(
                "Loaded {} heater rows from {}",
                rows.len(),
                path.display()
            ));
            sorted(rows)
        } else {
            let rows = default_heater_rows();
            write_json(&path, &rows)?;
            logger.info(&format!("Seeded heater table at {}", path.display()));
            rows
        };

        Ok(Self { path, rows, logger })
    }

    fn commit(&mut self, rows: Vec<HeaterRow>) -> Result<()> {
        write_json(&self.path, &rows)?;
        self.rows = rows;
        self.logger.debug("Saved heater table to disk");
        Ok(())
    }
}

impl CommandStore for JsonCommandStore {
    fn all(&self) -> Result<Vec<HeaterRow>> {
        Ok(self.rows.clone())
    }

    fn set_command(&mut self, id: u32, command: Command) -> Result<()> {
        let mut rows = self.rows.clone();
        update_one(&mut rows, id, command)?;
        self.commit(rows)
    }

    fn set_all(&mut self, command: Command) -> Result<()> {
        let rows = self
            .rows
            .iter()
            .cloned()
            .map(|r| HeaterRow { command, ..r })
            .collect();
        self.commit(rows)
    }
}

/// Statistics windows kept in a JSON file
pub struct JsonStatisticsStore {
    path: PathBuf,
    rows: Vec<StatisticsRow>,
}

impl JsonStatisticsStore {
    /// Open the store; a missing file is an empty history
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rows = if path.exists() {
            read_json(&path)?
        } else {
            Vec::new()
        };
        Ok(Self { path, rows })
    }
}

impl StatisticsStore for JsonStatisticsStore {
    fn append(&mut self, row: StatisticsRow) -> Result<()> {
        let mut rows = self.rows.clone();
        rows.push(row);
        write_json(&self.path, &rows)?;
        self.rows = rows;
        Ok(())
    }

    fn since(&self, since: Option<i64>) -> Result<Vec<StatisticsRow>> {
        Ok(filter_since(&self.rows, since))
    }
}
