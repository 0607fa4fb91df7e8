//! Time-weighted statistics over daily windows
//!
//! Readings arrive at irregular instants. Each new sample of a series is
//! integrated as `value * (now - previous sample instant)`, i.e. the arriving
//! value is held over the interval that just ended. Switched-off time is only
//! integrated while a phase has an open shed interval.
//!
//! Every `add_*` call first checks the window: once the clock passes
//! `window_end`, one summary row is appended to the store and the
//! accumulators restart at the old `window_end`.

use crate::clock::Clock;
use crate::command::PHASE_COUNT;
use crate::error::{HeatshedError, Result};
use crate::logging::get_logger;
use crate::persistence::{StatisticsRow, StatisticsStore};
use std::sync::Arc;

/// Nominal window length in seconds
pub const WINDOW_SECONDS: f64 = 86_400.0;

/// First and latest cumulative reading of one tariff period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeterSpan {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl MeterSpan {
    fn record(&mut self, value: u64) {
        if self.start.is_none() {
            self.start = Some(value);
        }
        self.end = Some(value);
    }

    pub fn delta(&self) -> i64 {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end as i64 - start as i64,
            _ => 0,
        }
    }

    /// The next window starts from the last reading seen
    fn roll(&mut self) {
        self.start = self.end;
    }
}

fn phase_index(phase: u8) -> Result<usize> {
    match phase {
        1..=3 => Ok(usize::from(phase - 1)),
        other => Err(HeatshedError::invalid_phase(i64::from(other))),
    }
}

fn average(integral: f64, last_sample: f64, window_start: f64) -> i64 {
    let elapsed = last_sample - window_start;
    if elapsed > 0.0 {
        (integral / elapsed).round() as i64
    } else {
        0
    }
}

/// Statistics aggregator
pub struct StatisticsAggregator {
    clock: Arc<dyn Clock>,
    store: Box<dyn StatisticsStore>,

    window_start: f64,
    window_end: f64,

    seconds_switched_off: [f64; PHASE_COUNT],
    last_switched_off: [Option<f64>; PHASE_COUNT],

    seconds_x_intensity: [f64; PHASE_COUNT],
    last_intensity: [f64; PHASE_COUNT],

    seconds_x_watts: f64,
    last_watt: f64,

    standard: MeterSpan,
    savings: MeterSpan,

    logger: crate::logging::StructuredLogger,
}

impl StatisticsAggregator {
    /// Open a window starting now
    pub fn new(clock: Arc<dyn Clock>, store: Box<dyn StatisticsStore>) -> Self {
        let start = clock.now_secs();
        Self {
            clock,
            store,
            window_start: start,
            window_end: start + WINDOW_SECONDS,
            seconds_switched_off: [0.0; PHASE_COUNT],
            last_switched_off: [None; PHASE_COUNT],
            seconds_x_intensity: [0.0; PHASE_COUNT],
            last_intensity: [start; PHASE_COUNT],
            seconds_x_watts: 0.0,
            last_watt: start,
            standard: MeterSpan::default(),
            savings: MeterSpan::default(),
            logger: get_logger("statistics"),
        }
    }

    pub fn window_start(&self) -> f64 {
        self.window_start
    }

    pub fn window_end(&self) -> f64 {
        self.window_end
    }

    /// Seconds switched off so far in this window (1-based phase)
    pub fn seconds_switched_off(&self, phase: u8) -> Result<f64> {
        Ok(self.seconds_switched_off[phase_index(phase)?])
    }

    /// Intensity-seconds so far in this window (1-based phase)
    pub fn seconds_x_intensity(&self, phase: u8) -> Result<f64> {
        Ok(self.seconds_x_intensity[phase_index(phase)?])
    }

    pub fn seconds_x_watts(&self) -> f64 {
        self.seconds_x_watts
    }

    /// Whether a shed interval is currently open for the phase
    pub fn is_switched_off(&self, phase: u8) -> Result<bool> {
        Ok(self.last_switched_off[phase_index(phase)?].is_some())
    }

    pub fn standard_meter(&self) -> MeterSpan {
        self.standard
    }

    pub fn savings_meter(&self) -> MeterSpan {
        self.savings
    }

    /// Summary of the window as it stands
    pub fn summary(&self) -> StatisticsRow {
        let off = self.seconds_switched_off.map(|s| s.round() as i64);
        let int: Vec<i64> = (0..PHASE_COUNT)
            .map(|i| {
                average(
                    self.seconds_x_intensity[i],
                    self.last_intensity[i],
                    self.window_start,
                )
            })
            .collect();
        StatisticsRow {
            start: self.window_start.round() as i64,
            off1: off[0],
            off2: off[1],
            off3: off[2],
            int1: int[0],
            int2: int[1],
            int3: int[2],
            watts: average(self.seconds_x_watts, self.last_watt, self.window_start),
            meter: self.standard.delta() + self.savings.delta(),
        }
    }

    /// Flushed windows starting at or after `since`
    pub fn stored_since(&self, since: Option<i64>) -> Result<Vec<StatisticsRow>> {
        self.store.since(since)
    }

    /// Flush and restart the window if the clock passed its end; returns now
    pub fn clear_if_expired(&mut self) -> f64 {
        let now = self.clock.now_secs();
        if now > self.window_end {
            self.roll_window();
        }
        now
    }

    fn roll_window(&mut self) {
        let boundary = self.window_end;

        // Open shed intervals are split at the boundary
        for i in 0..PHASE_COUNT {
            if let Some(last) = self.last_switched_off[i] {
                self.seconds_switched_off[i] += (boundary - last).max(0.0);
            }
        }

        let row = self.summary();
        match self.store.append(row.clone()) {
            Ok(()) => self.logger.info(&format!(
                "Flushed statistics window start={} off=({},{},{}) int=({},{},{}) watts={} meter={}",
                row.start,
                row.off1,
                row.off2,
                row.off3,
                row.int1,
                row.int2,
                row.int3,
                row.watts,
                row.meter
            )),
            Err(e) => self
                .logger
                .error(&format!("Failed to persist statistics window: {}", e)),
        }

        self.window_start = boundary;
        self.window_end = boundary + WINDOW_SECONDS;

        self.seconds_switched_off = [0.0; PHASE_COUNT];
        for last in self.last_switched_off.iter_mut() {
            if last.is_some() {
                *last = Some(boundary);
            }
        }

        self.seconds_x_intensity = [0.0; PHASE_COUNT];
        self.last_intensity = [boundary; PHASE_COUNT];

        self.seconds_x_watts = 0.0;
        self.last_watt = boundary;

        self.standard.roll();
        self.savings.roll();
    }

    /// One more heater was shed on the phase
    pub fn add_switch_off(&mut self, phase: u8) -> Result<()> {
        let i = phase_index(phase)?;
        let now = self.clear_if_expired();
        if let Some(last) = self.last_switched_off[i] {
            self.seconds_switched_off[i] += now - last;
        }
        self.last_switched_off[i] = Some(now);
        Ok(())
    }

    /// The phase has fully recovered: close the shed interval
    pub fn rm_switch_off(&mut self, phase: u8) -> Result<()> {
        let i = phase_index(phase)?;
        let now = self.clear_if_expired();
        if let Some(last) = self.last_switched_off[i].take() {
            self.seconds_switched_off[i] += now - last;
        }
        Ok(())
    }

    /// Integrate an intensity reading for the phase
    pub fn add_intensity(&mut self, phase: u8, amperes: u32) -> Result<()> {
        let i = phase_index(phase)?;
        let now = self.clear_if_expired();
        let interval = now - self.last_intensity[i];
        self.seconds_x_intensity[i] += interval * f64::from(amperes);
        self.last_intensity[i] = now;
        self.logger.trace(&format!(
            "phase {} intensity-seconds {:.1}, average {:.2}",
            phase,
            self.seconds_x_intensity[i],
            self.seconds_x_intensity[i] / (now - self.window_start)
        ));
        Ok(())
    }

    /// Integrate an apparent power reading
    pub fn add_power(&mut self, watts: u32) {
        let now = self.clear_if_expired();
        let interval = now - self.last_watt;
        self.seconds_x_watts += interval * f64::from(watts);
        self.last_watt = now;
        self.logger.trace(&format!(
            "watt-seconds {:.1}, average {:.2}",
            self.seconds_x_watts,
            self.seconds_x_watts / (now - self.window_start)
        ));
    }

    /// Record a standard-tariff cumulative meter reading
    pub fn add_standard_meter(&mut self, value: u64) {
        self.clear_if_expired();
        self.standard.record(value);
    }

    /// Record a savings-tariff cumulative meter reading
    pub fn add_savings_meter(&mut self, value: u64) {
        self.clear_if_expired();
        self.savings.record(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryStatisticsStore;

    const T0: f64 = 1_700_000_000.0;

    fn aggregator() -> (StatisticsAggregator, ManualClock) {
        let clock = ManualClock::new(T0);
        let agg = StatisticsAggregator::new(
            Arc::new(clock.clone()),
            Box::new(MemoryStatisticsStore::new()),
        );
        (agg, clock)
    }

    #[test]
    fn window_is_one_day() {
        let (agg, _) = aggregator();
        assert!((agg.window_end() - agg.window_start() - WINDOW_SECONDS).abs() < 1e-9);
    }

    #[test]
    fn switch_off_interval_accumulates_between_calls() {
        let (mut agg, clock) = aggregator();
        agg.add_switch_off(2).unwrap();
        clock.advance(10.0);
        agg.rm_switch_off(2).unwrap();
        assert!((agg.seconds_switched_off(2).unwrap() - 10.0).abs() < 1e-9);
        assert!(!agg.is_switched_off(2).unwrap());
        assert_eq!(agg.seconds_switched_off(1).unwrap(), 0.0);
    }

    #[test]
    fn repeated_shed_extends_interval() {
        let (mut agg, clock) = aggregator();
        agg.add_switch_off(1).unwrap();
        clock.advance(4.0);
        agg.add_switch_off(1).unwrap();
        clock.advance(6.0);
        agg.rm_switch_off(1).unwrap();
        assert!((agg.seconds_switched_off(1).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rm_without_open_interval_adds_nothing() {
        let (mut agg, clock) = aggregator();
        clock.advance(30.0);
        agg.rm_switch_off(3).unwrap();
        assert_eq!(agg.seconds_switched_off(3).unwrap(), 0.0);
    }

    #[test]
    fn intensity_uses_arriving_value_over_elapsed_interval() {
        let (mut agg, clock) = aggregator();
        clock.advance(10.0);
        agg.add_intensity(1, 20).unwrap();
        clock.advance(30.0);
        agg.add_intensity(1, 5).unwrap();
        // 10 s * 20 A + 30 s * 5 A
        assert!((agg.seconds_x_intensity(1).unwrap() - 350.0).abs() < 1e-9);
        // 350 / 40 = 8.75
        assert_eq!(agg.summary().int1, 9);
        assert_eq!(agg.summary().int2, 0);
    }

    #[test]
    fn meter_delta_sums_both_periods() {
        let (mut agg, _) = aggregator();
        agg.add_standard_meter(1_000);
        agg.add_standard_meter(1_250);
        agg.add_savings_meter(500);
        agg.add_savings_meter(520);
        assert_eq!(agg.summary().meter, 270);
    }

    #[test]
    fn expired_window_is_flushed_and_restarted() {
        let clock = ManualClock::new(T0);
        let store = MemoryStatisticsStore::new();
        let mut agg = StatisticsAggregator::new(Arc::new(clock.clone()), Box::new(store.clone()));

        clock.advance(100.0);
        agg.add_intensity(3, 12).unwrap();
        agg.add_switch_off(3).unwrap();
        agg.add_standard_meter(10_000);
        clock.advance(50.0);
        agg.add_power(800);

        clock.set(T0 + WINDOW_SECONDS + 1.0);
        agg.add_standard_meter(10_400);

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.start, T0 as i64);
        assert_eq!(row.off3, (WINDOW_SECONDS - 100.0) as i64);
        assert_eq!(row.int3, 12);
        // 150 s * 800 VA over the 150 s up to the last sample
        assert_eq!(row.watts, 800);
        assert_eq!(row.meter, 0);

        assert!((agg.window_start() - (T0 + WINDOW_SECONDS)).abs() < 1e-9);
        assert!(agg.is_switched_off(3).unwrap());
        assert_eq!(agg.seconds_switched_off(3).unwrap(), 0.0);
        assert_eq!(agg.summary().meter, 400);
        assert_eq!(agg.stored_since(Some(T0 as i64)).unwrap().len(), 1);
    }

    #[test]
    fn invalid_phase_is_rejected() {
        let (mut agg, _) = aggregator();
        assert!(matches!(
            agg.add_switch_off(0),
            Err(HeatshedError::InvalidPhase { phase: 0 })
        ));
        assert!(agg.add_intensity(4, 10).is_err());
    }
}
