//! Wall-clock access
//!
//! Statistics integrate over real time; tests drive a [`ManualClock`] instead.

use chrono::Utc;
use std::sync::{Arc, Mutex};

/// Source of the current time as unix seconds with sub-second precision
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Clock that only moves when told to; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start_secs: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_secs)),
        }
    }

    pub fn set(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = secs;
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += secs;
        }
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        self.now.lock().map(|n| *n).unwrap_or_default()
    }
}
