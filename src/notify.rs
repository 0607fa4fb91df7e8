//! Notification fan-out
//!
//! Every notification serialises as `{"type": ..., "data": ...}`. Subscribers
//! each get their own bounded queue; a subscriber whose queue is full or whose
//! receiver is gone is dropped without holding up the others.

use crate::error::Result;
use crate::logging::get_logger;
use crate::persistence::{HeaterRow, HistoryRange, StatisticsRow};
use crate::teleinfo::TariffPeriod;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Queue depth of each subscriber
pub const SUBSCRIBER_BUFFER: usize = 64;

/// Statistics rows returned for a history query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySnapshot {
    pub range: HistoryRange,
    pub history: Vec<StatisticsRow>,
}

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Notification {
    Current { phase: u8, value: u32 },
    Meter { period: TariffPeriod, value: u64 },
    Power { time: f64, value: u32 },
    Switch { phase: u8, value: u8 },
    Heaters(Vec<HeaterRow>),
    History(HistorySnapshot),
}

impl Notification {
    /// Event name, identical to the `type` field
    pub const fn kind(&self) -> &'static str {
        match self {
            Notification::Current { .. } => "current",
            Notification::Meter { .. } => "meter",
            Notification::Power { .. } => "power",
            Notification::Switch { .. } => "switch",
            Notification::Heaters(_) => "heaters",
            Notification::History(_) => "history",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Subscriber handle
pub type SubscriberId = u64;

/// Dynamic set of subscribers
#[derive(Debug)]
pub struct NotificationBus {
    subscribers: Mutex<BTreeMap<SubscriberId, mpsc::Sender<Notification>>>,
    next_id: AtomicU64,
    logger: crate::logging::StructuredLogger,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            logger: get_logger("notify"),
        }
    }

    /// Attach a new subscriber
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.insert(id, tx);
        }
        self.logger.debug(&format!("Subscriber {} attached", id));
        (id, rx)
    }

    /// Detach a subscriber; returns whether it was attached
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self
            .subscribers
            .lock()
            .map(|mut subs| subs.remove(&id).is_some())
            .unwrap_or(false);
        if removed {
            self.logger.debug(&format!("Subscriber {} detached", id));
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Deliver to every subscriber without waiting; returns the number reached
    pub fn publish(&self, notification: &Notification) -> usize {
        let Ok(mut subs) = self.subscribers.lock() else {
            return 0;
        };
        let mut failed = Vec::new();
        for (id, tx) in subs.iter() {
            if let Err(e) = tx.try_send(notification.clone()) {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "receiver closed",
                };
                failed.push((*id, reason));
            }
        }
        for (id, reason) in &failed {
            subs.remove(id);
            self.logger.warn(&format!(
                "Dropping subscriber {} ({}) on {} notification",
                id,
                reason,
                notification.kind()
            ));
        }
        subs.len()
    }
}
