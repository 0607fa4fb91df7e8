#![no_main]
use heatshed::bus::SimulatedBus;
use heatshed::clock::ManualClock;
use heatshed::controller::Controller;
use heatshed::notify::NotificationBus;
use heatshed::persistence::{MemoryCommandStore, MemoryStatisticsStore};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let clock = ManualClock::new(1_700_000_000.0);
    let Ok(mut controller) = Controller::new(
        Box::new(SimulatedBus::new()),
        Box::new(MemoryCommandStore::default()),
        Box::new(MemoryStatisticsStore::new()),
        Arc::new(clock.clone()),
        Arc::new(NotificationBus::new()),
    ) else {
        return;
    };
    let text = String::from_utf8_lossy(data);
    for line in text.lines() {
        clock.advance(1.0);
        controller.handle_line(line);
        for phase in 1..=3 {
            assert!(controller.switched_off(phase).unwrap_or(0) <= 8);
        }
    }
});
