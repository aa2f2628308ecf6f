//! Counter sink notified by the engine on packet and message traffic.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const PACKETS_RECEIVED: &str = "packets.received";
pub const PACKETS_SENT: &str = "packets.sent";
pub const MESSAGES_RECEIVED: &str = "messages.received";
pub const MESSAGES_SENT: &str = "messages.sent";

pub trait MetricsSink: Send + Sync {
    fn incr(&self, counter: &'static str);
}

/// Sink for hosts that do not collect metrics.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr(&self, _counter: &'static str) {}
}

/// Atomic counter for thread-safe metric updates.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// In-memory counter map; the default sink for embedded and test use.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<&'static str, Arc<Counter>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: &'static str) -> u64 {
        self.counters
            .lock()
            .get(counter)
            .map(|c| c.get())
            .unwrap_or(0)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn incr(&self, counter: &'static str) {
        let handle = {
            let mut guard = self.counters.lock();
            guard.entry(counter).or_default().clone()
        };
        handle.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_key() {
        let metrics = InMemoryMetrics::new();
        metrics.incr(PACKETS_SENT);
        metrics.incr(PACKETS_SENT);
        metrics.incr(MESSAGES_SENT);
        assert_eq!(metrics.get(PACKETS_SENT), 2);
        assert_eq!(metrics.get(MESSAGES_SENT), 1);
        assert_eq!(metrics.get(PACKETS_RECEIVED), 0);
    }
}
