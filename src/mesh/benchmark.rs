//! Round-trip-time sampling of neighbours found by discovery.

use std::collections::HashMap;

use tracing::trace;

use super::timer::Timer;
use crate::protocol::{Message, PingMessage};

/// RTT statistics for one candidate.
#[derive(Debug, Clone)]
pub struct ConnectionBenchmark {
    received_count: u8,
    average_rtt: u16,
    timer: Timer,
}

impl ConnectionBenchmark {
    /// Start a benchmark window of `timeout_ms` at `now`.
    #[must_use]
    pub const fn new(timeout_ms: u32, now: u32) -> Self {
        Self {
            received_count: 0,
            average_rtt: 0,
            timer: Timer::started(timeout_ms, now),
        }
    }

    /// Fold one RTT sample into the running mean.
    pub fn on_answer(&mut self, rtt: u16) {
        let count = u32::from(self.received_count);
        let total = u32::from(self.average_rtt) * count + u32::from(rtt);
        // the mean of u16 samples always fits in u16
        self.average_rtt = (total / (count + 1)) as u16;
        self.received_count = self.received_count.saturating_add(1);
    }

    /// `true` once the benchmark window has expired.
    #[must_use]
    pub const fn update(&self, now: u32) -> bool {
        self.timer.expired(now)
    }

    /// Number of answers received.
    #[must_use]
    pub const fn received_count(&self) -> u8 {
        self.received_count
    }

    /// Integer mean of all RTT samples.
    #[must_use]
    pub const fn average_rtt(&self) -> u16 {
        self.average_rtt
    }
}

/// Outcome of benchmarking one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BenchmarkResult {
    /// Candidate device.
    pub device: u8,
    /// Answers received.
    pub received_count: u8,
    /// Mean RTT of those answers in milliseconds.
    pub average_rtt: u16,
}

/// Sends ping bursts to each candidate in turn and collects their RTTs.
#[derive(Debug)]
pub struct ConnectionBenchmarkWrapper {
    devices: Vec<u8>,
    benchmarks: HashMap<u8, ConnectionBenchmark>,
    number_messages: u8,
    messages_sent: u8,
    current_device: usize,
    own_id: u8,
}

impl ConnectionBenchmarkWrapper {
    /// Prepare `number_messages` pings for every device in `devices`.
    #[must_use]
    pub fn new(devices: Vec<u8>, number_messages: u8, timeout_ms: u32, now: u32, own_id: u8) -> Self {
        let benchmarks = devices
            .iter()
            .map(|&id| (id, ConnectionBenchmark::new(timeout_ms, now)))
            .collect();
        Self {
            devices,
            benchmarks,
            number_messages,
            messages_sent: 0,
            current_device: 0,
            own_id,
        }
    }

    /// Advance by one tick.
    ///
    /// Emits one ping per tick until every candidate got its quota, then
    /// reports completion once every per-device window has expired.
    pub fn update(&mut self, now: u32) -> (bool, Option<Message>) {
        let Some(&device) = self.devices.get(self.current_device) else {
            let finished = self.benchmarks.values().all(|b| b.update(now));
            return (finished, None);
        };

        // low byte of the clock doubles as ping id
        let ping = PingMessage::request(device, now as u8, self.own_id, now);
        trace!(device, sent = self.messages_sent, "benchmark ping");

        self.messages_sent = self.messages_sent.saturating_add(1);
        if self.messages_sent >= self.number_messages {
            self.messages_sent = 0;
            self.current_device += 1;
        }
        (false, Some(ping.into()))
    }

    /// Record an answer from `device`.
    pub fn on_answer(&mut self, device: u8, rtt: u16) {
        if let Some(benchmark) = self.benchmarks.get_mut(&device) {
            benchmark.on_answer(rtt);
        }
    }

    /// Whether `device` is being benchmarked.
    #[must_use]
    pub fn is_candidate(&self, device: u8) -> bool {
        self.benchmarks.contains_key(&device)
    }

    /// Per-device results in candidate order.
    #[must_use]
    pub fn results(&self) -> Vec<BenchmarkResult> {
        self.devices
            .iter()
            .filter_map(|&device| {
                self.benchmarks.get(&device).map(|b| BenchmarkResult {
                    device,
                    received_count: b.received_count(),
                    average_rtt: b.average_rtt(),
                })
            })
            .collect()
    }
}
