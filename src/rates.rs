use std::collections::HashMap;
use std::time::Instant;

use crate::model::{Interface, Throughput};

#[derive(Clone, Copy, Debug)]
struct Counters {
    sent: u64,
    recv: u64,
}

/// Per-interface tx/rx rate from successive cumulative counter samples.
///
/// Rates are only meaningful when every sample goes through the same
/// instance, so the collector owns one for its whole lifetime.
#[derive(Debug, Default)]
pub struct RateCalculator {
    prev: HashMap<String, Counters>,
    prev_time: Option<Instant>,
}

impl RateCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rates for a sample taken at `now`.
    ///
    /// An interface seen for the first time, or any sample with a
    /// non-positive interval since the last one, reports zero and becomes the
    /// new baseline. A counter that went backwards reports zero for that
    /// direction.
    pub fn calculate_at(
        &mut self,
        interfaces: &[Interface],
        now: Instant,
    ) -> HashMap<String, Throughput> {
        let elapsed = self
            .prev_time
            .and_then(|prev| now.checked_duration_since(prev))
            .map(|d| d.as_secs_f64())
            .filter(|secs| *secs > 0.0);

        let mut out = HashMap::with_capacity(interfaces.len());
        for iface in interfaces {
            let current = Counters {
                sent: iface.bytes_sent,
                recv: iface.bytes_recv,
            };

            let (tx_rate, rx_rate) = match (self.prev.get(&iface.name), elapsed) {
                (Some(prev), Some(secs)) => (
                    per_second(prev.sent, current.sent, secs),
                    per_second(prev.recv, current.recv, secs),
                ),
                _ => (0.0, 0.0),
            };

            self.prev.insert(iface.name.clone(), current);
            out.insert(
                iface.name.clone(),
                Throughput {
                    interface: iface.name.clone(),
                    tx_rate,
                    rx_rate,
                },
            );
        }

        self.prev_time = Some(now);
        out
    }
}

fn per_second(prev: u64, current: u64, secs: f64) -> f64 {
    match current.checked_sub(prev) {
        Some(delta) => delta as f64 / secs,
        None => 0.0,
    }
}
