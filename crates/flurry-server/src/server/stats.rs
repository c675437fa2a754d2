use parking_lot::Mutex;

/// A consistent reading of the usage counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Accepted stream connections.
    pub requests: u64,
    /// IDs handed out by every front end.
    pub ids: u64,
}

impl StatsSnapshot {
    /// Renders the `stats` file contents: `"<requests>,<ids>\n"`.
    pub fn to_line(&self) -> String {
        format!("{},{}\n", self.requests, self.ids)
    }
}

/// Process-wide usage counters shared by every front end.
///
/// Both counters live behind one mutex so a reader never sees a request
/// without the IDs recorded alongside it. The lock is independent of the
/// generator's.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    counters: Mutex<StatsSnapshot>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        let mut counters = self.counters.lock();
        counters.requests = counters.requests.saturating_add(1);
    }

    pub fn record_ids(&self, count: u64) {
        let mut counters = self.counters.lock();
        counters.ids = counters.ids.saturating_add(count);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.counters.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counts_requests_and_ids_separately() {
        let stats = StatsRegistry::new();
        stats.record_request();
        stats.record_ids(3);
        stats.record_ids(0);
        stats.record_ids(255);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                requests: 1,
                ids: 258
            }
        );
        assert_eq!(stats.snapshot().to_line(), "1,258\n");
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(StatsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_request();
                        stats.record_ids(2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 8000);
        assert_eq!(snapshot.ids, 16000);
    }
}
