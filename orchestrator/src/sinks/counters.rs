//! # Sink Counters
//!
//! The `enqueued` / `dropped` / `errors` triple every sink
//! maintains, plus the periodic 30s log line. `in_queue` is read from the
//! sink's own queue at log time rather than tracked here, so
//! `enqueued == processed + dropped + in_queue + errors`
//! holds without this struct needing to know "processed".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct SinkCounters {
    pub enqueued: AtomicU64,
    pub dropped: AtomicU64,
    pub errors: AtomicU64,
}

impl SinkCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> (u64, u64, u64) {
        (self.enqueued.load(Ordering::Relaxed), self.dropped.load(Ordering::Relaxed), self.errors.load(Ordering::Relaxed))
    }
}

/// Spawns the 30s counter-logging loop every sink runs. Exits when
/// `shutdown` fires.
pub fn spawn_counter_logger(name: &'static str, counters: Arc<SinkCounters>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(30)) => {}
                _ = shutdown.cancelled() => return,
            }
            let (enqueued, dropped, errors) = counters.snapshot();
            tracing::info!(sink = name, enqueued, dropped, errors, "sink counters");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let counters = SinkCounters::new();
        counters.enqueued.fetch_add(3, Ordering::Relaxed);
        counters.dropped.fetch_add(1, Ordering::Relaxed);
        assert_eq!(counters.snapshot(), (3, 1, 0));
    }
}
