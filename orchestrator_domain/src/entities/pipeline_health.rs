//! # Pipeline Health Entity
//!
//! One row per pipeline in the Supervisor's `PipelineHealth` map.
//! Invariant enforced by the application layer that owns the map: a
//! pipeline exists here iff it exists in `ProcessesTable`.

use std::time::Instant;

/// Default threshold at which a pipeline is scheduled for force-cleanup.
pub const DEFAULT_MAX_HEALTH_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
pub struct PipelineHealth {
    /// Consecutive health-check failures since the last success.
    pub failures: u32,
    /// Monotonic timestamp of the last health-check attempt.
    pub last_check: Instant,
    /// Once true, no new commands are accepted and the worker is being
    /// torn down; this flag never resets.
    pub marked_for_removal: bool,
    /// Bounded ring of recent RSS samples, most recent last.
    ram_samples: Vec<u64>,
    ram_samples_capacity: usize,
}

impl PipelineHealth {
    pub fn new(ram_samples_capacity: usize) -> Self {
        Self {
            failures: 0,
            last_check: Instant::now(),
            marked_for_removal: false,
            ram_samples: Vec::with_capacity(ram_samples_capacity),
            ram_samples_capacity,
        }
    }

    /// Records a health-check failure and reports whether the pipeline
    /// has now crossed `max_failures` and should be scheduled for
    /// force-cleanup.
    pub fn record_failure(&mut self, max_failures: u32) -> bool {
        self.failures += 1;
        self.last_check = Instant::now();
        self.failures >= max_failures
    }

    /// Records a health-check success, resetting the failure streak.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.last_check = Instant::now();
    }

    /// Marks the pipeline for removal. Idempotent; the flag never clears.
    pub fn mark_for_removal(&mut self) {
        self.marked_for_removal = true;
    }

    /// Appends an RSS sample, evicting the oldest once the ring is full.
    pub fn push_ram_sample(&mut self, bytes: u64) {
        if self.ram_samples.len() == self.ram_samples_capacity {
            self.ram_samples.remove(0);
        }
        self.ram_samples.push(bytes);
    }

    pub fn latest_ram_sample(&self) -> Option<u64> {
        self.ram_samples.last().copied()
    }

    pub fn ram_samples(&self) -> &[u64] {
        &self.ram_samples
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new(60)
    }
}
