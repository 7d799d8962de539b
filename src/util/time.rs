//! Time utilities for the room clock

use std::time::{Duration, Instant};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // 60 ticks per second
pub const SNAPSHOT_TPS: u32 = 30; // 30 snapshots per second

/// Nominal wall time between simulation ticks
pub fn tick_duration() -> Duration {
    Duration::from_micros(1_000_000 / SIMULATION_TPS as u64)
}

/// Longest step a single tick may consume, however late it fires
pub fn max_step() -> Duration {
    Duration::from_micros(1_000_000 / SNAPSHOT_TPS as u64)
}

/// Measures wall time between ticks, clamped to `max_step`
#[derive(Debug, Clone)]
pub struct StepClock {
    last: Instant,
}

impl StepClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Elapsed time since the previous call, never more than `max_step`
    pub fn step(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        clamp_step(elapsed)
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new()
    }
}

pub fn clamp_step(elapsed: Duration) -> Duration {
    elapsed.min(max_step())
}
