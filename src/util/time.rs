//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

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
pub const SIMULATION_TPS: u32 = 30; // 30 ticks per second
pub const SNAPSHOT_TPS: u32 = 20; // 20 snapshots per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;
pub const SNAPSHOT_INTERVAL_MICROS: u64 = 1_000_000 / SNAPSHOT_TPS as u64;

/// Fixed simulation delta time (in seconds).
///
/// Every tick integrates with this nominal value, never the measured elapsed
/// time, so scheduler jitter cannot change movement distances.
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

pub fn tick_duration() -> Duration {
    Duration::from_micros(TICK_DURATION_MICROS)
}

pub fn snapshot_interval() -> Duration {
    Duration::from_micros(SNAPSHOT_INTERVAL_MICROS)
}

/// Measures wall-clock frame deltas for the client loop
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Seconds since the previous call, clamped to `max_secs`
    pub fn delta(&mut self, max_secs: f32) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        dt.min(max_secs)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
