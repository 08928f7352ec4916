//! Server clock estimation

use crate::game::constants::RENDER_DELAY_MS;

/// Tracks the offset between the local wall clock and the server's.
///
/// The offset is re-estimated on the welcome message and on every pong as
/// `local_now - server_time`, ignoring one-way latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSync {
    offset_ms: i64,
    rtt_ms: Option<f64>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_welcome(&mut self, local_now_ms: u64, server_time_ms: u64) {
        self.offset_ms = local_now_ms as i64 - server_time_ms as i64;
    }

    /// `client_time_ms` is the echo of the value sent with the ping
    pub fn on_pong(&mut self, local_now_ms: u64, client_time_ms: f64, server_time_ms: u64) {
        self.offset_ms = local_now_ms as i64 - server_time_ms as i64;
        let rtt = local_now_ms as f64 - client_time_ms;
        if rtt.is_finite() && rtt >= 0.0 {
            self.rtt_ms = Some(rtt);
        }
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Last measured round-trip time
    pub fn rtt_ms(&self) -> Option<f64> {
        self.rtt_ms
    }

    /// Server time to render at: `local - RENDER_DELAY_MS - offset`
    pub fn render_time(&self, local_now_ms: u64) -> i64 {
        local_now_ms as i64 - RENDER_DELAY_MS - self.offset_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_time_lags_server_clock() {
        let mut clock = ClockSync::new();
        // local clock runs 500ms ahead of the server
        clock.on_welcome(10_500, 10_000);
        assert_eq!(clock.offset_ms(), 500);
        assert_eq!(clock.render_time(11_500), 11_000 - RENDER_DELAY_MS);
    }

    #[test]
    fn pong_updates_offset_and_rtt() {
        let mut clock = ClockSync::new();
        clock.on_welcome(1_000, 1_000);

        clock.on_pong(2_080, 2_000.0, 2_000);

        assert_eq!(clock.offset_ms(), 80);
        assert_eq!(clock.rtt_ms(), Some(80.0));
    }

    #[test]
    fn negative_rtt_is_discarded() {
        let mut clock = ClockSync::new();
        clock.on_pong(1_000, 5_000.0, 1_000);
        assert_eq!(clock.rtt_ms(), None);
    }
}
