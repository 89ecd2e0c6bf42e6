//! Keep-alive timing for one channel.

use std::time::Duration;

/// Elapsed silence and consecutive unanswered heartbeats.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeartbeatState {
    elapsed_seconds: f32,
    miss_count: u32,
}

impl HeartbeatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the timer was last reset.
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed_seconds
    }

    /// Heartbeats sent since the last reset.
    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    /// Clear the miss count, and the timer too when `reset_elapsed` is set.
    pub fn reset(&mut self, reset_elapsed: bool) {
        if reset_elapsed {
            self.elapsed_seconds = 0.0;
        }
        self.miss_count = 0;
    }

    /// Advance the timer by `real_elapsed_seconds`.
    ///
    /// When the interval is reached the timer restarts, the miss count is
    /// incremented and the miss count from before this tick is returned: the
    /// caller should send a heartbeat. A non-positive interval disables
    /// heartbeats entirely.
    pub fn tick(&mut self, real_elapsed_seconds: f32, interval_seconds: f32) -> Option<u32> {
        if interval_seconds <= 0.0 {
            return None;
        }

        self.elapsed_seconds += real_elapsed_seconds;
        if self.elapsed_seconds < interval_seconds {
            return None;
        }

        let prior = self.miss_count;
        self.elapsed_seconds = 0.0;
        self.miss_count = self.miss_count.saturating_add(1);
        Some(prior)
    }
}

/// Heartbeat state together with the settings that drive it, kept under one lock.
#[derive(Debug, Clone)]
pub(crate) struct Heartbeat {
    pub(crate) state: HeartbeatState,
    pub(crate) interval: Duration,
    pub(crate) reset_on_receive: bool,
}

impl Heartbeat {
    pub(crate) fn new(interval: Duration, reset_on_receive: bool) -> Self {
        Self {
            state: HeartbeatState::new(),
            interval,
            reset_on_receive,
        }
    }

    pub(crate) fn tick(&mut self, real_elapsed_seconds: f32) -> Option<u32> {
        self.state
            .tick(real_elapsed_seconds, self.interval.as_secs_f32())
    }

    /// Reset after a packet was received.
    pub(crate) fn on_packet_received(&mut self) {
        let reset_elapsed = self.reset_on_receive;
        self.state.reset(reset_elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_interval_is_reached() {
        let mut state = HeartbeatState::new();

        assert_eq!(state.tick(4.9, 5.0), None);
        assert_eq!(state.miss_count(), 0);

        assert_eq!(state.tick(0.2, 5.0), Some(0));
        assert_eq!(state.miss_count(), 1);
        assert_eq!(state.elapsed_seconds(), 0.0);
    }

    #[test]
    fn miss_count_grows_until_reset() {
        let mut state = HeartbeatState::new();
        let mut priors = Vec::new();
        for _ in 0..4 {
            priors.push(state.tick(1.0, 1.0));
        }
        assert_eq!(priors, vec![Some(0), Some(1), Some(2), Some(3)]);
        assert_eq!(state.miss_count(), 4);

        state.reset(true);
        assert_eq!(state.miss_count(), 0);
        assert_eq!(state.elapsed_seconds(), 0.0);
    }

    #[test]
    fn reset_without_elapsed_keeps_timer_running() {
        let mut state = HeartbeatState::new();
        state.tick(3.0, 5.0);
        state.reset(false);
        assert_eq!(state.elapsed_seconds(), 3.0);
        assert_eq!(state.tick(2.0, 5.0), Some(0));
    }

    #[test]
    fn disabled_interval_never_fires() {
        let mut state = HeartbeatState::new();
        assert_eq!(state.tick(1000.0, 0.0), None);
        assert_eq!(state.elapsed_seconds(), 0.0);
    }

    #[test]
    fn receive_honors_reset_flag() {
        let mut keep_timer = Heartbeat::new(Duration::from_secs(5), false);
        keep_timer.tick(5.0);
        keep_timer.tick(2.0);
        keep_timer.on_packet_received();
        assert_eq!(keep_timer.state.miss_count(), 0);
        assert_eq!(keep_timer.state.elapsed_seconds(), 2.0);

        let mut restart = Heartbeat::new(Duration::from_secs(5), true);
        restart.tick(2.0);
        restart.on_packet_received();
        assert_eq!(restart.state.elapsed_seconds(), 0.0);
    }
}
