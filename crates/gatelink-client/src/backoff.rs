//! Reconnect backoff.

use gatelink_core::config::ReconnectConfig;
use std::time::Duration;

/// Exponential backoff with a cap and no retry limit.
///
/// The delay grows by `multiplier` after every scheduled attempt and returns
/// to the base value after a successful handshake.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: f64,
    multiplier: f64,
    max_ms: f64,
    current_ms: f64,
}

impl Backoff {
    /// Create a backoff starting at `base_ms`.
    pub fn new(base_ms: u64, multiplier: f64, max_ms: u64) -> Self {
        let base_ms = base_ms as f64;
        Self {
            base_ms,
            multiplier,
            max_ms: max_ms as f64,
            current_ms: base_ms,
        }
    }

    /// Create a backoff from the `reconnect` config section.
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.base_delay_ms, config.multiplier, config.max_delay_ms)
    }

    /// Delay for the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_ms;
        self.current_ms = (self.current_ms * self.multiplier).min(self.max_ms);
        Duration::from_millis(delay as u64)
    }

    /// Delay the next call to [`Backoff::next_delay`] will return.
    pub fn peek(&self) -> Duration {
        Duration::from_millis(self.current_ms as u64)
    }

    /// Return to the base delay.
    pub fn reset(&mut self) {
        self.current_ms = self.base_ms;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}
