//! Configuration type definitions
//!
//! Timeouts and power settings are runtime configuration. Buffer capacities
//! are compile-time constants because every buffer is statically sized.

use embassy_time::Duration;
use owlcalc_hal::ClockLevel;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Request (expression) buffer capacity in bytes
pub const INPUT_LEN: usize = 1024;

/// Response buffer capacity in bytes
pub const OUTPUT_LEN: usize = 4096;

/// Output side-channel message capacity in bytes
pub const MESSAGE_LEN: usize = 256;

/// Current configuration layout version
pub const CONFIG_VERSION: u8 = 1;

/// Compute protocol configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalcConfig {
    /// Config version (for migration)
    pub version: u8,
    /// How long `submit` waits for request ownership
    pub lock_timeout_ms: u32,
    /// How long a caller waits for the computation to complete
    pub result_timeout_ms: u32,
    /// How long the engine waits for the output slot to be acknowledged
    pub ack_timeout_ms: u32,
    /// Cadence of the background output poller
    pub poll_interval_ms: u32,
    /// Clock floor while the engine warms up
    pub warmup_clock: ClockLevel,
    /// Clock floor once the compute task is ready
    pub ready_clock: ClockLevel,
    /// Whether the engine gets access to environment storage
    pub storage_enabled: bool,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            lock_timeout_ms: 2500,
            result_timeout_ms: 10_000,
            ack_timeout_ms: 500,
            poll_interval_ms: 150,
            warmup_clock: ClockLevel::Low,
            ready_clock: ClockLevel::Max,
            storage_enabled: true,
        }
    }
}

impl CalcConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms as u64)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms as u64)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms as u64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms as u64)
    }

    /// Check that every wait is bounded and non-zero
    ///
    /// A zero lock or result timeout would make every call fail, and a
    /// zero poll interval would spin the poller.
    pub fn is_valid(&self) -> bool {
        self.lock_timeout_ms > 0
            && self.result_timeout_ms > 0
            && self.poll_interval_ms > 0
            && self.warmup_clock <= self.ready_clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CalcConfig::default();
        assert!(config.is_valid());
        assert_eq!(config.lock_timeout(), Duration::from_millis(2500));
        assert_eq!(config.poll_interval(), Duration::from_millis(150));
    }

    #[test]
    fn test_zero_poll_interval_invalid() {
        let config = CalcConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(!config.is_valid());
    }

    #[test]
    fn test_warmup_above_ready_invalid() {
        let config = CalcConfig {
            warmup_clock: ClockLevel::Max,
            ready_clock: ClockLevel::Low,
            ..Default::default()
        };
        assert!(!config.is_valid());
    }
}
