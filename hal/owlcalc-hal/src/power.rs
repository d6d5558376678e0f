//! Power state abstractions
//!
//! Provides the capability used to keep the CPU at full performance while
//! the engine is computing, and to pick the clock floor during warm-up.

/// Clock floor levels
///
/// The actual frequencies are board-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockLevel {
    /// Lowest supported clock, used while warming up
    Low,
    /// Board default clock
    Medium,
    /// Highest supported clock
    Max,
}

impl ClockLevel {
    /// Parse a level name as used in configuration files
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "low" => Some(ClockLevel::Low),
            "medium" => Some(ClockLevel::Medium),
            "max" => Some(ClockLevel::Max),
            _ => None,
        }
    }
}

/// Errors from power management setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerError {
    /// The performance lock could not be created
    LockUnavailable,
    /// Power management is not supported on this board
    Unsupported,
}

/// Power management capability
///
/// Implementations disable opportunistic frequency scaling and idle-state
/// reduction while a performance lock is held.
pub trait PowerControl {
    /// Create the underlying performance lock
    ///
    /// Called once at startup. An error here is fatal for the compute task.
    fn create_lock(&mut self) -> Result<(), PowerError>;

    /// Raise the performance floor to maximum
    fn acquire_max_performance(&mut self);

    /// Drop the performance floor taken by [`acquire_max_performance`]
    ///
    /// [`acquire_max_performance`]: PowerControl::acquire_max_performance
    fn release(&mut self);

    /// Set the minimum clock the system may scale down to
    fn set_clock_floor(&mut self, level: ClockLevel);
}

/// Power capability that does nothing
///
/// Used on the host and in tests, where there is no power management.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPower;

impl PowerControl for NoopPower {
    fn create_lock(&mut self) -> Result<(), PowerError> {
        Ok(())
    }

    fn acquire_max_performance(&mut self) {}

    fn release(&mut self) {}

    fn set_clock_floor(&mut self, _level: ClockLevel) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_level_from_name() {
        assert_eq!(ClockLevel::from_name("low"), Some(ClockLevel::Low));
        assert_eq!(ClockLevel::from_name("max"), Some(ClockLevel::Max));
        assert_eq!(ClockLevel::from_name("turbo"), None);
    }

    #[test]
    fn test_clock_level_ordering() {
        assert!(ClockLevel::Low < ClockLevel::Medium);
        assert!(ClockLevel::Medium < ClockLevel::Max);
    }

    #[test]
    fn test_noop_power_lock_always_created() {
        let mut power = NoopPower;
        assert_eq!(power.create_lock(), Ok(()));
    }
}
