//! Power state coordination
//!
//! Brackets each engine invocation with a performance lock so the system
//! does not scale its clock down mid-computation. The lock is a guard:
//! release happens in `Drop`, so every acquire is paired with exactly one
//! release on every exit path, including engine failure and cancellation
//! of the computing future.

use owlcalc_hal::{ClockLevel, PowerControl, PowerError};

use crate::log::{debug, error};

/// Owner of the power capability for the compute task
pub struct PowerCoordinator<P: PowerControl> {
    control: P,
    held: bool,
    acquisitions: u32,
    releases: u32,
}

impl<P: PowerControl> PowerCoordinator<P> {
    /// Create the coordinator and its underlying performance lock
    ///
    /// Failing to create the lock is fatal for the compute task.
    pub fn new(mut control: P) -> Result<Self, PowerError> {
        if let Err(e) = control.create_lock() {
            error!("performance lock creation failed: {:?}", e);
            return Err(e);
        }

        Ok(Self {
            control,
            held: false,
            acquisitions: 0,
            releases: 0,
        })
    }

    /// Set the clock floor outside of a computation
    pub fn set_clock_floor(&mut self, level: ClockLevel) {
        debug!("clock floor -> {:?}", level);
        self.control.set_clock_floor(level);
    }

    /// Acquire the performance lock until the returned guard is dropped
    pub fn lock(&mut self) -> PerformanceLock<'_, P> {
        self.control.acquire_max_performance();
        self.held = true;
        self.acquisitions = self.acquisitions.wrapping_add(1);
        PerformanceLock { coordinator: self }
    }

    /// Check if the performance lock is currently held
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Number of times the lock was acquired
    pub fn acquisitions(&self) -> u32 {
        self.acquisitions
    }

    /// Number of times the lock was released
    pub fn releases(&self) -> u32 {
        self.releases
    }

    /// Borrow the underlying capability
    pub fn control(&self) -> &P {
        &self.control
    }
}

/// Held performance lock
///
/// Releases the lock when dropped.
pub struct PerformanceLock<'a, P: PowerControl> {
    coordinator: &'a mut PowerCoordinator<P>,
}

impl<P: PowerControl> Drop for PerformanceLock<'_, P> {
    fn drop(&mut self) {
        self.coordinator.control.release();
        self.coordinator.held = false;
        self.coordinator.releases = self.coordinator.releases.wrapping_add(1);
    }
}
