//! RP2040 power capability
//!
//! The RP2040 runs from a fixed system clock, so the clock floor and the
//! performance lock are bookkeeping published in atomics for the
//! heartbeat in `main`.

use defmt::*;
use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use owlcalc_hal::{ClockLevel, PowerControl, PowerError};

/// Set once the single performance lock exists
static LOCK_CREATED: AtomicBool = AtomicBool::new(false);

/// Outstanding performance lock holds
static HOLDS: AtomicU32 = AtomicU32::new(0);

/// Current clock floor, as `ClockLevel as u8`
static CLOCK_FLOOR: AtomicU8 = AtomicU8::new(ClockLevel::Low as u8);

/// Outstanding performance lock holds
pub fn performance_holds() -> u32 {
    HOLDS.load(Ordering::Acquire)
}

/// Current clock floor
pub fn clock_floor() -> ClockLevel {
    match CLOCK_FLOOR.load(Ordering::Relaxed) {
        0 => ClockLevel::Low,
        1 => ClockLevel::Medium,
        _ => ClockLevel::Max,
    }
}

/// RP2040 power capability
pub struct Rp2040Power {
    _private: (),
}

impl Rp2040Power {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl PowerControl for Rp2040Power {
    fn create_lock(&mut self) -> Result<(), PowerError> {
        if LOCK_CREATED.swap(true, Ordering::AcqRel) {
            // A second compute task would share the hold count
            return Err(PowerError::LockUnavailable);
        }
        Ok(())
    }

    fn acquire_max_performance(&mut self) {
        let holds = HOLDS.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Performance lock acquired ({} holds)", holds);
    }

    fn release(&mut self) {
        let holds = HOLDS.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        trace!("Performance lock released ({} holds)", holds);
    }

    fn set_clock_floor(&mut self, level: ClockLevel) {
        CLOCK_FLOOR.store(level as u8, Ordering::Relaxed);
        info!("Clock floor set to {:?}", level);
    }
}
