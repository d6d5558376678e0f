//! Flash partitions
//!
//! Uses sequential-storage for wear-leveled key-value storage in the last
//! 128KB of flash: one partition for configuration, one for environments.

use embassy_rp::flash::{Async, Flash as RpFlash};
use embassy_rp::peripherals::FLASH;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{self, Key};

/// Flash storage configuration
pub const FLASH_SIZE: usize = 2 * 1024 * 1024; // 2MB flash on the Pico
pub const PARTITION_SIZE: usize = 64 * 1024;

/// Flash range for the config partition
pub const CONFIG_RANGE: core::ops::Range<u32> =
    (FLASH_SIZE - 2 * PARTITION_SIZE) as u32..(FLASH_SIZE - PARTITION_SIZE) as u32;

/// Flash range for the environment partition
pub const ENV_RANGE: core::ops::Range<u32> = (FLASH_SIZE - PARTITION_SIZE) as u32..FLASH_SIZE as u32;

/// Largest item stored in either partition
pub const MAX_ITEM_SIZE: usize = 4096;

/// Item scratch buffer: item plus key and header overhead
const SCRATCH_SIZE: usize = MAX_ITEM_SIZE + 128;

/// On-board flash driver
pub type Flash = RpFlash<'static, FLASH, Async, FLASH_SIZE>;

/// Flash storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// No item stored under the key
    NotFound,
    /// Item does not fit the caller's buffer
    BufferTooSmall,
    /// sequential-storage reported an error
    Storage,
}

/// Read the item stored under `key` into `buffer`
///
/// # Returns
/// The number of bytes copied.
pub async fn read_item<K: Key>(
    flash: &mut Flash,
    range: core::ops::Range<u32>,
    key: &K,
    buffer: &mut [u8],
) -> Result<usize, FlashError> {
    let mut data_buffer = [0u8; SCRATCH_SIZE];

    let result = map::fetch_item::<K, &[u8], _>(
        flash,
        range,
        &mut NoCache::new(),
        &mut data_buffer,
        key,
    )
    .await;

    match result {
        Ok(Some(data)) => {
            let len = data.len();
            if buffer.len() < len {
                return Err(FlashError::BufferTooSmall);
            }
            buffer[..len].copy_from_slice(data);
            Ok(len)
        }
        Ok(None) => Err(FlashError::NotFound),
        Err(_) => Err(FlashError::Storage),
    }
}

/// Store `data` under `key`, replacing any previous item
pub async fn write_item<K: Key>(
    flash: &mut Flash,
    range: core::ops::Range<u32>,
    key: &K,
    data: &[u8],
) -> Result<(), FlashError> {
    if data.len() > MAX_ITEM_SIZE {
        return Err(FlashError::BufferTooSmall);
    }

    let mut data_buffer = [0u8; SCRATCH_SIZE];

    map::store_item(
        flash,
        range,
        &mut NoCache::new(),
        &mut data_buffer,
        key,
        &data,
    )
    .await
    .map_err(|_| FlashError::Storage)
}
