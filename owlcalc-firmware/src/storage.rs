//! Flash-backed environment storage
//!
//! Each environment is one item in the environment partition, keyed by its
//! zero-padded name. A separate index item holds the newline-separated list
//! of stored names. Writes are buffered in RAM and committed on `close`.
//!
//! The engine calls these primitives synchronously from the compute task,
//! so the async flash operations are driven with `block_on`.

use defmt::*;
use embassy_futures::block_on;
use heapless::Vec;

use owlcalc_core::fit_name_list;
use owlcalc_hal::{EnvStorage, OpenMode, StorageStatus, MAX_ENV_NAME};

use crate::flash::{self, Flash, FlashError, ENV_RANGE, MAX_ITEM_SIZE};

/// Largest environment in bytes
pub const ENV_FILE_LEN: usize = MAX_ITEM_SIZE;

/// Largest name index in bytes
const INDEX_LEN: usize = 1024;

/// Storage key of an environment
type EnvKey = [u8; MAX_ENV_NAME];

/// Key of the name index; never a valid UTF-8 name
const INDEX_KEY: EnvKey = [0xFF; MAX_ENV_NAME];

/// Build the storage key for an environment name
fn env_key(name: &str) -> Option<EnvKey> {
    if name.is_empty() || name.len() > MAX_ENV_NAME {
        return None;
    }
    let mut key = [0u8; MAX_ENV_NAME];
    key[..name.len()].copy_from_slice(name.as_bytes());
    Some(key)
}

/// Environment currently open
struct OpenEnv {
    key: EnvKey,
    name_len: usize,
    mode: OpenMode,
}

/// Environment storage in the on-board flash
pub struct FlashEnvStorage {
    flash: Flash,
    mounted: bool,
    open: Option<OpenEnv>,
    data: Vec<u8, ENV_FILE_LEN>,
    cursor: usize,
}

impl FlashEnvStorage {
    /// Create storage over the flash driver; nothing is read until mount
    pub fn new(flash: Flash) -> Self {
        Self {
            flash,
            mounted: false,
            open: None,
            data: Vec::new(),
            cursor: 0,
        }
    }

    /// Read the name index into `out`
    fn read_index(&mut self, out: &mut [u8]) -> Result<usize, FlashError> {
        match block_on(flash::read_item(&mut self.flash, ENV_RANGE, &INDEX_KEY, out)) {
            Err(FlashError::NotFound) => Ok(0),
            other => other,
        }
    }

    /// Add `name` to the index if it is not listed yet
    fn index_name(&mut self, name: &[u8]) -> Result<(), FlashError> {
        let mut index = [0u8; INDEX_LEN];
        let len = self.read_index(&mut index)?;

        if index[..len].split(|&b| b == b'\n').any(|entry| entry == name) {
            return Ok(());
        }

        let new_len = len + name.len() + 1;
        if new_len > INDEX_LEN {
            return Err(FlashError::BufferTooSmall);
        }
        index[len..len + name.len()].copy_from_slice(name);
        index[new_len - 1] = b'\n';

        block_on(flash::write_item(
            &mut self.flash,
            ENV_RANGE,
            &INDEX_KEY,
            &index[..new_len],
        ))
    }
}

impl EnvStorage for FlashEnvStorage {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn mount(&mut self) -> i32 {
        let mut probe = [0u8; INDEX_LEN];
        match self.read_index(&mut probe) {
            Ok(_) => {
                self.mounted = true;
                StorageStatus::Ok.code()
            }
            Err(e) => {
                error!("Environment partition unreadable: {:?}", e);
                StorageStatus::MountFail.code()
            }
        }
    }

    fn open(&mut self, name: &str, mode: OpenMode) -> i32 {
        let Some(key) = env_key(name) else {
            return StorageStatus::LongName.code();
        };

        if self.open.is_some() {
            warn!("Environment still open, closing it first");
            self.close();
        }

        self.data.clear();
        self.cursor = 0;

        if mode == OpenMode::Read {
            let mut buf = [0u8; ENV_FILE_LEN];
            match block_on(flash::read_item(&mut self.flash, ENV_RANGE, &key, &mut buf)) {
                Ok(len) => {
                    // Items are never larger than ENV_FILE_LEN
                    let _ = self.data.extend_from_slice(&buf[..len]);
                }
                Err(FlashError::NotFound) => {
                    debug!("Environment '{}' not found", name);
                    return StorageStatus::NotExists.code();
                }
                Err(e) => {
                    warn!("Environment read failed: {:?}", e);
                    return StorageStatus::ReadFail.code();
                }
            }
        }

        self.open = Some(OpenEnv {
            key,
            name_len: name.len(),
            mode,
        });
        StorageStatus::Ok.code()
    }

    fn close(&mut self) -> i32 {
        let Some(env) = self.open.take() else {
            return StorageStatus::Ok.code();
        };

        if env.mode == OpenMode::Read {
            return StorageStatus::Ok.code();
        }

        let stored = block_on(flash::write_item(
            &mut self.flash,
            ENV_RANGE,
            &env.key,
            &self.data,
        ))
        .and_then(|()| self.index_name(&env.key[..env.name_len]));

        match stored {
            Ok(()) => {
                info!("Environment saved ({} bytes)", self.data.len());
                StorageStatus::Ok.code()
            }
            Err(e) => {
                warn!("Environment write failed: {:?}", e);
                StorageStatus::WriteFail.code()
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> i32 {
        match self.open {
            Some(OpenEnv {
                mode: OpenMode::Read,
                ..
            }) => {}
            _ => return StorageStatus::ReadFail.code(),
        }

        let remaining = &self.data[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        n as i32
    }

    fn write(&mut self, buf: &[u8]) -> i32 {
        match self.open {
            Some(OpenEnv {
                mode: OpenMode::Write,
                ..
            }) => {}
            _ => return StorageStatus::WriteFail.code(),
        }

        if self.data.extend_from_slice(buf).is_err() {
            warn!("Environment larger than {} bytes", ENV_FILE_LEN);
            return StorageStatus::WriteFail.code();
        }
        buf.len() as i32
    }

    fn list(&mut self, out: &mut [u8]) -> i32 {
        let mut index = [0u8; INDEX_LEN];
        match self.read_index(&mut index) {
            Ok(len) => {
                let n = fit_name_list(&index[..len], out.len());
                if n < len {
                    warn!(
                        "Environment list truncated to {} of {} bytes",
                        n, len
                    );
                }
                out[..n].copy_from_slice(&index[..n]);
                n as i32
            }
            Err(e) => {
                warn!("Environment index read failed: {:?}", e);
                StorageStatus::ReadFail.code()
            }
        }
    }
}
