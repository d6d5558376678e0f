//! Environment storage abstractions
//!
//! The engine persists and loads named "environments" through these
//! primitives. They are plain call/return contracts with integer status
//! codes, matching what the engine expects across its call boundary.
//! Callers in the protocol layer pass the codes through unchanged.

/// Maximum environment name length in bytes
pub const MAX_ENV_NAME: usize = 64;

/// Status codes returned by storage primitives
///
/// Negative values are errors; `read`/`write`/`list` return a
/// non-negative byte count on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum StorageStatus {
    /// Operation succeeded
    Ok = 0,
    /// No medium present
    NotInserted = -1,
    /// Medium present but could not be mounted
    MountFail = -2,
    /// Named environment does not exist
    NotExists = -3,
    /// Write failed
    WriteFail = -4,
    /// Read failed
    ReadFail = -5,
    /// Environment name longer than [`MAX_ENV_NAME`]
    LongName = -6,
    /// Environment directory could not be created
    MkdirErr = -7,
    /// No storage is wired to the engine
    NotImplemented = -8,
}

impl StorageStatus {
    /// Get the status as an integer code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Create a status from an integer code
    ///
    /// Positive values are byte counts, not statuses, and map to `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(StorageStatus::Ok),
            -1 => Some(StorageStatus::NotInserted),
            -2 => Some(StorageStatus::MountFail),
            -3 => Some(StorageStatus::NotExists),
            -4 => Some(StorageStatus::WriteFail),
            -5 => Some(StorageStatus::ReadFail),
            -6 => Some(StorageStatus::LongName),
            -7 => Some(StorageStatus::MkdirErr),
            -8 => Some(StorageStatus::NotImplemented),
            _ => None,
        }
    }

    /// Human-readable description, as shown to the user by the engine
    pub fn description(self) -> &'static str {
        match self {
            StorageStatus::Ok => "ok",
            StorageStatus::NotInserted => "SD card not inserted",
            StorageStatus::MountFail => "SD card mount failure",
            StorageStatus::NotExists => "SD card file not exists",
            StorageStatus::WriteFail => "SD card write failure",
            StorageStatus::ReadFail => "SD card read failure",
            StorageStatus::LongName => "too long file name",
            StorageStatus::MkdirErr => "make dir error",
            StorageStatus::NotImplemented => "not implemented",
        }
    }
}

/// File open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenMode {
    /// Open an existing environment for reading
    Read,
    /// Create or truncate an environment for writing
    Write,
}

impl OpenMode {
    /// Parse a C-style mode string ("r", "w")
    pub fn from_mode_str(mode: &str) -> Option<Self> {
        match mode {
            "r" | "rb" => Some(OpenMode::Read),
            "w" | "wb" => Some(OpenMode::Write),
            _ => None,
        }
    }
}

/// Environment storage trait
///
/// At most one environment is open at a time. Implementations should handle:
/// - Mounting the medium (the protocol layer mounts lazily, on first use)
/// - Mapping environment names to files or records
/// - Reporting failures as negative [`StorageStatus`] codes
pub trait EnvStorage {
    /// Check if the medium is mounted
    fn is_mounted(&self) -> bool {
        true
    }

    /// Mount the medium
    ///
    /// # Returns
    /// `0` on success or a negative status code.
    fn mount(&mut self) -> i32 {
        StorageStatus::Ok.code()
    }

    /// Open a named environment
    fn open(&mut self, name: &str, mode: OpenMode) -> i32;

    /// Close the currently open environment
    fn close(&mut self) -> i32;

    /// Read from the open environment
    ///
    /// # Returns
    /// The number of bytes read (`0` at end of data), or a negative status code.
    fn read(&mut self, buf: &mut [u8]) -> i32;

    /// Write to the open environment
    ///
    /// # Returns
    /// The number of bytes written, or a negative status code.
    fn write(&mut self, buf: &[u8]) -> i32;

    /// List stored environment names, newline separated
    ///
    /// # Returns
    /// The number of bytes written into `out`, or a negative status code.
    fn list(&mut self, out: &mut [u8]) -> i32;
}

impl<S: EnvStorage + ?Sized> EnvStorage for &mut S {
    fn is_mounted(&self) -> bool {
        (**self).is_mounted()
    }

    fn mount(&mut self) -> i32 {
        (**self).mount()
    }

    fn open(&mut self, name: &str, mode: OpenMode) -> i32 {
        (**self).open(name, mode)
    }

    fn close(&mut self) -> i32 {
        (**self).close()
    }

    fn read(&mut self, buf: &mut [u8]) -> i32 {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> i32 {
        (**self).write(buf)
    }

    fn list(&mut self, out: &mut [u8]) -> i32 {
        (**self).list(out)
    }
}

/// Storage that is not wired to anything
///
/// Every primitive reports [`StorageStatus::NotImplemented`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStorage;

impl EnvStorage for NoStorage {
    fn open(&mut self, _name: &str, _mode: OpenMode) -> i32 {
        StorageStatus::NotImplemented.code()
    }

    fn close(&mut self) -> i32 {
        StorageStatus::NotImplemented.code()
    }

    fn read(&mut self, _buf: &mut [u8]) -> i32 {
        StorageStatus::NotImplemented.code()
    }

    fn write(&mut self, _buf: &[u8]) -> i32 {
        StorageStatus::NotImplemented.code()
    }

    fn list(&mut self, _out: &mut [u8]) -> i32 {
        StorageStatus::NotImplemented.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_roundtrip() {
        for code in -8..=0 {
            let status = StorageStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn test_byte_counts_are_not_statuses() {
        assert_eq!(StorageStatus::from_code(12), None);
        assert_eq!(StorageStatus::from_code(-9), None);
    }

    #[test]
    fn test_open_mode_parsing() {
        assert_eq!(OpenMode::from_mode_str("r"), Some(OpenMode::Read));
        assert_eq!(OpenMode::from_mode_str("w"), Some(OpenMode::Write));
        assert_eq!(OpenMode::from_mode_str("a+"), None);
    }

    #[test]
    fn test_no_storage_reports_not_implemented() {
        let mut storage = NoStorage;
        let mut buf = [0u8; 8];
        assert_eq!(storage.open("env", OpenMode::Read), -8);
        assert_eq!(storage.read(&mut buf), -8);
        assert_eq!(storage.write(b"x"), -8);
        assert_eq!(storage.list(&mut buf), -8);
        assert_eq!(storage.close(), -8);
        assert!(storage.is_mounted());
    }

    #[test]
    fn test_borrowed_storage_forwards() {
        fn open_env(mut storage: impl EnvStorage) -> i32 {
            storage.open("env", OpenMode::Write)
        }

        let mut storage = NoStorage;
        assert_eq!(open_env(&mut storage), -8);
    }
}
