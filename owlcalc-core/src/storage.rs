//! Environment storage wiring
//!
//! Wraps the board's storage so the medium is mounted on first use, names
//! are length-checked before reaching the medium, and storage can be
//! disabled by configuration. Status codes from the medium are passed
//! through unchanged.

use owlcalc_hal::{EnvStorage, OpenMode, StorageStatus, MAX_ENV_NAME};

use crate::log::{info, warn};

/// Storage handed to the engine
pub struct LazyStorage<S: EnvStorage> {
    inner: S,
    enabled: bool,
    open: bool,
}

impl<S: EnvStorage> LazyStorage<S> {
    /// Wrap a medium; it is not mounted until first use
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            enabled: true,
            open: false,
        }
    }

    /// Wrap a medium that the engine may not use
    ///
    /// Every primitive reports [`StorageStatus::NotImplemented`].
    pub fn disabled(inner: S) -> Self {
        Self {
            inner,
            enabled: false,
            open: false,
        }
    }

    /// Check if an environment is currently open
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Borrow the wrapped medium
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn ensure_mounted(&mut self) -> i32 {
        if self.inner.is_mounted() {
            return StorageStatus::Ok.code();
        }

        info!("mounting environment storage");
        let code = self.inner.mount();
        if code < 0 {
            warn!("storage mount failed: {}", code);
        }
        code
    }
}

impl<S: EnvStorage> EnvStorage for LazyStorage<S> {
    fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    fn mount(&mut self) -> i32 {
        if !self.enabled {
            return StorageStatus::NotImplemented.code();
        }
        self.ensure_mounted()
    }

    fn open(&mut self, name: &str, mode: OpenMode) -> i32 {
        if !self.enabled {
            return StorageStatus::NotImplemented.code();
        }
        if name.len() > MAX_ENV_NAME {
            warn!("environment name too long ({} bytes)", name.len());
            return StorageStatus::LongName.code();
        }

        let code = self.ensure_mounted();
        if code < 0 {
            return code;
        }

        let code = self.inner.open(name, mode);
        self.open = code >= 0;
        code
    }

    fn close(&mut self) -> i32 {
        if !self.enabled {
            return StorageStatus::NotImplemented.code();
        }
        if !self.open {
            return StorageStatus::Ok.code();
        }
        self.open = false;
        self.inner.close()
    }

    fn read(&mut self, buf: &mut [u8]) -> i32 {
        if !self.enabled {
            return StorageStatus::NotImplemented.code();
        }
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> i32 {
        if !self.enabled {
            return StorageStatus::NotImplemented.code();
        }
        self.inner.write(buf)
    }

    fn list(&mut self, out: &mut [u8]) -> i32 {
        if !self.enabled {
            return StorageStatus::NotImplemented.code();
        }

        let code = self.ensure_mounted();
        if code < 0 {
            return code;
        }

        self.inner.list(out)
    }
}

/// Length of the newline-separated `names` that fits in `capacity` bytes
///
/// A list that does not fit is cut after the last whole name.
pub fn fit_name_list(names: &[u8], capacity: usize) -> usize {
    if names.len() <= capacity {
        return names.len();
    }
    names[..capacity]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Medium that counts mounts and can be told to fail
    #[derive(Default)]
    struct FakeMedium {
        mounted: bool,
        mounts: u32,
        mount_code: i32,
        closes: u32,
    }

    impl EnvStorage for FakeMedium {
        fn is_mounted(&self) -> bool {
            self.mounted
        }

        fn mount(&mut self) -> i32 {
            self.mounts += 1;
            self.mounted = self.mount_code >= 0;
            self.mount_code
        }

        fn open(&mut self, name: &str, _mode: OpenMode) -> i32 {
            if name == "missing" {
                StorageStatus::NotExists.code()
            } else {
                0
            }
        }

        fn close(&mut self) -> i32 {
            self.closes += 1;
            0
        }

        fn read(&mut self, buf: &mut [u8]) -> i32 {
            buf.len() as i32
        }

        fn write(&mut self, _buf: &[u8]) -> i32 {
            StorageStatus::WriteFail.code()
        }

        fn list(&mut self, out: &mut [u8]) -> i32 {
            out[..3].copy_from_slice(b"env");
            3
        }
    }

    #[test]
    fn test_mounts_once_on_first_use() {
        let mut storage = LazyStorage::new(FakeMedium::default());
        assert!(!storage.is_mounted());

        assert_eq!(storage.open("env", OpenMode::Read), 0);
        assert_eq!(storage.close(), 0);
        let mut out = [0u8; 16];
        assert_eq!(storage.list(&mut out), 3);

        assert!(storage.is_mounted());
        assert_eq!(storage.inner().mounts, 1);
    }

    #[test]
    fn test_mount_failure_passed_through() {
        let medium = FakeMedium {
            mount_code: StorageStatus::NotInserted.code(),
            ..Default::default()
        };
        let mut storage = LazyStorage::new(medium);
        assert_eq!(storage.open("env", OpenMode::Write), -1);
        assert!(!storage.is_open());
    }

    #[test]
    fn test_long_name_rejected_before_mount() {
        let mut storage = LazyStorage::new(FakeMedium::default());
        let name = "n".repeat(MAX_ENV_NAME + 1);
        assert_eq!(storage.open(&name, OpenMode::Read), -6);
        assert_eq!(storage.inner().mounts, 0);
    }

    #[test]
    fn test_error_codes_passed_through() {
        let mut storage = LazyStorage::new(FakeMedium::default());
        assert_eq!(storage.open("missing", OpenMode::Read), -3);
        assert_eq!(storage.write(b"x = 1"), -4);
    }

    #[test]
    fn test_close_without_open_is_noop() {
        let mut storage = LazyStorage::new(FakeMedium::default());
        assert_eq!(storage.close(), 0);
        assert_eq!(storage.inner().closes, 0);
    }

    #[test]
    fn test_name_list_fits() {
        assert_eq!(fit_name_list(b"one\ntwo\n", 8), 8);
        assert_eq!(fit_name_list(b"", 0), 0);
    }

    #[test]
    fn test_name_list_cut_after_whole_name() {
        let names = b"alpha\nbeta\ngamma\n";
        assert_eq!(fit_name_list(names, 15), 11);
        assert_eq!(fit_name_list(names, 11), 11);
        assert_eq!(fit_name_list(names, 10), 6);
        assert_eq!(fit_name_list(names, 4), 0);
    }

    #[test]
    fn test_disabled_storage() {
        let mut storage = LazyStorage::disabled(FakeMedium::default());
        let mut buf = [0u8; 4];
        assert_eq!(storage.open("env", OpenMode::Read), -8);
        assert_eq!(storage.read(&mut buf), -8);
        assert_eq!(storage.list(&mut buf), -8);
        assert_eq!(storage.inner().mounts, 0);
    }
}
