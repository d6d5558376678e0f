//! Bounded text buffers
//!
//! Every buffer that crosses a task boundary has a fixed capacity. Copies
//! into a buffer are checked and fail with [`LengthExceeded`] instead of
//! overflowing.

use core::fmt;
use core::ops::Deref;

use heapless::String;

/// Text did not fit into a bounded buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LengthExceeded {
    /// Buffer capacity in bytes
    pub capacity: usize,
    /// Length that was required in bytes
    pub len: usize,
}

/// Fixed-capacity, owned UTF-8 buffer
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BoundedText<const N: usize> {
    text: String<N>,
}

impl<const N: usize> BoundedText<N> {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    /// Create a buffer holding a copy of `text`
    pub fn from_text(text: &str) -> Result<Self, LengthExceeded> {
        let mut buf = Self::new();
        buf.set(text)?;
        Ok(buf)
    }

    /// Buffer capacity in bytes
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Replace the contents with `text`
    ///
    /// On error the previous contents are left untouched.
    pub fn set(&mut self, text: &str) -> Result<(), LengthExceeded> {
        check_fits::<N>(text.len())?;
        self.text.clear();
        // Length checked above
        let _ = self.text.push_str(text);
        Ok(())
    }

    /// Append `text`
    ///
    /// On error nothing is appended.
    pub fn push_str(&mut self, text: &str) -> Result<(), LengthExceeded> {
        let len = self.text.len() + text.len();
        check_fits::<N>(len)?;
        let _ = self.text.push_str(text);
        Ok(())
    }

    /// Append a single character
    pub fn push(&mut self, c: char) -> Result<(), LengthExceeded> {
        let len = self.text.len() + c.len_utf8();
        check_fits::<N>(len)?;
        let _ = self.text.push(c);
        Ok(())
    }

    /// Remove all contents
    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Borrow the contents
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    /// Remaining free space in bytes
    pub fn remaining(&self) -> usize {
        N - self.text.len()
    }
}

fn check_fits<const N: usize>(len: usize) -> Result<(), LengthExceeded> {
    if len > N {
        Err(LengthExceeded { capacity: N, len })
    } else {
        Ok(())
    }
}

/// Longest UTF-8 text at the start of `bytes`
///
/// Text pushed across a byte-chunked boundary can have a character split
/// between chunks. Continuation bytes at the start and a partial character
/// at the end are dropped; everything up to the first invalid sequence is
/// kept.
pub fn utf8_prefix(bytes: &[u8]) -> &str {
    let start = bytes
        .iter()
        .position(|&b| b & 0xC0 != 0x80)
        .unwrap_or(bytes.len());
    let bytes = &bytes[start..];

    match core::str::from_utf8(bytes) {
        Ok(text) => text,
        // Valid up to this index by construction
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}

impl<const N: usize> Deref for BoundedText<N> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> fmt::Debug for BoundedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for BoundedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> PartialEq<str> for BoundedText<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for BoundedText<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(feature = "defmt")]
impl<const N: usize> defmt::Format for BoundedText<N> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}
