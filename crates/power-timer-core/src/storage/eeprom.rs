//! Byte-addressable storage medium abstraction
//!
//! The store only needs random-access reads, writes and an explicit commit
//! (the flash-emulated EEPROM of the controller stages writes in RAM until
//! committed). Hardware drivers implement [`Eeprom`]; [`MemoryEeprom`] is the
//! RAM-backed medium used by tests and the simulator.

use alloc::vec;
use alloc::vec::Vec;

use thiserror_no_std::Error;

/// Trait for the non-volatile medium backing the event store.
pub trait Eeprom {
    /// Driver-specific error.
    type Error: core::fmt::Debug;

    /// Size of the medium in bytes.
    fn capacity(&self) -> usize;

    /// Fill `buf` with the bytes starting at `offset`.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Stage `data` at `offset`. Staged bytes are visible to `read` but only
    /// survive a power cycle after [`Eeprom::commit`].
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush staged writes to the medium.
    fn commit(&mut self) -> Result<(), Self::Error>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEepromError {
    #[error("access of {len} bytes at {offset} exceeds the {capacity} byte medium")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
}

/// RAM-backed [`Eeprom`].
///
/// Counts writes and commits so callers can check how often the medium was
/// touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEeprom {
    bytes: Vec<u8>,
    writes: usize,
    commits: usize,
}

impl MemoryEeprom {
    /// Create a zero-filled medium of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self::with_contents(vec![0; capacity])
    }

    /// Wrap an existing image (e.g. one read back from a file)
    pub fn with_contents(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            writes: 0,
            commits: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of `write` calls so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Number of `commit` calls so far
    pub fn commits(&self) -> usize {
        self.commits
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), MemoryEepromError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(()),
            _ => Err(MemoryEepromError::OutOfBounds {
                offset,
                len,
                capacity: self.bytes.len(),
            }),
        }
    }
}

impl Eeprom for MemoryEeprom {
    type Error = MemoryEepromError;

    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.check(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        self.check(offset, data.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        self.commits += 1;
        Ok(())
    }
}

/// Medium that keeps staged and durable images apart and can be told to
/// fail commits.
#[cfg(test)]
pub(crate) struct StagedEeprom {
    staged: MemoryEeprom,
    durable: Vec<u8>,
    failing_commits: usize,
}

#[cfg(test)]
impl StagedEeprom {
    pub(crate) fn new(capacity: usize) -> Self {
        Self::with_contents(vec![0; capacity])
    }

    /// Start from an image that is already durable.
    pub(crate) fn with_contents(bytes: Vec<u8>) -> Self {
        Self {
            staged: MemoryEeprom::with_contents(bytes.clone()),
            durable: bytes,
            failing_commits: 0,
        }
    }

    /// Make the next `count` commits fail.
    pub(crate) fn fail_commits(&mut self, count: usize) {
        self.failing_commits = count;
    }

    pub(crate) fn staged(&self) -> &[u8] {
        self.staged.as_bytes()
    }

    /// Image as it would read back after a power cycle.
    pub(crate) fn durable(&self) -> MemoryEeprom {
        MemoryEeprom::with_contents(self.durable.clone())
    }
}

#[cfg(test)]
impl Eeprom for StagedEeprom {
    type Error = &'static str;

    fn capacity(&self) -> usize {
        self.staged.capacity()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.staged.read(offset, buf).map_err(|_| "read out of bounds")
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        self.staged.write(offset, data).map_err(|_| "write out of bounds")
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        if self.failing_commits > 0 {
            self.failing_commits -= 1;
            return Err("commit failed");
        }
        self.durable.copy_from_slice(self.staged.as_bytes());
        Ok(())
    }
}
