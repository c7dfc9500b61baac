//! EEPROM image persisted to a file on the host.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use log::{debug, info};
use power_timer_core::storage::MemoryEepromError;
use power_timer_core::{Eeprom, MemoryEeprom};
use thiserror_no_std::Error;

#[derive(Error, Debug)]
pub enum FileEepromError {
    #[error("{0}")]
    Bounds(#[from] MemoryEepromError),
    #[error("writing the image file failed: {0:?}")]
    Io(ErrorKind),
}

/// Writes are staged in RAM and the whole image is rewritten on commit, like
/// the flash-emulated EEPROM on the controller.
pub struct FileEeprom {
    path: PathBuf,
    staged: MemoryEeprom,
}

impl FileEeprom {
    /// Open the image at `path`, or start a blank one if it doesn't exist.
    ///
    /// The image is zero-padded up to `capacity` bytes.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut bytes = match fs::read(&path) {
            Ok(bytes) => {
                info!("Loaded {} byte EEPROM image from {}", bytes.len(), path.display());
                bytes
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No EEPROM image at {}, starting blank", path.display());
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        if bytes.len() < capacity {
            bytes.resize(capacity, 0);
        }

        Ok(Self {
            path,
            staged: MemoryEeprom::with_contents(bytes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Eeprom for FileEeprom {
    type Error = FileEepromError;

    fn capacity(&self) -> usize {
        self.staged.capacity()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        Ok(self.staged.read(offset, buf)?)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        Ok(self.staged.write(offset, data)?)
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        fs::write(&self.path, self.staged.as_bytes())
            .map_err(|e| FileEepromError::Io(e.kind()))?;
        debug!("Committed EEPROM image to {}", self.path.display());
        Ok(())
    }
}
