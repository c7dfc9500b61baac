use log::{debug, error, info};

use super::{Eeprom, HEADER_SIZE, LayoutMismatch, StoreError, StoreHeader, StoreLayout, Tier};
use crate::records::SlotRecord;

/// Largest slot of any tier; sizes the scratch buffer used for slot I/O.
const MAX_RECORD_SIZE: usize = {
    let mut max = 0;
    let mut i = 0;
    while i < Tier::ALL.len() {
        if Tier::ALL[i].record_size() > max {
            max = Tier::ALL[i].record_size();
        }
        i += 1;
    }
    max
};

/// Outcome of reading the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCheck {
    /// Header matches this build; slot data can be trusted.
    Valid(StoreHeader),
    /// Header differs; the image must be wiped before use.
    Mismatch(LayoutMismatch),
}

/// Versioned EEPROM image holding the header and the three slot arrays.
///
/// This type only deals in bytes and offsets. Keeping it consistent with the
/// in-memory mirror is the job of [`EventStore`](crate::events::EventStore).
pub struct PersistentStore<E: Eeprom> {
    medium: E,
    layout: StoreLayout,
}

impl<E: Eeprom> PersistentStore<E> {
    /// Wrap a medium, checking that it can hold the whole image.
    pub fn new(medium: E) -> Result<Self, StoreError> {
        let layout = StoreLayout::CURRENT;
        let actual = medium.capacity();
        if actual < layout.total_size() {
            error!(
                "EEPROM too small: {} bytes available, {} required",
                actual,
                layout.total_size()
            );
            return Err(StoreError::MediumTooSmall {
                required: layout.total_size(),
                actual,
            });
        }
        Ok(Self { medium, layout })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn medium(&self) -> &E {
        &self.medium
    }

    pub fn into_medium(self) -> E {
        self.medium
    }

    /// Read the header as stored, without validating it.
    pub fn read_header(&mut self) -> Result<StoreHeader, StoreError> {
        let mut bytes = [0u8; HEADER_SIZE];
        self.medium.read(0, &mut bytes).map_err(|e| {
            error!("EEPROM header read failed: {:?}", e);
            StoreError::Medium
        })?;
        Ok(StoreHeader::from_bytes(&bytes))
    }

    /// Read and validate the header against this build's constants.
    pub fn load(&mut self) -> Result<HeaderCheck, StoreError> {
        let header = self.read_header()?;
        match header.validate() {
            Ok(()) => {
                info!("EEPROM header matches the compiled layout");
                Ok(HeaderCheck::Valid(header))
            }
            Err(mismatch) => {
                info!("EEPROM layout mismatch: {}", mismatch);
                Ok(HeaderCheck::Mismatch(mismatch))
            }
        }
    }

    /// Write the current header and zero every slot of every tier, then commit.
    ///
    /// Produces the same image every time it is called.
    pub fn wipe(&mut self) -> Result<(), StoreError> {
        info!("Clearing EEPROM. Writing header.");

        let header = StoreHeader::CURRENT.to_bytes();
        self.medium.write(0, &header).map_err(|e| {
            error!("EEPROM header write failed: {:?}", e);
            StoreError::Medium
        })?;

        let empty = [0u8; MAX_RECORD_SIZE];
        for tier in Tier::ALL {
            for index in 0..tier.capacity() {
                let offset = self.layout.slot_offset(tier, index)?;
                self.medium
                    .write(offset, &empty[..tier.record_size()])
                    .map_err(|e| {
                        error!("EEPROM wipe of {} slot {} failed: {:?}", tier, index, e);
                        StoreError::Medium
                    })?;
            }
        }

        self.commit()
    }

    /// Persist one slot (`None` clears it) and commit. Returns the slot address.
    ///
    /// If the write or the commit fails, the slot's previous bytes are staged
    /// back so a later commit of another slot cannot persist the rejected
    /// record.
    pub fn write_slot<R: SlotRecord>(
        &mut self,
        index: usize,
        record: Option<&R>,
    ) -> Result<usize, StoreError> {
        let offset = self.layout.slot_offset(R::TIER, index)?;
        let mut previous = [0u8; MAX_RECORD_SIZE];
        self.medium.read(offset, &mut previous[..R::SIZE]).map_err(|e| {
            error!("EEPROM read of {} slot {} failed: {:?}", R::TIER, index, e);
            StoreError::Medium
        })?;

        let mut buf = [0u8; MAX_RECORD_SIZE];
        if let Some(record) = record {
            record.encode(&mut buf);
        }

        let written = match self.medium.write(offset, &buf[..R::SIZE]) {
            Ok(()) => self.commit(),
            Err(e) => {
                error!("EEPROM write of {} slot {} failed: {:?}", R::TIER, index, e);
                Err(StoreError::Medium)
            }
        };
        if let Err(e) = written {
            self.restore(R::TIER, index, offset, &previous[..R::SIZE]);
            return Err(e);
        }

        debug!("Wrote {} slot {} at address {}", R::TIER, index, offset);
        Ok(offset)
    }

    /// Stage `bytes` back into a slot after a failed write. Nothing is
    /// committed, so the staged image matches what is already durable.
    fn restore(&mut self, tier: Tier, index: usize, offset: usize, bytes: &[u8]) {
        if let Err(e) = self.medium.write(offset, bytes) {
            error!("EEPROM restore of {} slot {} failed: {:?}", tier, index, e);
        }
    }

    /// Read one slot back from the medium. `None` is an empty slot.
    pub fn read_slot<R: SlotRecord>(&mut self, index: usize) -> Result<Option<R>, StoreError> {
        let offset = self.layout.slot_offset(R::TIER, index)?;
        let mut buf = [0u8; MAX_RECORD_SIZE];
        self.medium.read(offset, &mut buf[..R::SIZE]).map_err(|e| {
            error!("EEPROM read of {} slot {} failed: {:?}", R::TIER, index, e);
            StoreError::Medium
        })?;
        Ok(R::decode(&buf[..R::SIZE]))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.medium.commit().map_err(|e| {
            error!("EEPROM commit failed: {:?}", e);
            StoreError::Medium
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{EventReason, FutureEvent, Label, PastEvent};
    use crate::storage::eeprom::StagedEeprom;
    use crate::storage::{MemoryEeprom, STORE_SIZE};

    #[test]
    fn test_rejects_small_medium() {
        let result = PersistentStore::new(MemoryEeprom::new(STORE_SIZE - 1));
        assert_eq!(
            result.err(),
            Some(StoreError::MediumTooSmall {
                required: STORE_SIZE,
                actual: STORE_SIZE - 1
            })
        );
    }

    #[test]
    fn test_wipe_is_idempotent() {
        let mut image = alloc::vec![0x5Au8; STORE_SIZE];
        image[..HEADER_SIZE].copy_from_slice(&[1, 0, 8, 0, 16, 0, 32, 0, 64, 0]);

        let mut store = PersistentStore::new(MemoryEeprom::with_contents(image)).unwrap();
        store.wipe().unwrap();
        let first = store.medium().as_bytes().to_vec();
        store.wipe().unwrap();
        let second = store.medium().as_bytes().to_vec();

        assert_eq!(first, second);
        assert_eq!(&first[..HEADER_SIZE], &StoreHeader::CURRENT.to_bytes());
        assert!(first[HEADER_SIZE..].iter().all(|&b| b == 0));
        assert_eq!(store.medium().commits(), 2);
    }

    #[test]
    fn test_load_detects_version_mismatch() {
        let mut image = alloc::vec![0u8; STORE_SIZE];
        image[..HEADER_SIZE].copy_from_slice(&[1, 0, 8, 0, 16, 0, 32, 0, 64, 0]);
        let mut store = PersistentStore::new(MemoryEeprom::with_contents(image)).unwrap();

        assert_eq!(
            store.load().unwrap(),
            HeaderCheck::Mismatch(LayoutMismatch {
                field: crate::storage::HeaderField::FormatVersion,
                stored: 1,
                expected: 2,
            })
        );

        store.wipe().unwrap();
        assert_eq!(
            store.load().unwrap(),
            HeaderCheck::Valid(StoreHeader::CURRENT)
        );
    }

    #[test]
    fn test_write_slot_addresses() {
        let mut store = PersistentStore::new(MemoryEeprom::new(STORE_SIZE)).unwrap();
        store.wipe().unwrap();

        let past =
            PastEvent::new(1_000, 900, EventReason::WebButton, 30, Label::new("last")).unwrap();
        let address = store.write_slot(31, Some(&past)).unwrap();
        assert_eq!(address, STORE_SIZE - PastEvent::SIZE);
        assert_eq!(
            &store.medium().as_bytes()[address..address + 8],
            &1_000i64.to_le_bytes()
        );
        assert_eq!(store.read_slot::<PastEvent>(31).unwrap(), Some(past));

        let future =
            FutureEvent::new(2_000, EventReason::ScheduledOnce, 5, Label::new("first")).unwrap();
        let address = store.write_slot(0, Some(&future)).unwrap();
        assert_eq!(address, 10 + 8 * 80);

        store.write_slot::<FutureEvent>(0, None).unwrap();
        assert_eq!(store.read_slot::<FutureEvent>(0).unwrap(), None);
        assert_eq!(
            store.write_slot::<FutureEvent>(16, None),
            Err(StoreError::IndexOutOfRange {
                tier: Tier::Future,
                index: 16
            })
        );
    }

    #[test]
    fn test_failed_commit_restages_previous_bytes() {
        let mut store = PersistentStore::new(StagedEeprom::new(STORE_SIZE)).unwrap();
        store.wipe().unwrap();

        let kept = FutureEvent::new(2_000, EventReason::WebButton, 5, Label::new("kept")).unwrap();
        let address = store.write_slot(3, Some(&kept)).unwrap();
        let before = store.medium().staged().to_vec();

        let lost = FutureEvent::new(9_000, EventReason::HwButton, 7, Label::new("lost")).unwrap();
        store.medium.fail_commits(1);
        assert_eq!(store.write_slot(3, Some(&lost)), Err(StoreError::Medium));
        assert_eq!(store.medium().staged(), &before[..]);
        let reread = store.read_slot::<FutureEvent>(3).unwrap();
        assert_eq!(reread, Some(kept.clone()));

        // A later commit elsewhere must not make the rejected record durable
        store.write_slot::<FutureEvent>(4, None).unwrap();
        let durable = store.medium().durable();
        let slot = &durable.as_bytes()[address..address + FutureEvent::SIZE];
        assert_eq!(FutureEvent::decode(slot), Some(kept));
    }
}
