//! Human-readable dump of the persisted image next to the mirror.

use core::fmt::{self, Write};

use thiserror_no_std::Error;

use super::EventStore;
use crate::convert::{format_timestamp, time_offset_to_string};
use crate::records::{FutureEvent, PastEvent, ScheduledEvent, SlotRecord};
use crate::storage::{Eeprom, HeaderField, PersistentStore, StoreError, StoreHeader};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpError {
    #[error("dump output failed")]
    Format(#[from] fmt::Error),
    #[error("reading the store failed: {0}")]
    Store(#[from] StoreError),
}

/// One-line rendering of a record, used on both sides of a dump line.
trait DumpRecord: SlotRecord {
    fn write_record<W: Write>(&self, out: &mut W, utc_offset_secs: i32) -> fmt::Result;
}

impl DumpRecord for ScheduledEvent {
    fn write_record<W: Write>(&self, out: &mut W, _utc_offset_secs: i32) -> fmt::Result {
        write!(
            out,
            "daily {} for {}s {:?}",
            time_offset_to_string(self.when),
            self.duration,
            self.label.as_str()
        )
    }
}

impl DumpRecord for FutureEvent {
    fn write_record<W: Write>(&self, out: &mut W, utc_offset_secs: i32) -> fmt::Result {
        write!(
            out,
            "{} {} for {}s {:?}",
            format_timestamp(self.when, utc_offset_secs),
            self.why,
            self.duration,
            self.label.as_str()
        )
    }
}

impl DumpRecord for PastEvent {
    fn write_record<W: Write>(&self, out: &mut W, utc_offset_secs: i32) -> fmt::Result {
        write!(out, "{} ", format_timestamp(self.when, utc_offset_secs))?;
        if self.scheduled != 0 {
            let due = format_timestamp(self.scheduled, utc_offset_secs);
            write!(out, "(due {}) ", due)?;
        }
        write!(
            out,
            "{} for {}s {:?}",
            self.why,
            self.duration,
            self.label.as_str()
        )
    }
}

impl<E: Eeprom> EventStore<E> {
    /// Write the persisted header and every slot of every tier to `out`.
    ///
    /// Each occupied slot shows the persisted record followed by the mirror's
    /// copy; a slot empty on both sides shows only its index and address.
    pub fn dump<W: Write>(&mut self, out: &mut W) -> Result<(), DumpError> {
        let header = self.store.read_header()?;
        writeln!(out, "header:")?;
        for field in HeaderField::ALL {
            writeln!(
                out,
                "  {}: {} (compiled {})",
                field,
                header.field(field),
                StoreHeader::CURRENT.field(field)
            )?;
        }

        let offset = self.config.utc_offset_secs;
        dump_tier(&mut self.store, &self.scheduled, offset, out)?;
        dump_tier(&mut self.store, &self.future, offset, out)?;
        dump_tier(&mut self.store, &self.past, offset, out)?;
        Ok(())
    }
}

fn dump_tier<E, R, W>(
    store: &mut PersistentStore<E>,
    mirror: &[Option<R>],
    utc_offset_secs: i32,
    out: &mut W,
) -> Result<(), DumpError>
where
    E: Eeprom,
    R: DumpRecord,
    W: Write,
{
    writeln!(out, "{}:", R::TIER)?;
    for (index, cached) in mirror.iter().enumerate() {
        let address = store.layout().slot_offset(R::TIER, index)?;
        let persisted = store.read_slot::<R>(index)?;

        write!(out, "  [{:2}] @{:4}", index, address)?;
        if persisted.is_none() && cached.is_none() {
            writeln!(out)?;
            continue;
        }

        write!(out, " eeprom: ")?;
        write_side(out, persisted.as_ref(), utc_offset_secs)?;
        write!(out, " | memory: ")?;
        write_side(out, cached.as_ref(), utc_offset_secs)?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_side<R: DumpRecord, W: Write>(
    out: &mut W,
    record: Option<&R>,
    utc_offset_secs: i32,
) -> fmt::Result {
    match record {
        Some(record) => record.write_record(out, utc_offset_secs),
        None => out.write_str("empty"),
    }
}
