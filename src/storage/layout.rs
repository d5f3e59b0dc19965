//! Byte layout of a link record.
//!
//! Every record is [`RECORD_SIZE`] bytes of little-endian `u64` fields. Slot 0
//! of the region is reserved for the header, so link `id` lives at
//! `id * RECORD_SIZE`.

use std::convert::TryInto;

use crate::types::LinkId;

/// Size in bytes of one record (and of the header slot).
pub const RECORD_SIZE: usize = 80;

pub(crate) const SOURCE: usize = 0;
pub(crate) const TARGET: usize = 8;
/// Start of the node fields of the index ordered by `(source, target)`.
pub(crate) const SOURCE_TREE: usize = 16;
/// Start of the node fields of the index ordered by `(target, source)`.
pub(crate) const TARGET_TREE: usize = 48;

/// Field offsets inside one tree node block.
pub(crate) const NODE_LEFT: usize = 0;
pub(crate) const NODE_RIGHT: usize = 8;
pub(crate) const NODE_SIZE: usize = 16;
pub(crate) const NODE_META: usize = 24;

/// Random access to the `u64` fields of records, keyed by link id.
pub(crate) trait NodeStore {
    fn field(&self, id: LinkId, offset: usize) -> u64;
    fn set_field(&mut self, id: LinkId, offset: usize, value: u64);
}

/// Byte offset of a record field inside the region.
#[inline]
pub(crate) fn field_offset(id: LinkId, offset: usize) -> usize {
    id as usize * RECORD_SIZE + offset
}

#[inline]
pub(crate) fn read_field(bytes: &[u8], id: LinkId, offset: usize) -> u64 {
    let at = field_offset(id, offset);
    u64::from_le_bytes(bytes[at..at + 8].try_into().expect("slice is 8 bytes"))
}

#[inline]
pub(crate) fn write_field(bytes: &mut [u8], id: LinkId, offset: usize, value: u64) {
    let at = field_offset(id, offset);
    bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Length in bytes of a region holding `capacity` links plus the header slot.
pub(crate) fn region_len(capacity: u64) -> Option<usize> {
    let slots = usize::try_from(capacity).ok()?.checked_add(1)?;
    slots.checked_mul(RECORD_SIZE)
}
