use std::convert::TryInto;

use crate::types::{DoubletError, LinkId, Result};

use super::layout::RECORD_SIZE;

const MAGIC: &[u8; 8] = b"DBLTLNK\0";
const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;
const CRC_OFFSET: usize = 48;
const HEADER_LEN: usize = CRC_OFFSET + 4;

/// Metadata kept in slot 0 of the link region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    pub record_size: u32,
    /// Number of allocated links; also the highest allocated id.
    pub count: u64,
    /// Number of link slots the region can hold, excluding the header slot.
    pub capacity: u64,
    pub source_root: LinkId,
    pub target_root: LinkId,
}

impl Header {
    pub fn new(capacity: u64) -> Self {
        Self {
            record_size: RECORD_SIZE as u32,
            count: 0,
            capacity,
            source_root: 0,
            target_root: 0,
        }
    }

    /// Parses the header slot. An all-zero magic means a fresh region.
    pub fn read(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < HEADER_LEN {
            return Err(DoubletError::corruption("header slot shorter than expected"));
        }

        if data[..MAGIC.len()].iter().all(|&b| b == 0) {
            return Ok(None);
        }

        if &data[..MAGIC.len()] != MAGIC {
            return Err(DoubletError::corruption("invalid link store magic"));
        }

        let major = u16::from_le_bytes([data[8], data[9]]);
        let minor = u16::from_le_bytes([data[10], data[11]]);
        if major != VERSION_MAJOR || minor != VERSION_MINOR {
            return Err(DoubletError::corruption(format!(
                "unsupported link store version {major}.{minor}"
            )));
        }

        let stored_crc = u32::from_le_bytes([
            data[CRC_OFFSET],
            data[CRC_OFFSET + 1],
            data[CRC_OFFSET + 2],
            data[CRC_OFFSET + 3],
        ]);
        if crc32fast::hash(&data[..CRC_OFFSET]) != stored_crc {
            return Err(DoubletError::corruption("header checksum mismatch"));
        }

        let record_size = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        if record_size as usize != RECORD_SIZE {
            return Err(DoubletError::corruption(format!(
                "record size {record_size} does not match {RECORD_SIZE}"
            )));
        }

        let header = Self {
            record_size,
            count: read_u64(data, 16),
            capacity: read_u64(data, 24),
            source_root: read_u64(data, 32),
            target_root: read_u64(data, 40),
        };
        if header.count > header.capacity {
            return Err(DoubletError::corruption(format!(
                "link count {} exceeds capacity {}",
                header.count, header.capacity
            )));
        }
        Ok(Some(header))
    }

    pub fn write(&self, data: &mut [u8]) -> Result<()> {
        if data.len() < HEADER_LEN {
            return Err(DoubletError::corruption("header slot shorter than expected"));
        }

        data[..HEADER_LEN].fill(0);
        data[..MAGIC.len()].copy_from_slice(MAGIC);
        data[8..10].copy_from_slice(&VERSION_MAJOR.to_le_bytes());
        data[10..12].copy_from_slice(&VERSION_MINOR.to_le_bytes());
        data[12..16].copy_from_slice(&self.record_size.to_le_bytes());
        data[16..24].copy_from_slice(&self.count.to_le_bytes());
        data[24..32].copy_from_slice(&self.capacity.to_le_bytes());
        data[32..40].copy_from_slice(&self.source_root.to_le_bytes());
        data[40..48].copy_from_slice(&self.target_root.to_le_bytes());
        let crc = crc32fast::hash(&data[..CRC_OFFSET]);
        data[CRC_OFFSET..HEADER_LEN].copy_from_slice(&crc.to_le_bytes());
        Ok(())
    }
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(
        data[offset..offset + 8]
            .try_into()
            .expect("slice is 8 bytes"),
    )
}
