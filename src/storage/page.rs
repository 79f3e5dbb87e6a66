//! # Node Page Header
//!
//! Every serialized node page begins with a 16-byte header describing
//! the page's kind and entry payload. The header is transmuted from raw
//! bytes with `zerocopy`, so reading it from a page buffer copies
//! nothing.
//!
//! ## Layout (16 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  -----------------------------------
//! 0       1     page_type    Leaf (0x01) or Directory (0x02)
//! 1       1     flags        reserved, currently zero
//! 2       2     entry_count  number of serialized entries
//! 4       4     checksum     CRC32 of the entry payload
//! 8       4     page_id      id of the page (self-describing)
//! 12      4     reserved
//! ```
//!
//! The checksum covers exactly `entry_count * entry_size` bytes after
//! the header; it is verified on every read from the persistent page
//! file and a mismatch surfaces as a serialization error, never as a
//! silent retry.

use crc::{Crc, CRC_32_ISO_HDLC};
use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::NODE_HEADER_SIZE;

pub const PAGE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Unknown = 0x00,
    Leaf = 0x01,
    Directory = 0x02,
}

impl PageType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => PageType::Leaf,
            0x02 => PageType::Directory,
            _ => PageType::Unknown,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodePageHeader {
    page_type: u8,
    flags: u8,
    entry_count: U16,
    checksum: U32,
    page_id: U32,
    reserved: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<NodePageHeader>() == NODE_HEADER_SIZE);

impl NodePageHeader {
    pub fn new(page_type: PageType, entry_count: u16, checksum: u32, page_id: u32) -> Self {
        Self {
            page_type: page_type as u8,
            flags: 0,
            entry_count: U16::new(entry_count),
            checksum: U32::new(checksum),
            page_id: U32::new(page_id),
            reserved: [0u8; 4],
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= NODE_HEADER_SIZE,
            "buffer too small for NodePageHeader: {} < {}",
            data.len(),
            NODE_HEADER_SIZE
        );
        Self::ref_from_bytes(&data[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read NodePageHeader: {:?}", e))
    }

    pub fn write_to(&self, data: &mut [u8]) {
        data[..NODE_HEADER_SIZE].copy_from_slice(self.as_bytes());
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_byte(self.page_type)
    }

    pub fn entry_count(&self) -> u16 {
        self.entry_count.get()
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.get()
    }

    pub fn page_id(&self) -> u32 {
        self.page_id.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_16_bytes() {
        assert_eq!(std::mem::size_of::<NodePageHeader>(), 16);
    }

    #[test]
    fn header_round_trip() {
        let header = NodePageHeader::new(PageType::Leaf, 12, 0xDEADBEEF, 7);
        let mut buf = [0u8; 32];
        header.write_to(&mut buf);

        let parsed = NodePageHeader::from_bytes(&buf).unwrap();
        assert_eq!(parsed.page_type(), PageType::Leaf);
        assert_eq!(parsed.entry_count(), 12);
        assert_eq!(parsed.checksum(), 0xDEADBEEF);
        assert_eq!(parsed.page_id(), 7);
    }

    #[test]
    fn page_type_from_byte() {
        assert_eq!(PageType::from_byte(0x01), PageType::Leaf);
        assert_eq!(PageType::from_byte(0x02), PageType::Directory);
        assert_eq!(PageType::from_byte(0x7F), PageType::Unknown);
    }

    #[test]
    fn from_bytes_rejects_short_buffers() {
        let buf = [0u8; 8];
        assert!(NodePageHeader::from_bytes(&buf).is_err());
    }
}
