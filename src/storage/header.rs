//! # Persistent File Header
//!
//! The first 32 bytes of a persistent page file: a generic header
//! (magic, version, page size) followed by the 16-byte capacity block
//! that fixes the tree geometry for the lifetime of the file.
//!
//! ## Layout (32 bytes)
//!
//! ```text
//! Offset  Size  Field          Description
//! ------  ----  -------------  ----------------------------
//! 0       8     magic          "mkcoppg\0"
//! 8       4     version        format version (u32 LE)
//! 12      4     page_size      bytes per page (u32 LE)
//! 16      4     dir_capacity   directory node capacity
//! 20      4     leaf_capacity  leaf node capacity
//! 24      4     dir_minimum    directory fill minimum
//! 28      4     leaf_minimum   leaf fill minimum
//! ```
//!
//! Capacities are derived from the page size at creation; persisting
//! them lets a reopened file validate that its geometry still matches
//! the code's entry sizes.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::FILE_HEADER_SIZE;

pub const FILE_MAGIC: &[u8; 8] = b"mkcoppg\x00";
pub const CURRENT_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    magic: [u8; 8],
    version: U32,
    page_size: U32,
    dir_capacity: U32,
    leaf_capacity: U32,
    dir_minimum: U32,
    leaf_minimum: U32,
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == FILE_HEADER_SIZE);

impl FileHeader {
    pub fn new(
        page_size: u32,
        dir_capacity: u32,
        leaf_capacity: u32,
        dir_minimum: u32,
        leaf_minimum: u32,
    ) -> Self {
        Self {
            magic: *FILE_MAGIC,
            version: U32::new(CURRENT_VERSION),
            page_size: U32::new(page_size),
            dir_capacity: U32::new(dir_capacity),
            leaf_capacity: U32::new(leaf_capacity),
            dir_minimum: U32::new(dir_minimum),
            leaf_minimum: U32::new(leaf_minimum),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "buffer too small for FileHeader: {} < {}",
            bytes.len(),
            FILE_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse FileHeader: {:?}", e))?;

        ensure!(&header.magic == FILE_MAGIC, "invalid magic bytes in page file");
        ensure!(
            header.version.get() == CURRENT_VERSION,
            "unsupported page file version: {} (expected {})",
            header.version.get(),
            CURRENT_VERSION
        );

        Ok(header)
    }

    pub fn version(&self) -> u32 {
        self.version.get()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.get()
    }

    pub fn dir_capacity(&self) -> u32 {
        self.dir_capacity.get()
    }

    pub fn leaf_capacity(&self) -> u32 {
        self.leaf_capacity.get()
    }

    pub fn dir_minimum(&self) -> u32 {
        self.dir_minimum.get()
    }

    pub fn leaf_minimum(&self) -> u32 {
        self.leaf_minimum.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_32_bytes() {
        assert_eq!(std::mem::size_of::<FileHeader>(), 32);
    }

    #[test]
    fn header_round_trip() {
        let header = FileHeader::new(4096, 92, 78, 46, 39);
        let bytes = header.as_bytes();

        let parsed = FileHeader::from_bytes(bytes).unwrap();
        assert_eq!(parsed.version(), CURRENT_VERSION);
        assert_eq!(parsed.page_size(), 4096);
        assert_eq!(parsed.dir_capacity(), 92);
        assert_eq!(parsed.leaf_capacity(), 78);
        assert_eq!(parsed.dir_minimum(), 46);
        assert_eq!(parsed.leaf_minimum(), 39);
    }

    #[test]
    fn header_rejects_invalid_magic() {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[..8].copy_from_slice(b"notmagic");

        assert!(FileHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn header_rejects_unknown_version() {
        let header = FileHeader::new(4096, 10, 10, 5, 5);
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes.copy_from_slice(header.as_bytes());
        bytes[8] = 0xFE;

        assert!(FileHeader::from_bytes(&bytes).is_err());
    }
}
