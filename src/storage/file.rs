//! # Persistent Page File
//!
//! Fixed-size pages in a single file, fronted by the LRU node cache.
//! Reads decode through the entry codec and verify the payload CRC;
//! truncated or corrupt pages surface as serialization errors. Writes
//! land in the cache and reach the disk when the entry is evicted or on
//! [`sync`](PersistentPageFile::sync); within one session a written
//! page is always readable again, which is the only ordering guarantee
//! the tree relies on.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use eyre::Result;

use super::cache::LruCache;
use super::header::FileHeader;
use super::{NodeCapacities, PageFile, PageFileStats, PageId};
use crate::config::FILE_HEADER_SIZE;
use crate::error::TreeError;
use crate::tree::node::Node;

pub struct PersistentPageFile {
    file: File,
    page_size: usize,
    capacities: NodeCapacities,
    cache: LruCache,
    next_page: PageId,
    stats: PageFileStats,
}

impl PersistentPageFile {
    /// Creates a new page file, truncating anything at `path`, and
    /// persists the header.
    pub fn create(
        path: &Path,
        page_size: usize,
        capacities: NodeCapacities,
        cache_capacity: usize,
    ) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let header = FileHeader::new(
            page_size as u32,
            capacities.dir_capacity as u32,
            capacities.leaf_capacity as u32,
            capacities.dir_minimum as u32,
            capacities.leaf_minimum as u32,
        );
        file.seek(SeekFrom::Start(0))?;
        file.write_all(zerocopy::IntoBytes::as_bytes(&header))?;

        Ok(Self {
            file,
            page_size,
            capacities,
            cache: LruCache::new(cache_capacity),
            next_page: 0,
            stats: PageFileStats::default(),
        })
    }

    /// Opens an existing page file, restoring geometry from its header.
    pub fn open(path: &Path, cache_capacity: usize) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut buf = [0u8; FILE_HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        let header = FileHeader::from_bytes(&buf)?;

        let page_size = header.page_size() as usize;
        let capacities = NodeCapacities {
            dir_capacity: header.dir_capacity() as usize,
            leaf_capacity: header.leaf_capacity() as usize,
            dir_minimum: header.dir_minimum() as usize,
            leaf_minimum: header.leaf_minimum() as usize,
        };

        let len = file.metadata()?.len();
        let next_page = ((len.saturating_sub(FILE_HEADER_SIZE as u64)) / page_size as u64) as PageId;

        Ok(Self {
            file,
            page_size,
            capacities,
            cache: LruCache::new(cache_capacity),
            next_page,
            stats: PageFileStats::default(),
        })
    }

    pub fn capacities(&self) -> NodeCapacities {
        self.capacities
    }

    pub fn page_count(&self) -> u32 {
        self.next_page
    }

    fn offset(&self, id: PageId) -> u64 {
        FILE_HEADER_SIZE as u64 + id as u64 * self.page_size as u64
    }

    fn read_from_disk(&mut self, id: PageId) -> Result<Node> {
        let mut buf = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(self.offset(id)))?;
        self.file.read_exact(&mut buf).map_err(|e| TreeError::Serialization {
            page: id,
            reason: format!("truncated page read: {e}"),
        })?;

        let capacities = self.capacities;
        Node::decode_page(&buf, id, |kind| capacities.of(kind))
    }

    fn write_to_disk(&mut self, node: &Node) -> Result<()> {
        let mut buf = vec![0u8; self.page_size];
        node.encode_page(&mut buf);
        self.file.seek(SeekFrom::Start(self.offset(node.page())))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    fn write_back(&mut self, evicted: Option<(Node, bool)>) -> Result<()> {
        if let Some((node, dirty)) = evicted {
            if dirty {
                self.write_to_disk(&node)?;
            }
        }
        Ok(())
    }
}

impl PageFile for PersistentPageFile {
    fn read_page(&mut self, id: PageId) -> Result<Node> {
        self.stats.count_read();
        if let Some(node) = self.cache.get(id) {
            return Ok(node);
        }

        let node = self.read_from_disk(id)?;
        let evicted = self.cache.put_clean(node.clone());
        self.write_back(evicted)?;
        Ok(node)
    }

    fn write_page(&mut self, node: &Node) -> Result<()> {
        self.stats.count_write();
        let evicted = self.cache.put_dirty(node.clone());
        self.write_back(evicted)
    }

    fn allocate(&mut self) -> PageId {
        let id = self.next_page;
        self.next_page += 1;
        id
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn stats(&self) -> &PageFileStats {
        &self.stats
    }

    fn sync(&mut self) -> Result<()> {
        for node in self.cache.drain_dirty() {
            self.write_to_disk(&node)?;
        }
        self.file.sync_all()?;
        Ok(())
    }
}
