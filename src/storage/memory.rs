//! # Memory Page File
//!
//! Map-backed [`PageFile`]: nodes are stored as values, nothing is
//! serialized. Reads hand out clones so the caller can mutate freely
//! and write back explicitly, the same discipline the persistent
//! backend enforces, which keeps the tree code identical over both.

use eyre::Result;
use hashbrown::HashMap;

use super::{PageFile, PageFileStats, PageId};
use crate::error::TreeError;
use crate::tree::node::Node;

pub struct MemoryPageFile {
    page_size: usize,
    pages: HashMap<PageId, Node>,
    next_page: PageId,
    stats: PageFileStats,
}

impl MemoryPageFile {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: HashMap::new(),
            next_page: 0,
            stats: PageFileStats::default(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl PageFile for MemoryPageFile {
    fn read_page(&mut self, id: PageId) -> Result<Node> {
        self.stats.count_read();
        self.pages.get(&id).cloned().ok_or_else(|| {
            TreeError::Serialization {
                page: id,
                reason: "page has never been written".into(),
            }
            .into()
        })
    }

    fn write_page(&mut self, node: &Node) -> Result<()> {
        self.stats.count_write();
        if node.page() >= self.next_page {
            self.next_page = node.page() + 1;
        }
        self.pages.insert(node.page(), node.clone());
        Ok(())
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
}
