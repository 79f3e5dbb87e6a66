//! # Node Container
//!
//! A node is an ordered, capacity-bounded sequence of entries of one
//! kind, identified by its page id. Mixing kinds is a programming
//! error and panics immediately rather than corrupting the tree.
//!
//! Overflow handling supports the two redistribution strategies the
//! split code needs:
//!
//! - [`split_by_order`](Node::split_by_order): the entries are already
//!   sorted; the first `split_point` stay, the rest move to the new
//!   node.
//! - [`split_by_assignment`](Node::split_by_assignment): two explicit
//!   assignment lists replace the contents of both nodes.
//!
//! Children are exposed as `(index_in_parent, entry)` pairs so a
//! traversal can extend its path without re-deriving positions.
//!
//! ## Page Serialization
//!
//! A node serializes into one page: the 16-byte header of
//! [`NodePageHeader`] followed by `len()` fixed-size entries. Unused
//! space is zero-filled; the header checksum covers the entry payload.

use eyre::Result;

use super::entry::{Entry, DIR_ENTRY_SIZE, LEAF_ENTRY_SIZE};
use crate::config::NODE_HEADER_SIZE;
use crate::error::TreeError;
use crate::storage::page::{NodePageHeader, PageType, PAGE_CRC};
use crate::storage::PageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Directory,
}

impl NodeKind {
    pub fn entry_size(self) -> usize {
        match self {
            NodeKind::Leaf => LEAF_ENTRY_SIZE,
            NodeKind::Directory => DIR_ENTRY_SIZE,
        }
    }

    fn page_type(self) -> PageType {
        match self {
            NodeKind::Leaf => PageType::Leaf,
            NodeKind::Directory => PageType::Directory,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    page: PageId,
    kind: NodeKind,
    capacity: usize,
    entries: Vec<Entry>,
}

impl Node {
    pub fn new(page: PageId, kind: NodeKind, capacity: usize) -> Self {
        Self {
            page,
            kind,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn set_page(&mut self, page: PageId) {
        self.page = page;
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A node overflows when it has used its last (overflow) slot.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn entry(&self, index: usize) -> &Entry {
        &self.entries[index]
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut Entry {
        &mut self.entries[index]
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Children as path extensions: `(index_in_parent, entry)`.
    pub fn children(&self) -> impl Iterator<Item = (usize, &Entry)> {
        self.entries.iter().enumerate()
    }

    /// Appends an entry. Panics if the entry kind does not match the
    /// node kind or the overflow slot is already taken.
    pub fn add_entry(&mut self, entry: Entry) {
        assert_eq!(
            entry.is_leaf(),
            self.is_leaf(),
            "entry kind does not match node kind"
        );
        assert!(
            self.entries.len() < self.capacity,
            "node {} exceeded capacity {}",
            self.page,
            self.capacity
        );
        self.entries.push(entry);
    }

    /// Removes the entry at `index`, compacting the remainder left.
    pub fn delete_entry(&mut self, index: usize) -> Entry {
        self.entries.remove(index)
    }

    /// Split by sorted order: keeps `ordered[..split_point]`, moves the
    /// rest to `new_node`. Both nodes keep this node's kind.
    pub fn split_by_order(&mut self, new_node: &mut Node, ordered: Vec<Entry>, split_point: usize) {
        assert_eq!(self.kind, new_node.kind, "split must preserve node kind");
        assert!(split_point <= ordered.len());

        self.entries.clear();
        new_node.entries.clear();
        for (i, entry) in ordered.into_iter().enumerate() {
            if i < split_point {
                self.add_entry(entry);
            } else {
                new_node.add_entry(entry);
            }
        }
    }

    /// Split by explicit assignment: replaces this node's entries with
    /// `first` and the new node's with `second`.
    pub fn split_by_assignment(&mut self, new_node: &mut Node, first: Vec<Entry>, second: Vec<Entry>) {
        assert_eq!(self.kind, new_node.kind, "split must preserve node kind");

        self.entries.clear();
        new_node.entries.clear();
        for entry in first {
            self.add_entry(entry);
        }
        for entry in second {
            new_node.add_entry(entry);
        }
    }

    /// Serializes the node into a page buffer (header + entries, rest
    /// zero-filled).
    pub fn encode_page(&self, buf: &mut [u8]) {
        let entry_size = self.kind.entry_size();
        let payload_len = self.entries.len() * entry_size;
        debug_assert!(NODE_HEADER_SIZE + payload_len <= buf.len());

        buf.fill(0);
        for (i, entry) in self.entries.iter().enumerate() {
            let start = NODE_HEADER_SIZE + i * entry_size;
            entry.encode_to(&mut buf[start..start + entry_size]);
        }

        let checksum = PAGE_CRC.checksum(&buf[NODE_HEADER_SIZE..NODE_HEADER_SIZE + payload_len]);
        let header = NodePageHeader::new(
            self.kind.page_type(),
            self.entries.len() as u16,
            checksum,
            self.page,
        );
        header.write_to(buf);
    }

    /// Decodes a node from a page buffer, verifying the payload
    /// checksum. `capacity_of` maps the decoded kind to the node
    /// capacity configured for the tree.
    pub fn decode_page(
        buf: &[u8],
        page: PageId,
        capacity_of: impl Fn(NodeKind) -> usize,
    ) -> Result<Self> {
        let header = NodePageHeader::from_bytes(buf)?;
        let kind = match header.page_type() {
            PageType::Leaf => NodeKind::Leaf,
            PageType::Directory => NodeKind::Directory,
            PageType::Unknown => {
                return Err(TreeError::Serialization {
                    page,
                    reason: "unknown page type".into(),
                }
                .into())
            }
        };

        let count = header.entry_count() as usize;
        let entry_size = kind.entry_size();
        let payload_len = count * entry_size;
        if NODE_HEADER_SIZE + payload_len > buf.len() {
            return Err(TreeError::Serialization {
                page,
                reason: format!("entry payload of {payload_len} bytes exceeds page"),
            }
            .into());
        }

        let payload = &buf[NODE_HEADER_SIZE..NODE_HEADER_SIZE + payload_len];
        let checksum = PAGE_CRC.checksum(payload);
        if checksum != header.checksum() {
            return Err(TreeError::Serialization {
                page,
                reason: format!(
                    "checksum mismatch: stored {:08x}, computed {:08x}",
                    header.checksum(),
                    checksum
                ),
            }
            .into());
        }

        let mut node = Node::new(page, kind, capacity_of(kind));
        for i in 0..count {
            let chunk = &payload[i * entry_size..(i + 1) * entry_size];
            node.entries.push(match kind {
                NodeKind::Leaf => Entry::decode_leaf(chunk),
                NodeKind::Directory => Entry::decode_directory(chunk),
            });
        }
        Ok(node)
    }
}
