//! # Tree Entries
//!
//! One tagged [`Entry`] type replaces a leaf/directory class hierarchy:
//! pattern matching at the use sites, no virtual dispatch. Leaf entries
//! reference an indexed object and carry both approximation lines;
//! directory entries reference a child page through its routing object
//! and carry only the conservative line (a directory bound exists to
//! prune, never to confirm).
//!
//! The root entry is a directory entry with no routing object: it
//! covers the whole tree and is never a pruning candidate.
//!
//! ## Binary Layout
//!
//! Leaf entry (52 bytes):
//!
//! ```text
//! Offset  Size  Field
//! 0       4     object id (u32 LE)
//! 4       8     parent distance (f64 LE)
//! 12      20    conservative line (k0=0 if absent)
//! 32      20    progressive line (k0=0 if absent)
//! ```
//!
//! Directory entry (44 bytes):
//!
//! ```text
//! Offset  Size  Field
//! 0       4     child page id (u32 LE)
//! 4       4     routing object id (u32 LE, u32::MAX = none)
//! 8       8     covering radius (f64 LE)
//! 16      8     parent distance (f64 LE)
//! 24      20    conservative line (k0=0 if absent)
//! ```

use crate::approx::line::LINE_ENCODED_SIZE;
use crate::approx::ApproximationLine;
use crate::metric::ObjectId;
use crate::storage::PageId;

/// Serialized size of a leaf entry.
pub const LEAF_ENTRY_SIZE: usize = 4 + 8 + 2 * LINE_ENCODED_SIZE;

/// Serialized size of a directory entry.
pub const DIR_ENTRY_SIZE: usize = 4 + 4 + 8 + 8 + LINE_ENCODED_SIZE;

const NO_ROUTING_OBJECT: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Leaf {
        object: ObjectId,
        parent_distance: f64,
        conservative: Option<ApproximationLine>,
        progressive: Option<ApproximationLine>,
    },
    Directory {
        child_page: PageId,
        routing_object: Option<ObjectId>,
        covering_radius: f64,
        parent_distance: f64,
        conservative: Option<ApproximationLine>,
    },
}

impl Entry {
    pub fn new_leaf(object: ObjectId, parent_distance: f64) -> Self {
        Entry::Leaf {
            object,
            parent_distance,
            conservative: None,
            progressive: None,
        }
    }

    pub fn new_directory(
        child_page: PageId,
        routing_object: Option<ObjectId>,
        covering_radius: f64,
        parent_distance: f64,
    ) -> Self {
        Entry::Directory {
            child_page,
            routing_object,
            covering_radius,
            parent_distance,
            conservative: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Entry::Leaf { .. })
    }

    /// The object this entry routes by: the indexed object for a leaf,
    /// the routing object for a directory entry (`None` only at the root).
    pub fn routing_object(&self) -> Option<ObjectId> {
        match self {
            Entry::Leaf { object, .. } => Some(*object),
            Entry::Directory { routing_object, .. } => *routing_object,
        }
    }

    pub fn parent_distance(&self) -> f64 {
        match self {
            Entry::Leaf {
                parent_distance, ..
            }
            | Entry::Directory {
                parent_distance, ..
            } => *parent_distance,
        }
    }

    pub fn set_parent_distance(&mut self, distance: f64) {
        match self {
            Entry::Leaf {
                parent_distance, ..
            }
            | Entry::Directory {
                parent_distance, ..
            } => *parent_distance = distance,
        }
    }

    /// Child page id; panics on leaf entries.
    pub fn child_page(&self) -> PageId {
        match self {
            Entry::Directory { child_page, .. } => *child_page,
            Entry::Leaf { .. } => panic!("leaf entry has no child page"),
        }
    }

    pub fn covering_radius(&self) -> f64 {
        match self {
            Entry::Directory {
                covering_radius, ..
            } => *covering_radius,
            Entry::Leaf { .. } => 0.0,
        }
    }

    pub fn set_covering_radius(&mut self, radius: f64) {
        match self {
            Entry::Directory {
                covering_radius, ..
            } => *covering_radius = radius,
            Entry::Leaf { .. } => panic!("leaf entry has no covering radius"),
        }
    }

    pub fn conservative(&self) -> Option<&ApproximationLine> {
        match self {
            Entry::Leaf { conservative, .. } | Entry::Directory { conservative, .. } => {
                conservative.as_ref()
            }
        }
    }

    pub fn set_conservative(&mut self, line: ApproximationLine) {
        match self {
            Entry::Leaf { conservative, .. } | Entry::Directory { conservative, .. } => {
                *conservative = Some(line)
            }
        }
    }

    pub fn progressive(&self) -> Option<&ApproximationLine> {
        match self {
            Entry::Leaf { progressive, .. } => progressive.as_ref(),
            Entry::Directory { .. } => None,
        }
    }

    pub fn set_progressive(&mut self, line: ApproximationLine) {
        match self {
            Entry::Leaf { progressive, .. } => *progressive = Some(line),
            Entry::Directory { .. } => panic!("directory entry has no progressive line"),
        }
    }

    /// Conservative k-distance bound; `+inf` when not yet fitted, so an
    /// unfitted entry is never pruned.
    pub fn conservative_knn_distance(&self, k: u32) -> f64 {
        self.conservative()
            .map_or(f64::INFINITY, |line| line.knn_distance(k))
    }

    /// Progressive k-distance bound; `-inf` when not yet fitted, so an
    /// unfitted entry is never confirmed without refinement.
    pub fn progressive_knn_distance(&self, k: u32) -> f64 {
        self.progressive()
            .map_or(f64::NEG_INFINITY, |line| line.knn_distance(k))
    }

    pub fn encoded_size(&self) -> usize {
        if self.is_leaf() {
            LEAF_ENTRY_SIZE
        } else {
            DIR_ENTRY_SIZE
        }
    }

    pub fn encode_to(&self, buf: &mut [u8]) {
        match self {
            Entry::Leaf {
                object,
                parent_distance,
                conservative,
                progressive,
            } => {
                buf[0..4].copy_from_slice(&object.to_le_bytes());
                buf[4..12].copy_from_slice(&parent_distance.to_le_bytes());
                ApproximationLine::encode_opt(conservative, &mut buf[12..32]);
                ApproximationLine::encode_opt(progressive, &mut buf[32..52]);
            }
            Entry::Directory {
                child_page,
                routing_object,
                covering_radius,
                parent_distance,
                conservative,
            } => {
                buf[0..4].copy_from_slice(&child_page.to_le_bytes());
                let routing = routing_object.unwrap_or(NO_ROUTING_OBJECT);
                buf[4..8].copy_from_slice(&routing.to_le_bytes());
                buf[8..16].copy_from_slice(&covering_radius.to_le_bytes());
                buf[16..24].copy_from_slice(&parent_distance.to_le_bytes());
                ApproximationLine::encode_opt(conservative, &mut buf[24..44]);
            }
        }
    }

    pub fn decode_leaf(buf: &[u8]) -> Self {
        Entry::Leaf {
            object: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            parent_distance: f64::from_le_bytes(buf[4..12].try_into().unwrap()),
            conservative: ApproximationLine::decode_from(&buf[12..32]),
            progressive: ApproximationLine::decode_from(&buf[32..52]),
        }
    }

    pub fn decode_directory(buf: &[u8]) -> Self {
        let routing = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        Entry::Directory {
            child_page: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            routing_object: (routing != NO_ROUTING_OBJECT).then_some(routing),
            covering_radius: f64::from_le_bytes(buf[8..16].try_into().unwrap()),
            parent_distance: f64::from_le_bytes(buf[16..24].try_into().unwrap()),
            conservative: ApproximationLine::decode_from(&buf[24..44]),
        }
    }
}
