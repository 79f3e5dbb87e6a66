//! # Configuration Constants
//!
//! Central definitions for page layout, cache sizing and numerical
//! tolerances. Constants that depend on each other are co-located so a
//! change to one is visible next to the values it constrains.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> NODE_HEADER_SIZE (16 bytes, fixed)
//!       │     Every node page starts with a 16-byte header; the
//!       │     remainder holds serialized entries. Capacities are
//!       │     derived as (page_size - NODE_HEADER_SIZE) / entry_size.
//!       │
//!       └─> FILE_HEADER_SIZE (32 bytes, persistent files only)
//!             Generic header (16) + capacity block (16). Pages start
//!             at this offset; page N lives at
//!             FILE_HEADER_SIZE + N * page_size.
//!
//! DEFAULT_CACHE_CAPACITY (64 pages)
//!       Decoded-node LRU cache in the persistent page file. Must be
//!       >= 1; the tree never pins more than a handful of nodes at a
//!       time, so even small caches are correct (just slower).
//! ```
//!
//! ## Tolerances
//!
//! `FIT_TOLERANCE` bounds how far a fitted conservative line may dip
//! below a sample (in log space) before the candidate is rejected, and
//! how large the error gap between the two conservative-fit strategies
//! may grow before a numerical warning is logged. `QUERY_TOLERANCE` is
//! the slack used when comparing a leaf distance against the
//! conservative bound during reverse-kNN search; both match the
//! tolerances of the approximation invariants.

/// Default size of one node page in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of decoded nodes held by the persistent file's cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Fixed header at the start of every node page.
pub const NODE_HEADER_SIZE: usize = 16;

/// Persistent file header: 16-byte generic header + 16-byte capacity block.
pub const FILE_HEADER_SIZE: usize = 32;

/// Slack for upper-bound validation and fit-strategy cross-checks (log space).
pub const FIT_TOLERANCE: f64 = 1e-9;

/// Slack for the conservative candidate test during reverse-kNN search.
pub const QUERY_TOLERANCE: f64 = 1e-9;

/// A directory or leaf capacity below this triggers a diagnostic warning.
pub const SMALL_CAPACITY_WARNING: usize = 10;
