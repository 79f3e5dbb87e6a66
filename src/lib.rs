//! # mkcop - Reverse k-NN Queries over a Paged Metric Index
//!
//! `mkcop` is an embedded, disk-pageable metric index tree that answers
//! reverse k-nearest-neighbor (RkNN) queries: given a query point `q`,
//! find every indexed point that counts `q` among its own k nearest
//! neighbors. The tree supports any `k` up to a `kmax` fixed at
//! construction.
//!
//! Instead of storing k-distances for every k (kmax values per point),
//! each point's k-NN-distance curve is bounded by two fitted lines in
//! log-log space:
//!
//! - a **conservative** line that never under-estimates the curve,
//!   aggregated up the tree and used to prune whole subtrees;
//! - a **progressive** line that never over-estimates it, used to
//!   confirm results without any exact computation.
//!
//! Only points falling between their two bounds need an exact
//! refinement pass.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mkcop::MkCopTree;
//!
//! let mut tree = MkCopTree::builder(10)     // kmax = 10
//!     .page_size(4096)
//!     .open_memory()?;
//!
//! tree.insert_all(points)?;                 // batch load only
//! let hits = tree.reverse_knn_query(&query, 5)?;
//! for (distance, id) in hits {
//!     println!("{id} at {distance}");
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │        Public API (MkCopTree)          │
//! ├───────────────────────────────────────┤
//! │  Reverse-kNN Search │ Fitting Pass     │
//! ├─────────────────────┼─────────────────┤
//! │  M-Tree Insert/Split│ Batch kNN        │
//! ├───────────────────────────────────────┤
//! │  Hull-Constrained Line Fitting         │
//! ├───────────────────────────────────────┤
//! │  Entry/Node Codec (fixed-field LE)     │
//! ├───────────────────────────────────────┤
//! │  Page Facade (memory / file + LRU)     │
//! └───────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`tree`]: the tree itself: entries, nodes, insertion, fitting
//!   pass, batch kNN and the reverse-kNN engine
//! - [`approx`]: approximation lines, convex hulls and the constrained
//!   regressions
//! - [`storage`]: the page facade: memory and file backends, LRU node
//!   cache, persistent headers
//! - [`metric`]: distance abstraction and the Euclidean metric
//! - [`error`]: the error taxonomy
//!
//! ## Mutation Model
//!
//! Bulk insertion only: the fitted bounds require the true 1..kmax
//! neighbor distances of every point, computed in one batch pass per
//! load. Single-object inserts fail with
//! [`TreeError::UnsupportedOperation`]. The tree is single-writer; wrap
//! it in a `Mutex` if it must be shared across threads.

pub mod approx;
pub mod config;
pub mod error;
pub mod metric;
pub mod storage;
pub mod tree;

pub use approx::{ApproximationLine, ConvexHull, UpperFitStrategy};
pub use error::TreeError;
pub use metric::{Euclidean, Metric, ObjectId};
pub use storage::{MemoryPageFile, PageFile, PersistentPageFile};
pub use tree::{MkCopTree, RknnStatistics};
