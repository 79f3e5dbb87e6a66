//! # The MkCoP Tree
//!
//! A paged M-tree whose entries carry conservative and progressive
//! approximations of each point's k-NN-distance curve, supporting
//! reverse k-nearest-neighbor queries for any `k <= kmax`.
//!
//! ## Query Model
//!
//! `reverse_knn_query(q, k)` returns every indexed point `p` for which
//! `q` would be among `p`'s k nearest neighbors: concretely, every `p`
//! with `dist(p, q) <= kdist_k(p)`, where `kdist_k` is the
//! self-inclusive k-distance over the indexed points (a point's rank-1
//! neighbor is itself at distance zero).
//!
//! The conservative line of an entry upper-bounds `kdist_k` for its
//! whole subtree, so a subtree whose minimum distance to `q` exceeds
//! the bound cannot contain results and is pruned. The progressive line
//! of a leaf entry lower-bounds `kdist_k`, so a point within it is a
//! result without any further work. Points between the two bounds are
//! refined with an exact batch kNN pass.
//!
//! ## Mutation Model
//!
//! Bulk insertion only. Fitting needs the true 1..kmax neighbor
//! distances of every point, which are computed in one batch pass after
//! all objects of a load are inserted; a single-object insert cannot
//! maintain the fitted bounds and is rejected outright.
//!
//! ```ignore
//! use mkcop::MkCopTree;
//!
//! let mut tree = MkCopTree::builder(10).open_memory()?;
//! tree.insert_all(points)?;                    // batch load + fit
//! let hits = tree.reverse_knn_query(&q, 5)?;   // (distance, id) pairs
//! ```
//!
//! ## Structure
//!
//! ```text
//! root entry (in memory)
//!   └── page 0: root node
//!         ├── directory entries: routing object, covering radius,
//!         │                      conservative line, child page
//!         └── ... leaf nodes: object id, parent distance,
//!                             conservative + progressive lines
//! ```
//!
//! All nodes are resolved by page id through the [`PageFile`] facade;
//! the root keeps page 0 across splits (a root split moves the old
//! root to a fresh page and rebuilds page 0 as a directory node over
//! the two halves).

pub mod entry;
pub mod knn;
pub mod node;
pub mod path;
pub mod query;
pub mod split;

mod adjust;
mod insert;

pub use self::query::RknnStatistics;

use std::path::Path;

use eyre::{ensure, Result};
use hashbrown::HashMap;
use tracing::warn;

use crate::approx::UpperFitStrategy;
use crate::config::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_PAGE_SIZE, NODE_HEADER_SIZE, SMALL_CAPACITY_WARNING,
};
use crate::error::TreeError;
use crate::metric::{Euclidean, Metric, ObjectId};
use crate::storage::{
    MemoryPageFile, NodeCapacities, PageFile, PageFileStats, PageId, PersistentPageFile,
};
use self::entry::{Entry, DIR_ENTRY_SIZE, LEAF_ENTRY_SIZE};
use self::node::{Node, NodeKind};

/// The root node always lives on page 0.
pub const ROOT_PAGE: PageId = 0;

pub struct MkCopTree<F: PageFile = MemoryPageFile, M: Metric = Euclidean> {
    file: F,
    metric: M,
    kmax: usize,
    /// ln(1), .., ln(kmax)
    log_k: Vec<f64>,
    strategy: UpperFitStrategy,
    capacities: NodeCapacities,
    objects: HashMap<ObjectId, Vec<f64>>,
    /// Directory entry representing the root node; `None` until the
    /// first insert creates the tree.
    root_entry: Option<Entry>,
    size: usize,
    stats: RknnStatistics,
}

/// Configuration for a new tree.
pub struct MkCopTreeBuilder {
    kmax: usize,
    page_size: usize,
    cache_capacity: usize,
    strategy: UpperFitStrategy,
}

impl MkCopTreeBuilder {
    pub fn page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    pub fn cache_capacity(mut self, pages: usize) -> Self {
        self.cache_capacity = pages;
        self
    }

    pub fn upper_fit_strategy(mut self, strategy: UpperFitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builds a memory-backed tree.
    pub fn open_memory(self) -> Result<MkCopTree<MemoryPageFile, Euclidean>> {
        let capacities = initialize_capacities(self.page_size)?;
        let file = MemoryPageFile::new(self.page_size);
        MkCopTree::with_file(file, Euclidean, self.kmax, capacities, self.strategy)
    }

    /// Creates a new file-backed tree, truncating anything at `path`.
    pub fn create(self, path: &Path) -> Result<MkCopTree<PersistentPageFile, Euclidean>> {
        let capacities = initialize_capacities(self.page_size)?;
        let file =
            PersistentPageFile::create(path, self.page_size, capacities, self.cache_capacity)?;
        MkCopTree::with_file(file, Euclidean, self.kmax, capacities, self.strategy)
    }

    /// Opens an existing file-backed tree. The indexed objects are not
    /// part of the page file and must be supplied again, exactly as
    /// they were inserted.
    pub fn open(
        self,
        path: &Path,
        objects: Vec<(ObjectId, Vec<f64>)>,
    ) -> Result<MkCopTree<PersistentPageFile, Euclidean>> {
        let file = PersistentPageFile::open(path, self.cache_capacity)?;
        let capacities = file.capacities();
        let has_pages = file.page_count() > 0;

        let mut tree = MkCopTree::with_file(file, Euclidean, self.kmax, capacities, self.strategy)?;
        tree.objects = objects.into_iter().collect();
        tree.size = tree.objects.len();
        if has_pages {
            // the root entry itself is never used for pruning, so it is
            // reconstructed with a zero radius and no routing object
            tree.root_entry = Some(Entry::new_directory(ROOT_PAGE, None, 0.0, 0.0));
        }
        Ok(tree)
    }
}

/// Derives node capacities from the page size; fatal when a page
/// cannot hold at least two entries of either kind.
fn initialize_capacities(page_size: usize) -> Result<NodeCapacities> {
    let usable = page_size.saturating_sub(NODE_HEADER_SIZE);
    let dir_capacity = usable / DIR_ENTRY_SIZE;
    let leaf_capacity = usable / LEAF_ENTRY_SIZE;

    if dir_capacity <= 1 {
        return Err(TreeError::Configuration {
            page_size,
            kind: "directory",
            capacity: dir_capacity,
        }
        .into());
    }
    if leaf_capacity <= 1 {
        return Err(TreeError::Configuration {
            page_size,
            kind: "leaf",
            capacity: leaf_capacity,
        }
        .into());
    }

    if dir_capacity < SMALL_CAPACITY_WARNING {
        warn!(dir_capacity, "page size allows very few directory entries");
    }
    if leaf_capacity < SMALL_CAPACITY_WARNING {
        warn!(leaf_capacity, "page size allows very few leaf entries");
    }

    Ok(NodeCapacities {
        dir_capacity,
        leaf_capacity,
        dir_minimum: (dir_capacity / 2).max(1),
        leaf_minimum: (leaf_capacity / 2).max(1),
    })
}

impl MkCopTree<MemoryPageFile, Euclidean> {
    /// Starts configuring a tree supporting reverse-kNN queries up to
    /// `kmax`.
    pub fn builder(kmax: usize) -> MkCopTreeBuilder {
        assert!(kmax >= 1, "kmax must be at least 1");
        MkCopTreeBuilder {
            kmax,
            page_size: DEFAULT_PAGE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            strategy: UpperFitStrategy::default(),
        }
    }
}

impl<F: PageFile, M: Metric> MkCopTree<F, M> {
    /// Wires a tree over an arbitrary page file and metric.
    pub fn with_file(
        file: F,
        metric: M,
        kmax: usize,
        capacities: NodeCapacities,
        strategy: UpperFitStrategy,
    ) -> Result<Self> {
        ensure!(kmax >= 1, "kmax must be at least 1");
        let log_k = (1..=kmax).map(|k| (k as f64).ln()).collect();
        Ok(Self {
            file,
            metric,
            kmax,
            log_k,
            strategy,
            capacities,
            objects: HashMap::new(),
            root_entry: None,
            size: 0,
            stats: RknnStatistics::default(),
        })
    }

    /// Maximum k supported by reverse-kNN queries.
    pub fn kmax(&self) -> usize {
        self.kmax
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacities(&self) -> NodeCapacities {
        self.capacities
    }

    /// Reverse-kNN query counters.
    pub fn statistics(&self) -> &RknnStatistics {
        &self.stats
    }

    /// Logical page I/O counters of the backing file.
    pub fn page_stats(&self) -> &PageFileStats {
        self.file.stats()
    }

    /// Flushes the backing file.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()
    }

    /// Single-object insertion cannot maintain the fitted bounds.
    pub fn insert(&mut self, _object: (ObjectId, Vec<f64>)) -> Result<()> {
        Err(TreeError::UnsupportedOperation(
            "single-object insertion is not supported, use insert_all",
        )
        .into())
    }

    /// Bulk-inserts a batch of objects, then recomputes the ground-truth
    /// kNN distances and refits every approximation in the tree.
    pub fn insert_all(&mut self, objects: Vec<(ObjectId, Vec<f64>)>) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }
        self.ensure_root()?;

        let mut new_ids = Vec::with_capacity(objects.len());
        for (id, vector) in objects {
            ensure!(
                !self.objects.contains_key(&id),
                "object id {id} is already indexed"
            );
            self.objects.insert(id, vector);
            new_ids.push(id);
        }
        for &id in &new_ids {
            self.insert_object(id)?;
            self.size += 1;
        }

        ensure!(
            self.size >= self.kmax,
            "approximation fitting needs at least kmax = {} objects, tree holds {}",
            self.kmax,
            self.size
        );

        // every point's curve may shift when neighbors arrive, so the
        // ground truth is recomputed for the whole tree
        let mut all_ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        all_ids.sort_unstable();
        let knn_lists = self.batch_knn_ids(&all_ids, self.kmax)?;
        self.adjust_approximations(&knn_lists)
    }

    /// Height of the tree (1 for a single leaf root).
    pub fn height(&mut self) -> Result<usize> {
        if self.root_entry.is_none() {
            return Ok(0);
        }
        let mut levels = 1;
        let mut node = self.node(ROOT_PAGE)?;
        while !node.is_leaf() {
            node = self.node(node.entry(0).child_page())?;
            levels += 1;
        }
        Ok(levels)
    }

    pub(crate) fn node(&mut self, page: PageId) -> Result<Node> {
        self.file.read_page(page)
    }

    pub(crate) fn write_node(&mut self, node: &Node) -> Result<()> {
        self.file.write_page(node)
    }

    pub(crate) fn new_node(&mut self, kind: NodeKind) -> Node {
        let page = self.file.allocate();
        Node::new(page, kind, self.capacities.of(kind))
    }

    pub(crate) fn vector(&self, id: ObjectId) -> &[f64] {
        &self.objects[&id]
    }

    pub(crate) fn distance(&self, a: ObjectId, b: ObjectId) -> f64 {
        self.metric.distance(self.vector(a), self.vector(b))
    }

    pub(crate) fn distance_to(&self, id: ObjectId, q: &[f64]) -> f64 {
        self.metric.distance(self.vector(id), q)
    }

    pub(crate) fn root_entry(&self) -> Option<&Entry> {
        self.root_entry.as_ref()
    }

    pub(crate) fn set_root_entry(&mut self, entry: Entry) {
        self.root_entry = Some(entry);
    }

    pub(crate) fn take_root_entry(&mut self) -> Option<Entry> {
        self.root_entry.take()
    }

    pub(crate) fn log_k(&self) -> &[f64] {
        &self.log_k
    }

    pub(crate) fn strategy(&self) -> UpperFitStrategy {
        self.strategy
    }

    /// Walks the whole tree verifying structural invariants: node
    /// capacities, entry parent distances and covering radii. Intended
    /// for tests and debugging; O(n log n) distance computations.
    pub fn check_invariants(&mut self) -> Result<()> {
        if self.root_entry.is_none() {
            return Ok(());
        }
        self.check_subtree(ROOT_PAGE, None)?;
        Ok(())
    }

    /// Returns all objects in the subtree, verifying it along the way.
    fn check_subtree(
        &mut self,
        page: PageId,
        routing: Option<(ObjectId, f64)>,
    ) -> Result<Vec<ObjectId>> {
        let node = self.node(page)?;
        ensure!(
            node.len() <= node.capacity(),
            "node {page} exceeds its capacity"
        );

        let mut objects = Vec::new();
        for (_, entry) in node.children() {
            if let Some((parent_object, _)) = routing {
                let d = self.distance(parent_object, entry.routing_object().unwrap());
                ensure!(
                    (d - entry.parent_distance()).abs() <= 1e-9,
                    "entry parent distance {} does not match distance {} in node {page}",
                    entry.parent_distance(),
                    d
                );
            }
            if node.is_leaf() {
                objects.push(entry.routing_object().unwrap());
            } else {
                let child_routing = entry
                    .routing_object()
                    .map(|r| (r, entry.covering_radius()));
                objects.extend(self.check_subtree(entry.child_page(), child_routing)?);
            }
        }

        if let Some((routing_object, covering_radius)) = routing {
            for &o in &objects {
                let d = self.distance(routing_object, o);
                ensure!(
                    d <= covering_radius + 1e-9,
                    "object {o} at distance {d} escapes covering radius {covering_radius} of node {page}"
                );
            }
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_computation_matches_entry_sizes() {
        let caps = initialize_capacities(4096).unwrap();

        assert_eq!(caps.dir_capacity, (4096 - NODE_HEADER_SIZE) / DIR_ENTRY_SIZE);
        assert_eq!(caps.leaf_capacity, (4096 - NODE_HEADER_SIZE) / LEAF_ENTRY_SIZE);
        assert!(caps.dir_minimum >= 1 && caps.dir_minimum <= caps.dir_capacity);
        assert!(caps.leaf_minimum >= 1 && caps.leaf_minimum <= caps.leaf_capacity);
    }

    #[test]
    fn tiny_page_size_is_a_configuration_error() {
        let err = initialize_capacities(64).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TreeError>(),
            Some(TreeError::Configuration { page_size: 64, .. })
        ));
    }

    #[test]
    fn single_insert_is_rejected() {
        let mut tree = MkCopTree::builder(2).open_memory().unwrap();

        let err = tree.insert((1, vec![0.0, 0.0])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TreeError>(),
            Some(TreeError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn duplicate_object_ids_are_rejected() {
        let mut tree = MkCopTree::builder(2).open_memory().unwrap();
        tree.insert_all(vec![(1, vec![0.0]), (2, vec![1.0])]).unwrap();

        let err = tree.insert_all(vec![(1, vec![2.0])]).unwrap_err();
        assert!(err.to_string().contains("already indexed"));
    }

    #[test]
    fn fewer_objects_than_kmax_fails_the_load() {
        let mut tree = MkCopTree::builder(5).open_memory().unwrap();

        let err = tree
            .insert_all(vec![(1, vec![0.0]), (2, vec![1.0])])
            .unwrap_err();
        assert!(err.to_string().contains("kmax"));
    }
}
