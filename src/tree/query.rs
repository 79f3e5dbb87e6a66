//! # Reverse-kNN Query Engine
//!
//! Branch-and-bound search over the fitted bounds, then exact
//! refinement of whatever the bounds could not decide.
//!
//! ## Search Phase
//!
//! A min-heap of subtrees ordered by their lower-bound distance to the
//! query, seeded with the root page.
//!
//! - Directory entry: `min_dist = max(0, dist(routing, q) - covering
//!   radius)`. If `min_dist` exceeds the entry's conservative
//!   k-distance, no point in the subtree can have `q` within its k
//!   neighbors and the subtree is discarded. Otherwise it is enqueued.
//! - Leaf entry: the true distance is computed. Within the progressive
//!   bound it is a confirmed hit; within the conservative bound (plus
//!   tolerance) it becomes a refinement candidate; beyond it, the point
//!   cannot be a result.
//!
//! ## Refinement Phase
//!
//! One batch kNN pass over the candidates; a candidate is confirmed iff
//! the query would be among its k nearest neighbors, i.e. `dist(p, q)
//! <= kdist_k(p)`.
//!
//! ## Statistics
//!
//! Three running counters survive across queries until `clear()`:
//! every leaf entry passing the conservative filter
//! (`candidates_considered`), confirmations by the progressive bound
//! (`true_hits`), and final result entries (`confirmed_results`).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use eyre::Result;

use super::{MkCopTree, ROOT_PAGE};
use crate::config::QUERY_TOLERANCE;
use crate::error::TreeError;
use crate::metric::{Metric, ObjectId};
use crate::storage::{PageFile, PageId};

/// Running counters of the reverse-kNN queries answered so far.
#[derive(Debug, Default)]
pub struct RknnStatistics {
    candidates: AtomicU64,
    true_hits: AtomicU64,
    results: AtomicU64,
}

impl RknnStatistics {
    /// Leaf entries that survived the conservative filter (true hits
    /// plus refinement candidates).
    pub fn candidates_considered(&self) -> u64 {
        self.candidates.load(AtomicOrdering::Relaxed)
    }

    /// Results confirmed by the progressive bound alone.
    pub fn true_hits(&self) -> u64 {
        self.true_hits.load(AtomicOrdering::Relaxed)
    }

    /// Entries in final query results (true hits plus candidates that
    /// passed refinement).
    pub fn confirmed_results(&self) -> u64 {
        self.results.load(AtomicOrdering::Relaxed)
    }

    pub fn clear(&self) {
        self.candidates.store(0, AtomicOrdering::Relaxed);
        self.true_hits.store(0, AtomicOrdering::Relaxed);
        self.results.store(0, AtomicOrdering::Relaxed);
    }

    fn count_candidate(&self) {
        self.candidates.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn count_true_hit(&self) {
        self.true_hits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn add_results(&self, n: u64) {
        self.results.fetch_add(n, AtomicOrdering::Relaxed);
    }
}

/// Subtree queued by its lower-bound distance; the reversed ordering
/// turns `BinaryHeap` into a min-heap, ties resolved by page id.
#[derive(Debug, Clone, Copy)]
struct SearchCandidate {
    min_dist: f64,
    page: PageId,
}

impl PartialEq for SearchCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchCandidate {}

impl PartialOrd for SearchCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .min_dist
            .total_cmp(&self.min_dist)
            .then_with(|| other.page.cmp(&self.page))
    }
}

impl<F: PageFile, M: Metric> MkCopTree<F, M> {
    /// Returns every indexed point that has the query point among its k
    /// nearest neighbors, as `(distance, id)` pairs in ascending
    /// (distance, id) order. Fails for `k > kmax` without touching the
    /// tree.
    pub fn reverse_knn_query(&mut self, query: &[f64], k: usize) -> Result<Vec<(f64, ObjectId)>> {
        if k == 0 || k > self.kmax {
            return Err(TreeError::InvalidQueryParameter { k, kmax: self.kmax }.into());
        }
        if self.root_entry.is_none() {
            return Ok(Vec::new());
        }

        let mut results: Vec<(f64, ObjectId)> = Vec::new();
        let mut candidates: Vec<ObjectId> = Vec::new();
        self.search_phase(query, k as u32, &mut results, &mut candidates)?;

        candidates.sort_unstable();
        let knn_lists = self.batch_knn_ids(&candidates, k)?;
        for &p in &candidates {
            let d = self.distance_to(p, query);
            if d <= knn_lists[&p].knn_distance() {
                results.push((d, p));
            }
        }

        results.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        self.stats.add_results(results.len() as u64);
        Ok(results)
    }

    fn search_phase(
        &mut self,
        query: &[f64],
        k: u32,
        results: &mut Vec<(f64, ObjectId)>,
        candidates: &mut Vec<ObjectId>,
    ) -> Result<()> {
        let mut heap = BinaryHeap::new();
        heap.push(SearchCandidate {
            min_dist: 0.0,
            page: ROOT_PAGE,
        });

        while let Some(next) = heap.pop() {
            let node = self.node(next.page)?;

            if node.is_leaf() {
                for (_, entry) in node.children() {
                    let p = entry.routing_object().expect("leaf entry has object");
                    let distance = self.distance_to(p, query);

                    if distance <= entry.progressive_knn_distance(k) {
                        self.stats.count_candidate();
                        self.stats.count_true_hit();
                        results.push((distance, p));
                    } else if distance - entry.conservative_knn_distance(k) <= QUERY_TOLERANCE {
                        self.stats.count_candidate();
                        candidates.push(p);
                    }
                }
            } else {
                for (_, entry) in node.children() {
                    let min_dist = match entry.routing_object() {
                        Some(routing) => {
                            let d = self.distance_to(routing, query);
                            (d - entry.covering_radius()).max(0.0)
                        }
                        None => 0.0,
                    };

                    if min_dist <= entry.conservative_knn_distance(k) {
                        heap.push(SearchCandidate {
                            min_dist,
                            page: entry.child_page(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MkCopTree;

    fn cross_points() -> Vec<(ObjectId, Vec<f64>)> {
        // two tight clusters far apart
        let mut points = Vec::new();
        for i in 0..6u32 {
            points.push((i, vec![i as f64 * 0.1, 0.0]));
        }
        for i in 0..6u32 {
            points.push((100 + i, vec![1000.0 + i as f64 * 0.1, 0.0]));
        }
        points
    }

    #[test]
    fn k_above_kmax_is_rejected_without_partial_results() {
        let mut tree = MkCopTree::builder(3).open_memory().unwrap();
        tree.insert_all(cross_points()).unwrap();

        for k in 4..=13 {
            let err = tree.reverse_knn_query(&[0.0, 0.0], k).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<TreeError>(),
                Some(TreeError::InvalidQueryParameter { kmax: 3, .. })
            ));
        }
        assert_eq!(tree.statistics().confirmed_results(), 0);
    }

    #[test]
    fn faraway_cluster_is_not_in_the_result() {
        let mut tree = MkCopTree::builder(3).open_memory().unwrap();
        tree.insert_all(cross_points()).unwrap();

        let results = tree.reverse_knn_query(&[0.25, 0.0], 3).unwrap();

        assert!(!results.is_empty());
        for (_, id) in &results {
            assert!(*id < 100, "point {id} of the far cluster must not appear");
        }
    }

    #[test]
    fn results_are_sorted_by_distance() {
        let mut tree = MkCopTree::builder(3).open_memory().unwrap();
        tree.insert_all(cross_points()).unwrap();

        let results = tree.reverse_knn_query(&[0.25, 0.0], 3).unwrap();
        for pair in results.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }

    #[test]
    fn statistics_accumulate_and_clear() {
        let mut tree = MkCopTree::builder(3).open_memory().unwrap();
        tree.insert_all(cross_points()).unwrap();

        tree.reverse_knn_query(&[0.25, 0.0], 3).unwrap();
        let stats = tree.statistics();
        assert!(stats.candidates_considered() >= stats.true_hits());
        assert!(stats.confirmed_results() >= stats.true_hits());

        stats.clear();
        assert_eq!(stats.candidates_considered(), 0);
        assert_eq!(stats.true_hits(), 0);
        assert_eq!(stats.confirmed_results(), 0);
    }

    #[test]
    fn empty_tree_answers_with_an_empty_result() {
        let mut tree = MkCopTree::builder(3).open_memory().unwrap();
        let results = tree.reverse_knn_query(&[1.0, 2.0], 2).unwrap();
        assert!(results.is_empty());
    }
}
