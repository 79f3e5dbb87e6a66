//! # k-Nearest-Neighbor Lists and Batch Search
//!
//! [`KnnList`] is the bounded result list of one kNN query: sorted by
//! (distance, id), holding the k nearest candidates seen so far plus
//! any ties at the current k-distance. The k-distance (`+inf` until the
//! list fills) drives all pruning.
//!
//! Lists are **self-inclusive**: when the query object is itself
//! indexed, its rank-1 neighbor is itself at distance zero. The fitting
//! pass and the refinement phase both build on this convention.
//!
//! The batch walk answers many kNN queries in one traversal: a subtree
//! is entered only if its minimum possible distance to *some* query is
//! within that query's current k-distance, and subtrees are visited in
//! ascending order of that minimum so k-distances tighten early.

use std::cmp::Ordering;

use eyre::Result;
use hashbrown::HashMap;

use super::{MkCopTree, ROOT_PAGE};
use crate::metric::{DistanceEntry, Metric, ObjectId};
use crate::storage::{PageFile, PageId};

#[derive(Debug, Clone)]
pub struct KnnList {
    k: usize,
    entries: Vec<(f64, ObjectId)>,
}

impl KnnList {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            entries: Vec::with_capacity(k + 1),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distance of the k-th nearest candidate; `+inf` until k
    /// candidates have been seen.
    pub fn knn_distance(&self) -> f64 {
        if self.entries.len() < self.k {
            f64::INFINITY
        } else {
            self.entries[self.k - 1].0
        }
    }

    /// Adds a candidate if it is within the current k-distance. Ties at
    /// the k-distance are kept; candidates strictly beyond it are
    /// dropped.
    pub fn add(&mut self, distance: f64, object: ObjectId) {
        if distance > self.knn_distance() {
            return;
        }

        let pos = self
            .entries
            .partition_point(|&(d, o)| match d.total_cmp(&distance) {
                Ordering::Less => true,
                Ordering::Equal => o < object,
                Ordering::Greater => false,
            });
        self.entries.insert(pos, (distance, object));

        while self.entries.len() > self.k && self.entries.last().unwrap().0 > self.knn_distance() {
            self.entries.pop();
        }
    }

    /// Candidates in ascending (distance, id) order.
    pub fn entries(&self) -> &[(f64, ObjectId)] {
        &self.entries
    }

    /// The distances of ranks 1..=n. Panics if fewer than n candidates
    /// were collected.
    pub fn distances(&self, n: usize) -> Vec<f64> {
        assert!(self.entries.len() >= n, "kNN list holds fewer than {n} entries");
        self.entries[..n].iter().map(|&(d, _)| d).collect()
    }
}

impl<F: PageFile, M: Metric> MkCopTree<F, M> {
    /// Answers kNN queries for all `ids` in one pruned traversal.
    /// Lists are self-inclusive: a query id that is indexed contributes
    /// itself at distance zero.
    pub(crate) fn batch_knn_ids(
        &mut self,
        ids: &[ObjectId],
        k: usize,
    ) -> Result<HashMap<ObjectId, KnnList>> {
        let mut lists: HashMap<ObjectId, KnnList> =
            ids.iter().map(|&q| (q, KnnList::new(k))).collect();
        if ids.is_empty() || self.root_entry.is_none() {
            return Ok(lists);
        }
        self.batch_knn_node(ROOT_PAGE, ids, &mut lists)?;
        Ok(lists)
    }

    fn batch_knn_node(
        &mut self,
        page: PageId,
        ids: &[ObjectId],
        lists: &mut HashMap<ObjectId, KnnList>,
    ) -> Result<()> {
        let node = self.node(page)?;

        if node.is_leaf() {
            for (_, entry) in node.children() {
                let p = entry.routing_object().expect("leaf entry has object");
                for &q in ids {
                    let distance = self.distance(p, q);
                    let list = lists.get_mut(&q).expect("list exists for every query");
                    if distance <= list.knn_distance() {
                        list.add(distance, p);
                    }
                }
            }
            return Ok(());
        }

        // visit children by their closest possible distance to any
        // query, so k-distances tighten before farther subtrees are
        // considered
        let mut order: Vec<DistanceEntry> = Vec::with_capacity(node.len());
        for (i, entry) in node.children() {
            let routing = entry.routing_object().expect("directory entry below root");
            let mut min_min = f64::INFINITY;
            for &q in ids {
                let d = self.distance(routing, q);
                min_min = min_min.min((d - entry.covering_radius()).max(0.0));
            }
            order.push(DistanceEntry::new(min_min, routing, i));
        }
        order.sort();

        for candidate in order {
            let needed = ids
                .iter()
                .any(|q| candidate.distance <= lists[q].knn_distance());
            if needed {
                let child = node.entry(candidate.index).child_page();
                self.batch_knn_node(child, ids, lists)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knn_distance_is_infinite_until_filled() {
        let mut list = KnnList::new(3);
        list.add(1.0, 1);
        list.add(2.0, 2);

        assert_eq!(list.knn_distance(), f64::INFINITY);

        list.add(3.0, 3);
        assert_eq!(list.knn_distance(), 3.0);
    }

    #[test]
    fn candidates_beyond_the_k_distance_are_dropped() {
        let mut list = KnnList::new(2);
        list.add(1.0, 1);
        list.add(2.0, 2);
        list.add(5.0, 3);

        assert_eq!(list.len(), 2);
        assert_eq!(list.knn_distance(), 2.0);
    }

    #[test]
    fn better_candidates_displace_worse_ones() {
        let mut list = KnnList::new(2);
        list.add(4.0, 1);
        list.add(5.0, 2);
        list.add(1.0, 3);

        assert_eq!(list.knn_distance(), 4.0);
        assert_eq!(list.entries(), &[(1.0, 3), (4.0, 1)]);
    }

    #[test]
    fn ties_at_the_k_distance_are_kept() {
        let mut list = KnnList::new(2);
        list.add(1.0, 1);
        list.add(2.0, 2);
        list.add(2.0, 3);

        assert_eq!(list.len(), 3);
        assert_eq!(list.knn_distance(), 2.0);
    }

    #[test]
    fn equal_distances_order_by_id() {
        let mut list = KnnList::new(4);
        list.add(1.0, 9);
        list.add(1.0, 2);
        list.add(0.5, 5);

        assert_eq!(list.entries(), &[(0.5, 5), (1.0, 2), (1.0, 9)]);
    }

    #[test]
    fn batch_walk_matches_brute_force() {
        let points: Vec<(ObjectId, Vec<f64>)> = (0..30)
            .map(|i| {
                let x = (i as f64 * 0.37).sin() * 10.0;
                let y = (i as f64 * 0.71).cos() * 10.0;
                (i, vec![x, y])
            })
            .collect();

        let mut tree = MkCopTree::builder(3).page_size(256).open_memory().unwrap();
        tree.insert_all(points.clone()).unwrap();

        let ids = [0u32, 7, 19, 29];
        let lists = tree.batch_knn_ids(&ids, 3).unwrap();

        for &q in &ids {
            let qv = &points[q as usize].1;
            let mut brute: Vec<f64> = points
                .iter()
                .map(|(_, v)| {
                    ((v[0] - qv[0]).powi(2) + (v[1] - qv[1]).powi(2)).sqrt()
                })
                .collect();
            brute.sort_by(f64::total_cmp);

            // rank 1 is the query itself at distance zero
            assert_eq!(lists[&q].entries()[0].0, 0.0);
            assert!((lists[&q].knn_distance() - brute[2]).abs() < 1e-9);
        }
    }
}
