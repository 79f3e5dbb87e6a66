//! # Approximation Fitting Pass
//!
//! After a bulk load the true 1..kmax neighbor distances of every
//! indexed point are known; this pass walks the tree post-order and
//! installs the fitted bounds:
//!
//! - every leaf entry gets a conservative and a progressive line fitted
//!   to its own distance samples (hull-constrained regression);
//! - every directory entry gets the two-point conservative envelope of
//!   its children, computed after the subtree below it is done.
//!
//! The envelope is intentionally coarse: children are evaluated at the
//! shared floor `k0 = min(child k0)` and at `kmax`, the maxima at both
//! ends are connected by one line. That line over-approximates every
//! child everywhere in `[k0, kmax]` (the children are lines, maxima at
//! the interval ends bound a maximum of lines), which is all pruning
//! needs.
//!
//! ## Zero Distances
//!
//! A leading run of zero distances (coincident points) would put
//! `ln(0)` into the regression; instead the run length shifts the
//! line's floor upward and only the non-zero tail is fitted. A point
//! whose whole sample range is zero gets degenerate lines that report
//! distance zero for every queryable k.

use eyre::Result;
use hashbrown::HashMap;

use super::entry::Entry;
use super::knn::KnnList;
use super::MkCopTree;
use crate::approx::{fit_conservative, fit_progressive, ApproximationLine, ConvexHull, FitSums};
use crate::metric::{Metric, ObjectId};
use crate::storage::PageFile;

impl<F: PageFile, M: Metric> MkCopTree<F, M> {
    /// Recomputes every approximation in the tree from the given
    /// ground-truth kNN lists (one per indexed object, kmax deep).
    pub(crate) fn adjust_approximations(
        &mut self,
        knn_lists: &HashMap<ObjectId, KnnList>,
    ) -> Result<()> {
        let mut root_entry = self.take_root_entry().expect("tree is initialized");
        self.adjust_entry(&mut root_entry, knn_lists)?;
        self.set_root_entry(root_entry);
        Ok(())
    }

    /// Post-order walk: fit the subtree below `entry`, then store the
    /// node-level aggregate on `entry` itself.
    fn adjust_entry(
        &mut self,
        entry: &mut Entry,
        knn_lists: &HashMap<ObjectId, KnnList>,
    ) -> Result<()> {
        let page = entry.child_page();
        let mut node = self.node(page)?;

        if node.is_leaf() {
            for i in 0..node.len() {
                let id = node.entry(i).routing_object().expect("leaf entry has object");
                let list = &knn_lists[&id];
                let (conservative, progressive) = self.fit_leaf_lines(list);
                let leaf_entry = node.entry_mut(i);
                leaf_entry.set_conservative(conservative);
                leaf_entry.set_progressive(progressive);
            }
        } else {
            for i in 0..node.len() {
                let mut child = node.entry(i).clone();
                self.adjust_entry(&mut child, knn_lists)?;
                *node.entry_mut(i) = child;
            }
        }

        entry.set_conservative(aggregate_conservative(node.entries(), self.kmax as u32));
        self.write_node(&node)
    }

    /// Fits both lines for one point from its 1..kmax distances.
    fn fit_leaf_lines(&self, list: &KnnList) -> (ApproximationLine, ApproximationLine) {
        let distances = list.distances(self.kmax);
        let zeros = distances.iter().take_while(|&&d| d == 0.0).count();

        if zeros == self.kmax {
            // more coincident duplicates than kmax: the whole curve is zero
            let line = ApproximationLine::degenerate(self.kmax as u32 + 1);
            return (line, line);
        }

        let k0 = zeros as u32 + 1;
        let xs = &self.log_k()[zeros..];
        let ys: Vec<f64> = distances[zeros..].iter().map(|d| d.ln()).collect();

        let hull = ConvexHull::build(xs, &ys);
        let sums = FitSums::compute(xs, &ys);

        let conservative = fit_conservative(&hull, xs, &ys, &sums, k0, self.strategy());
        let progressive = fit_progressive(&hull, xs, &ys, &sums, k0);
        (conservative, progressive)
    }
}

/// Two-point conservative envelope over a node's children.
fn aggregate_conservative(entries: &[Entry], kmax: u32) -> ApproximationLine {
    let k0 = entries
        .iter()
        .map(|e| e.conservative().expect("children are fitted").k0())
        .min()
        .expect("node is not empty");

    if k0 > kmax {
        // every child is degenerate
        return ApproximationLine::degenerate(k0);
    }

    let mut y_k0 = f64::NEG_INFINITY;
    let mut y_kmax = f64::NEG_INFINITY;
    for entry in entries {
        let line = entry.conservative().expect("children are fitted");
        y_k0 = y_k0.max(line.eval_log(k0));
        y_kmax = y_kmax.max(line.eval_log(kmax));
    }

    if !y_k0.is_finite() || !y_kmax.is_finite() {
        return ApproximationLine::degenerate(k0);
    }
    if k0 == kmax {
        return ApproximationLine::new(k0, 0.0, y_k0.max(y_kmax));
    }

    let slope = (y_kmax - y_k0) / ((kmax as f64).ln() - (k0 as f64).ln());
    let intercept = y_k0 - slope * (k0 as f64).ln();
    ApproximationLine::new(k0, slope, intercept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MkCopTree;

    fn fitted_leaf(k0: u32, slope: f64, intercept: f64) -> Entry {
        let mut entry = Entry::new_leaf(1, 0.0);
        entry.set_conservative(ApproximationLine::new(k0, slope, intercept));
        entry
    }

    #[test]
    fn envelope_dominates_every_child_line() {
        let entries = vec![
            fitted_leaf(1, 0.5, -0.2),
            fitted_leaf(1, 0.8, -1.0),
            fitted_leaf(2, 0.3, 0.4),
        ];
        let kmax = 10;

        let envelope = aggregate_conservative(&entries, kmax);
        assert_eq!(envelope.k0(), 1);

        for k in 1..=kmax {
            for entry in &entries {
                let child = entry.conservative().unwrap();
                assert!(
                    envelope.eval_log(k) >= child.eval_log(k) - 1e-9,
                    "envelope below child at k={k}"
                );
            }
        }
    }

    #[test]
    fn envelope_of_degenerate_children_is_degenerate() {
        let mut a = Entry::new_leaf(1, 0.0);
        a.set_conservative(ApproximationLine::degenerate(11));
        let mut b = Entry::new_leaf(2, 0.0);
        b.set_conservative(ApproximationLine::degenerate(11));

        let envelope = aggregate_conservative(&[a, b], 10);
        assert_eq!(envelope.k0(), 11);
        assert_eq!(envelope.knn_distance(10), 0.0);
    }

    #[test]
    fn degenerate_children_never_dominate_real_ones() {
        let mut degenerate = Entry::new_leaf(1, 0.0);
        degenerate.set_conservative(ApproximationLine::degenerate(11));
        let real = fitted_leaf(1, 0.5, 0.0);

        let envelope = aggregate_conservative(&[degenerate, real.clone()], 10);

        let child = real.conservative().unwrap();
        for k in 1..=10u32 {
            assert!((envelope.eval_log(k) - child.eval_log(k)).abs() <= 1e-9);
        }
    }

    #[test]
    fn zero_distance_runs_shift_the_fitted_floor() {
        // five coincident points: each has four zero-distance neighbors
        // besides itself, so five leading zeros in its distance vector
        let mut points: Vec<(ObjectId, Vec<f64>)> =
            (0..5).map(|i| (i, vec![1.0, 1.0])).collect();
        for i in 0..20u32 {
            points.push((10 + i, vec![10.0 + i as f64, 3.0 * i as f64]));
        }

        let mut tree = MkCopTree::builder(6).open_memory().unwrap();
        tree.insert_all(points).unwrap();

        // collect the fitted floors of the cluster's leaf entries
        let mut pages = vec![crate::tree::ROOT_PAGE];
        let mut checked = 0;
        while let Some(page) = pages.pop() {
            let node = tree.node(page).unwrap();
            for (_, entry) in node.children() {
                if !node.is_leaf() {
                    pages.push(entry.child_page());
                } else if entry.routing_object().unwrap() < 5 {
                    let k0 = entry.conservative().unwrap().k0();
                    assert!(k0 >= 5, "floor {k0} below the zero-distance run");
                    assert_eq!(entry.progressive().unwrap().k0(), k0);
                    checked += 1;
                }
            }
        }
        assert_eq!(checked, 5);
    }
}
