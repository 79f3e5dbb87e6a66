//! # Metric-Tree Insertion
//!
//! The generic M-tree machinery the reverse-kNN layer builds on:
//! insertion-path selection, covering-radius maintenance and the
//! overflow/split loop. Approximation lines are not touched here; a
//! freshly inserted leaf entry carries none until the fitting pass of
//! the surrounding bulk load.
//!
//! ## Path Selection
//!
//! Descending from the root, the child whose routing ball already
//! contains the object (smallest distance wins) is preferred; when no
//! ball contains it, the child needing the smallest radius extension is
//! chosen and its covering radius grows to the new distance on the way
//! down.
//!
//! ## Overflow
//!
//! After adding the leaf entry, ascend the insertion path while the
//! last node has used its overflow slot: split it, install the second
//! half in the parent, and continue with the parent. A root split
//! moves the old root to a fresh page and rebuilds page 0 as a
//! directory node over the two promoted halves, so the root page id
//! never changes.

use eyre::Result;
use tracing::{debug, trace};

use super::entry::Entry;
use super::node::NodeKind;
use super::path::TreePath;
use super::split::{promote_and_distribute, Assignments};
use super::{MkCopTree, ROOT_PAGE};
use crate::metric::{DistanceEntry, Metric, ObjectId};
use crate::storage::PageFile;

impl<F: PageFile, M: Metric> MkCopTree<F, M> {
    /// Creates the empty root (a leaf node on page 0) on first use.
    pub(crate) fn ensure_root(&mut self) -> Result<()> {
        if self.root_entry.is_some() {
            return Ok(());
        }
        let root = self.new_node(NodeKind::Leaf);
        debug_assert_eq!(root.page(), ROOT_PAGE);
        self.write_node(&root)?;
        self.root_entry = Some(Entry::new_directory(ROOT_PAGE, None, 0.0, 0.0));
        Ok(())
    }

    /// Inserts one already-registered object into the tree structure.
    pub(crate) fn insert_object(&mut self, id: ObjectId) -> Result<()> {
        trace!(id, "insert");

        let path = self.find_insertion_path(id)?;

        let parent_distance = match path.last().routing_object {
            Some(routing) => self.distance(id, routing),
            None => 0.0,
        };

        let mut leaf = self.node(path.last().page)?;
        leaf.add_entry(Entry::new_leaf(id, parent_distance));
        self.write_node(&leaf)?;

        let mut path = path;
        while self.has_overflow(&path)? {
            path = self.split_node(&path)?;
        }
        Ok(())
    }

    /// Walks from the root to the leaf node that should receive the
    /// object, extending covering radii where needed.
    fn find_insertion_path(&mut self, id: ObjectId) -> Result<TreePath> {
        let mut path = TreePath::root(ROOT_PAGE);

        loop {
            let mut node = self.node(path.last().page)?;
            if node.is_leaf() {
                return Ok(path);
            }

            // candidates whose ball already contains the object, by distance
            let mut best_inside: Option<DistanceEntry> = None;
            // otherwise: by required radius extension
            let mut best_outside: Option<DistanceEntry> = None;

            for (i, entry) in node.children() {
                let routing = entry.routing_object().expect("directory entry below root");
                let distance = self.distance(id, routing);
                let extension = distance - entry.covering_radius();

                if extension <= 0.0 {
                    let candidate = DistanceEntry::new(distance, routing, i);
                    if best_inside.map_or(true, |b| candidate < b) {
                        best_inside = Some(candidate);
                    }
                } else {
                    let candidate = DistanceEntry::new(extension, routing, i);
                    if best_outside.map_or(true, |b| candidate < b) {
                        best_outside = Some(candidate);
                    }
                }
            }

            let chosen = match best_inside {
                Some(c) => c,
                None => {
                    let c = best_outside.expect("directory node is not empty");
                    // grow the ball to the new object's distance
                    let entry = node.entry_mut(c.index);
                    let distance = c.distance + entry.covering_radius();
                    entry.set_covering_radius(distance);
                    self.write_node(&node)?;
                    c
                }
            };

            let entry = node.entry(chosen.index);
            path.push(entry.child_page(), chosen.index, entry.routing_object());
        }
    }

    fn has_overflow(&mut self, path: &TreePath) -> Result<bool> {
        Ok(self.node(path.last().page)?.is_full())
    }

    /// Splits the last node of the path; returns the path to its parent.
    fn split_node(&mut self, path: &TreePath) -> Result<TreePath> {
        let component = *path.last();
        let mut node = self.node(component.page)?;

        let assignments = promote_and_distribute(&node, component.routing_object, |a, b| {
            self.distance(a, b)
        });

        let mut new_node = self.new_node(node.kind());
        let Assignments {
            first_routing,
            second_routing,
            first,
            second,
            first_cover,
            second_cover,
        } = assignments;
        node.split_by_assignment(&mut new_node, first, second);

        debug!(
            page = node.page(),
            new_page = new_node.page(),
            first_routing,
            second_routing,
            "split node"
        );

        self.write_node(&node)?;
        self.write_node(&new_node)?;

        if component.page == ROOT_PAGE {
            self.create_new_root(
                node,
                new_node,
                first_routing,
                second_routing,
                first_cover,
                second_cover,
            )?;
            return Ok(TreePath::root(ROOT_PAGE));
        }

        let parent_component = *path.parent().expect("non-root node has a parent");
        let mut parent = self.node(parent_component.page)?;
        let node_index = component.index_in_parent.expect("non-root node has an index");

        // distances to the grandparent's routing object; zero directly
        // under the root
        let (parent_distance_1, parent_distance_2) = match parent_component.routing_object {
            Some(grand) => (
                self.distance(first_routing, grand),
                self.distance(second_routing, grand),
            ),
            None => (0.0, 0.0),
        };

        // the split node keeps its slot under the first promoted object
        let old_entry = parent.entry_mut(node_index);
        *old_entry = Entry::new_directory(
            component.page,
            Some(first_routing),
            first_cover,
            parent_distance_1,
        );

        parent.add_entry(Entry::new_directory(
            new_node.page(),
            Some(second_routing),
            second_cover,
            parent_distance_2,
        ));
        self.write_node(&parent)?;

        let mut parent_path = path.clone();
        parent_path.pop();
        Ok(parent_path)
    }

    /// Rebuilds page 0 as a directory node over the two halves of a
    /// root split. The old root moves to a fresh page.
    fn create_new_root(
        &mut self,
        mut old_root: super::node::Node,
        new_node: super::node::Node,
        first_routing: ObjectId,
        second_routing: ObjectId,
        first_cover: f64,
        second_cover: f64,
    ) -> Result<()> {
        let moved_page = self.file.allocate();
        old_root.set_page(moved_page);
        self.write_node(&old_root)?;

        let mut root = super::node::Node::new(
            ROOT_PAGE,
            NodeKind::Directory,
            self.capacities.dir_capacity,
        );
        root.add_entry(Entry::new_directory(
            moved_page,
            Some(first_routing),
            first_cover,
            0.0,
        ));
        root.add_entry(Entry::new_directory(
            new_node.page(),
            Some(second_routing),
            second_cover,
            0.0,
        ));
        self.write_node(&root)?;

        debug!(moved_page, "created new root");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points(n: usize) -> Vec<(ObjectId, Vec<f64>)> {
        (0..n)
            .map(|i| {
                let x = (i % 10) as f64;
                let y = (i / 10) as f64;
                (i as ObjectId, vec![x, y])
            })
            .collect()
    }

    #[test]
    fn bulk_insert_keeps_structural_invariants() {
        // a small page forces plenty of splits
        let mut tree = MkCopTree::builder(3).page_size(256).open_memory().unwrap();
        tree.insert_all(grid_points(60)).unwrap();

        assert_eq!(tree.len(), 60);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn root_split_grows_the_height_and_keeps_page_zero() {
        let mut tree = MkCopTree::builder(2).page_size(256).open_memory().unwrap();
        tree.insert_all(grid_points(40)).unwrap();

        assert!(tree.height().unwrap() >= 2);
        let root = tree.node(ROOT_PAGE).unwrap();
        assert!(!root.is_leaf());
    }

    #[test]
    fn small_loads_stay_in_a_single_leaf_root() {
        let mut tree = MkCopTree::builder(2).open_memory().unwrap();
        tree.insert_all(grid_points(4)).unwrap();

        assert_eq!(tree.height().unwrap(), 1);
        let root = tree.node(ROOT_PAGE).unwrap();
        assert!(root.is_leaf());
        assert_eq!(root.len(), 4);
    }

    #[test]
    fn every_node_respects_capacity_after_many_splits() {
        let mut tree = MkCopTree::builder(2).page_size(256).open_memory().unwrap();
        tree.insert_all(grid_points(100)).unwrap();

        let mut pages = vec![ROOT_PAGE];
        while let Some(page) = pages.pop() {
            let node = tree.node(page).unwrap();
            assert!(node.len() <= node.capacity());
            if !node.is_leaf() {
                for (_, entry) in node.children() {
                    pages.push(entry.child_page());
                }
            }
        }
    }
}
