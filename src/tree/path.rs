//! # Tree Paths
//!
//! A [`TreePath`] records the descent from the root to one node: for
//! every visited node its page id, its entry index in the parent, and
//! the routing object of the entry that points to it. Insertion and
//! split walk these paths instead of parent pointers; nodes never know
//! their parents, only paths do.
//!
//! The stack is a `SmallVec` sized for eight levels; a tree that deep
//! holds far more entries than any practical page size allows, so the
//! inline capacity is effectively never exceeded.

use std::collections::VecDeque;
use std::fmt::Write as _;

use eyre::Result;
use smallvec::SmallVec;

use super::{MkCopTree, ROOT_PAGE};
use crate::metric::{Metric, ObjectId};
use crate::storage::{PageFile, PageId};

/// Levels held inline before the path spills to the heap.
pub const MAX_TREE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathComponent {
    /// Page of the node this component refers to.
    pub page: PageId,
    /// Index of the entry pointing to this node in its parent;
    /// `None` for the root.
    pub index_in_parent: Option<usize>,
    /// Routing object of the entry pointing to this node; `None` for
    /// the root.
    pub routing_object: Option<ObjectId>,
}

#[derive(Debug, Clone)]
pub struct TreePath {
    components: SmallVec<[PathComponent; MAX_TREE_DEPTH]>,
}

impl TreePath {
    /// The path consisting of the root alone.
    pub fn root(root_page: PageId) -> Self {
        let mut components = SmallVec::new();
        components.push(PathComponent {
            page: root_page,
            index_in_parent: None,
            routing_object: None,
        });
        Self { components }
    }

    pub fn push(&mut self, page: PageId, index_in_parent: usize, routing_object: Option<ObjectId>) {
        self.components.push(PathComponent {
            page,
            index_in_parent: Some(index_in_parent),
            routing_object,
        });
    }

    pub fn last(&self) -> &PathComponent {
        self.components.last().expect("path is never empty")
    }

    /// The component one level above the last, if any.
    pub fn parent(&self) -> Option<&PathComponent> {
        self.components.len().checked_sub(2).map(|i| &self.components[i])
    }

    /// Drops the last component, yielding the path to the parent node.
    pub fn pop(&mut self) -> PathComponent {
        assert!(self.components.len() > 1, "cannot pop the root component");
        self.components.pop().expect("path is never empty")
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_root(&self) -> bool {
        self.components.len() == 1
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }
}

impl<F: PageFile, M: Metric> MkCopTree<F, M> {
    /// Enumerates the path to every node, level by level. Child paths
    /// extend their parent's path with the `(entry, index)` pairs the
    /// node exposes, so positions are never re-derived.
    pub(crate) fn breadth_first_paths(&mut self) -> Result<Vec<TreePath>> {
        let mut paths = Vec::new();
        if self.root_entry().is_none() {
            return Ok(paths);
        }

        let mut queue = VecDeque::new();
        queue.push_back(TreePath::root(ROOT_PAGE));
        while let Some(path) = queue.pop_front() {
            let node = self.node(path.last().page)?;
            if !node.is_leaf() {
                for (i, entry) in node.children() {
                    let mut child = path.clone();
                    child.push(entry.child_page(), i, entry.routing_object());
                    queue.push_back(child);
                }
            }
            paths.push(path);
        }
        Ok(paths)
    }

    /// A structural summary of the tree: node counts per kind, object
    /// count and height.
    pub fn summary(&mut self) -> Result<String> {
        let mut dir_nodes = 0usize;
        let mut leaf_nodes = 0usize;
        let mut objects = 0usize;
        let mut depth = 0usize;

        for path in self.breadth_first_paths()? {
            let node = self.node(path.last().page)?;
            depth = depth.max(path.len());
            if node.is_leaf() {
                leaf_nodes += 1;
                objects += node.len();
            } else {
                dir_nodes += 1;
            }
        }

        let mut out = String::new();
        writeln!(out, "levels: {depth}").unwrap();
        writeln!(out, "directory nodes: {dir_nodes}").unwrap();
        writeln!(out, "leaf nodes: {leaf_nodes}").unwrap();
        writeln!(out, "objects: {objects}").unwrap();
        write!(
            out,
            "capacities: dir = {}, leaf = {}",
            self.capacities().dir_capacity,
            self.capacities().leaf_capacity
        )
        .unwrap();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_has_one_component_without_parent_info() {
        let path = TreePath::root(0);

        assert!(path.is_root());
        assert_eq!(path.last().page, 0);
        assert_eq!(path.last().index_in_parent, None);
        assert!(path.parent().is_none());
    }

    #[test]
    fn push_and_pop_walk_the_same_levels() {
        let mut path = TreePath::root(0);
        path.push(4, 1, Some(10));
        path.push(9, 0, Some(22));

        assert_eq!(path.len(), 3);
        assert_eq!(path.last().page, 9);
        assert_eq!(path.parent().unwrap().page, 4);

        let popped = path.pop();
        assert_eq!(popped.page, 9);
        assert_eq!(popped.routing_object, Some(22));
        assert_eq!(path.last().page, 4);
    }

    #[test]
    #[should_panic(expected = "cannot pop the root component")]
    fn popping_the_root_panics() {
        let mut path = TreePath::root(0);
        path.pop();
    }

    #[test]
    fn breadth_first_enumeration_visits_every_node_once() {
        let points: Vec<(ObjectId, Vec<f64>)> = (0..50)
            .map(|i| (i, vec![i as f64, (i % 7) as f64]))
            .collect();
        let mut tree = MkCopTree::builder(3).page_size(256).open_memory().unwrap();
        tree.insert_all(points).unwrap();

        let paths = tree.breadth_first_paths().unwrap();
        assert_eq!(paths[0].last().page, ROOT_PAGE);

        // levels are emitted in order and pages are unique
        let mut pages: Vec<PageId> = paths.iter().map(|p| p.last().page).collect();
        for pair in paths.windows(2) {
            assert!(pair[0].len() <= pair[1].len());
        }
        pages.sort_unstable();
        pages.dedup();
        assert_eq!(pages.len(), paths.len());

        let summary = tree.summary().unwrap();
        assert!(summary.contains("objects: 50"));
    }
}
