//! # Node Splits
//!
//! Overflow handling promotes two routing objects and redistributes the
//! node's entries between the old and a new sibling node.
//!
//! ## Promotion
//!
//! The node's existing routing object stays promoted (its parent entry
//! already routes to this region); the entry farthest from it becomes
//! the second promoted object. When the node has no routing object yet
//! (a root split), the first entry's object stands in.
//!
//! ## Distribution
//!
//! Balanced assignment: entries are ranked by distance to each promoted
//! object; alternating turns assign the closest unassigned entry to the
//! first and second node. Both halves end up within one entry of each
//! other, and every assigned entry's parent distance is rewritten to
//! the distance to its new routing object.
//!
//! ## Covering Radii
//!
//! From the assignment distances: for a leaf node the radius is the
//! maximum assignment distance; for a directory node each child's own
//! covering radius is added first, which keeps the bound valid by the
//! triangle inequality without re-reading any child page.

use crate::metric::{DistanceEntry, ObjectId};

use super::entry::Entry;
use super::node::Node;

/// Result of promoting and distributing one overflowing node.
#[derive(Debug)]
pub struct Assignments {
    pub first_routing: ObjectId,
    pub second_routing: ObjectId,
    pub first: Vec<Entry>,
    pub second: Vec<Entry>,
    pub first_cover: f64,
    pub second_cover: f64,
}

/// Splits `node`'s entries. `routing_object` is the node's routing
/// object in its parent, if it has one; `distance` measures between two
/// indexed objects.
pub fn promote_and_distribute(
    node: &Node,
    routing_object: Option<ObjectId>,
    mut distance: impl FnMut(ObjectId, ObjectId) -> f64,
) -> Assignments {
    let entries = node.entries();
    debug_assert!(entries.len() >= 2, "cannot split a node with fewer than 2 entries");

    let object_of = |e: &Entry| e.routing_object().expect("non-root entries have objects");

    let first_routing = routing_object.unwrap_or_else(|| object_of(&entries[0]));

    // distances to the first promoted object, reused for distribution
    let to_first: Vec<f64> = entries
        .iter()
        .map(|e| distance(object_of(e), first_routing))
        .collect();

    let second_routing = entries
        .iter()
        .enumerate()
        .map(|(i, e)| DistanceEntry::new(to_first[i], object_of(e), i))
        .max()
        .expect("node is not empty")
        .object;

    let to_second: Vec<f64> = entries
        .iter()
        .map(|e| distance(object_of(e), second_routing))
        .collect();

    let mut order_first: Vec<DistanceEntry> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| DistanceEntry::new(to_first[i], object_of(e), i))
        .collect();
    let mut order_second: Vec<DistanceEntry> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| DistanceEntry::new(to_second[i], object_of(e), i))
        .collect();
    order_first.sort();
    order_second.sort();

    let mut assigned = vec![false; entries.len()];
    let mut first = Vec::with_capacity(entries.len() / 2 + 1);
    let mut second = Vec::with_capacity(entries.len() / 2 + 1);
    let (mut first_cover, mut second_cover) = (0.0f64, 0.0f64);
    let (mut i, mut j) = (0usize, 0usize);

    let mut assign_first = true;
    for _ in 0..entries.len() {
        if assign_first {
            while assigned[order_first[i].index] {
                i += 1;
            }
            let pick = order_first[i];
            assigned[pick.index] = true;
            let mut entry = entries[pick.index].clone();
            entry.set_parent_distance(pick.distance);
            first_cover = first_cover.max(pick.distance + entry.covering_radius());
            first.push(entry);
        } else {
            while assigned[order_second[j].index] {
                j += 1;
            }
            let pick = order_second[j];
            assigned[pick.index] = true;
            let mut entry = entries[pick.index].clone();
            entry.set_parent_distance(pick.distance);
            second_cover = second_cover.max(pick.distance + entry.covering_radius());
            second.push(entry);
        }
        assign_first = !assign_first;
    }

    Assignments {
        first_routing,
        second_routing,
        first,
        second,
        first_cover,
        second_cover,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::NodeKind;

    // objects on a line: distance = |a - b|
    fn line_distance(a: ObjectId, b: ObjectId) -> f64 {
        (a as f64 - b as f64).abs()
    }

    fn leaf_with(objects: &[ObjectId]) -> Node {
        let mut node = Node::new(1, NodeKind::Leaf, objects.len() + 1);
        for &o in objects {
            node.add_entry(Entry::new_leaf(o, 0.0));
        }
        node
    }

    #[test]
    fn promotes_the_farthest_entry_as_second_routing_object() {
        let node = leaf_with(&[10, 11, 12, 40]);

        let split = promote_and_distribute(&node, Some(10), line_distance);

        assert_eq!(split.first_routing, 10);
        assert_eq!(split.second_routing, 40);
    }

    #[test]
    fn distribution_is_balanced() {
        let node = leaf_with(&[0, 1, 2, 100, 101, 102]);

        let split = promote_and_distribute(&node, Some(0), line_distance);

        assert_eq!(split.first.len(), 3);
        assert_eq!(split.second.len(), 3);
    }

    #[test]
    fn parent_distances_and_covers_match_assignments() {
        let node = leaf_with(&[0, 1, 2, 100, 101, 102]);

        let split = promote_and_distribute(&node, Some(0), line_distance);

        for entry in &split.first {
            let d = line_distance(entry.routing_object().unwrap(), split.first_routing);
            assert_eq!(entry.parent_distance(), d);
            assert!(d <= split.first_cover);
        }
        for entry in &split.second {
            let d = line_distance(entry.routing_object().unwrap(), split.second_routing);
            assert_eq!(entry.parent_distance(), d);
            assert!(d <= split.second_cover);
        }
    }

    #[test]
    fn directory_covers_include_child_radii() {
        let mut node = Node::new(1, NodeKind::Directory, 4);
        node.add_entry(Entry::new_directory(10, Some(0), 5.0, 0.0));
        node.add_entry(Entry::new_directory(11, Some(1), 0.5, 0.0));
        node.add_entry(Entry::new_directory(12, Some(50), 2.0, 0.0));

        let split = promote_and_distribute(&node, Some(0), line_distance);

        // child at object 0 with radius 5 must be inside the first cover
        assert!(split.first_cover >= 5.0);
        // second routing is 50, its own radius is 2
        assert_eq!(split.second_routing, 50);
        assert!(split.second_cover >= 2.0);
    }

    #[test]
    fn root_split_without_routing_object_uses_the_first_entry() {
        let node = leaf_with(&[7, 8, 30]);

        let split = promote_and_distribute(&node, None, line_distance);

        assert_eq!(split.first_routing, 7);
        assert_eq!(split.second_routing, 30);
    }
}
