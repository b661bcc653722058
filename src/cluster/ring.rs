//! The consistent hash ring mapping activations to owning nodes.

use std::collections::{BTreeMap, HashSet};

use super::NodeDesc;
use crate::actor::ActorId;
use crate::constants::RING_REPLICAS;

/// A consistent hash ring over node descriptors.
///
/// Each node contributes [`RING_REPLICAS`] points derived from its identity
/// alone, so every node with the same membership view computes the same
/// ring. Adding a node moves an expected `1/N` share of the key space onto
/// it and leaves every other mapping untouched; removing it restores the
/// prior mapping exactly. Lookup walks to the key's clockwise successor in
/// `O(log n)`.
#[derive(Clone, Debug, Default)]
pub struct HashRing {
    points: BTreeMap<u64, NodeDesc>,
    nodes: HashSet<NodeDesc>,
}

impl HashRing {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node's points to the ring. Inserting a node twice is a no-op.
    pub fn insert(&mut self, node: NodeDesc) {
        if !self.nodes.insert(node) {
            return;
        }
        for replica in 0..RING_REPLICAS {
            // First owner wins on (astronomically unlikely) point collisions,
            // so that removing a node restores the exact prior ring.
            self.points.entry(point(node, replica)).or_insert(node);
        }
    }

    /// Removes a node's points from the ring.
    pub fn remove(&mut self, node: &NodeDesc) {
        if !self.nodes.remove(node) {
            return;
        }
        for replica in 0..RING_REPLICAS {
            let hash = point(*node, replica);
            if self.points.get(&hash) == Some(node) {
                self.points.remove(&hash);
            }
        }
    }

    /// The node owning `id`: the clockwise successor of the id's point,
    /// wrapping at the top of the ring. `None` only for an empty ring.
    #[must_use]
    pub fn lookup(&self, id: ActorId) -> Option<NodeDesc> {
        let hash = fxhash::hash64(&id.0);
        self.points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, node)| *node)
    }

    #[must_use]
    pub fn contains(&self, node: &NodeDesc) -> bool {
        self.nodes.contains(node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The nodes currently on the ring, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDesc> {
        self.nodes.iter()
    }
}

fn point(node: NodeDesc, replica: u32) -> u64 {
    fxhash::hash64(&(node.identity(), replica))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    fn node(i: u16) -> NodeDesc {
        NodeDesc::localhost(4000 + i)
    }

    #[test]
    fn empty_ring_has_no_owner() {
        assert_eq!(HashRing::new().lookup(ActorId(42)), None);
    }

    #[test]
    fn single_node_owns_everything() {
        let mut ring = HashRing::new();
        ring.insert(node(0));
        for key in 0..1000u64 {
            assert_eq!(ring.lookup(ActorId(key)), Some(node(0)));
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut ring = HashRing::new();
        ring.insert(node(0));
        let before = ring.clone();
        ring.insert(node(0));
        assert_eq!(before.points, ring.points);
    }

    #[test]
    fn lookup_agrees_across_insertion_orders() {
        let mut forward = HashRing::new();
        let mut backward = HashRing::new();
        for i in 0..5 {
            forward.insert(node(i));
        }
        for i in (0..5).rev() {
            backward.insert(node(i));
        }
        for key in 0..2000u64 {
            assert_eq!(forward.lookup(ActorId(key)), backward.lookup(ActorId(key)));
        }
    }

    #[test]
    fn adding_a_node_only_moves_keys_onto_it() {
        let mut ring = HashRing::new();
        for i in 0..4 {
            ring.insert(node(i));
        }
        let before: Vec<_> = (0..5000u64).map(|k| ring.lookup(ActorId(k)).unwrap()).collect();

        ring.insert(node(4));
        let mut moved = 0;
        for (key, owner) in before.iter().enumerate() {
            let now = ring.lookup(ActorId(key as u64)).unwrap();
            if now != *owner {
                assert_eq!(now, node(4));
                moved += 1;
            }
        }
        // Roughly 1/5 of the key space; generous bounds to stay stable.
        assert!(moved > 0, "new node took no keys");
        assert!(moved < 2500, "new node took over half the keys: {moved}");
    }

    quickcheck! {
        fn add_then_remove_restores_every_mapping(keys: Vec<u64>, extra: u16) -> bool {
            let mut ring = HashRing::new();
            for i in 0..3 {
                ring.insert(node(i));
            }
            let before: Vec<_> = keys.iter().map(|k| ring.lookup(ActorId(*k))).collect();

            let transient = node(1000 + extra % 1000);
            ring.insert(transient);
            ring.remove(&transient);

            let after: Vec<_> = keys.iter().map(|k| ring.lookup(ActorId(*k))).collect();
            before == after
        }
    }
}
