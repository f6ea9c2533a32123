//! [`PathIndex`]: a content-addressed index from compound path hash to a
//! collision chain of nodes (`spec.md` §4.5).
//!
//! The backing map is a plain `HashMap<u32, NodeId>` holding each bucket's
//! chain head; `spec.md` §9 notes the source's red-black tree is an
//! implementation detail, not a contract -- any `Map<u32, NodeChain>`
//! suffices, and a hash map is the faster choice here. Collision chains
//! themselves are threaded through `Node::index_next`, never owned by the
//! index.

use crate::node::{NodeFlags, NodeId};
use crate::store::NodeStore;
use std::collections::HashMap;

#[derive(Default)]
pub struct PathIndex {
    buckets: HashMap<u32, NodeId>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` to the bucket for its current hash and sets `INDEXED`.
    pub fn put(&mut self, store: &mut NodeStore, node: NodeId) {
        let hash = store.get(node).hash;
        match self.buckets.get(&hash) {
            None => {
                self.buckets.insert(hash, node);
            }
            Some(&head) => {
                let mut tail = head;
                while let Some(next) = store.get(tail).index_next {
                    tail = next;
                }
                store.get_mut(tail).index_next = Some(node);
            }
        }
        store.get_mut(node).index_next = None;
        store.get_mut(node).flags.set(NodeFlags::INDEXED);
    }

    /// Unlinks `node` from its chain. The bucket may remain present with no
    /// members; the backing map need not shrink (`spec.md` §4.5).
    pub fn delete(&mut self, store: &mut NodeStore, node: NodeId) {
        let hash = store.get(node).hash;
        if let Some(&head) = self.buckets.get(&hash) {
            if head == node {
                let next = store.get(node).index_next;
                match next {
                    Some(n) => {
                        self.buckets.insert(hash, n);
                    }
                    None => {
                        self.buckets.remove(&hash);
                    }
                }
            } else {
                let mut prev = head;
                loop {
                    let next = store.get(prev).index_next;
                    match next {
                        Some(n) if n == node => {
                            let after = store.get(node).index_next;
                            store.get_mut(prev).index_next = after;
                            break;
                        }
                        Some(n) => prev = n,
                        None => break,
                    }
                }
            }
        }
        store.get_mut(node).index_next = None;
        store.get_mut(node).flags.unset(NodeFlags::INDEXED);
    }

    /// Returns the chain head for `hash`, if any.
    pub fn get(&self, hash: u32) -> Option<NodeId> {
        self.buckets.get(&hash).copied()
    }

    /// Iterates the full chain for `hash`.
    pub fn chain(&self, store: &NodeStore, hash: u32) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.get(hash);
        while let Some(id) = cur {
            out.push(id);
            cur = store.get(id).index_next;
        }
        out
    }

    /// Cheap child probe: computes the would-be hash of `name` under
    /// `parent` and walks the chain looking for a byte-exact match whose
    /// `parent` link agrees, per `spec.md` §4.5.
    pub fn get_child(&self, store: &NodeStore, parent: NodeId, name: &[u8]) -> Option<NodeId> {
        let parent_hash = store.get(parent).hash;
        let child_hash = crate::hash::mix(crate::hash::h32(name), parent_hash, name.len());
        let mut cur = self.get(child_hash);
        while let Some(id) = cur {
            let n = store.get(id);
            if n.parent == Some(parent) && n.name.as_ref() == name {
                return Some(id);
            }
            cur = n.index_next;
        }
        None
    }
}

/// Naive child lookup for an unindexed dictionary: a two-ended scan over
/// `parent`'s children, alternating from the head and the tail, computing
/// each candidate's hash for a short-circuit comparison before falling back
/// to the byte compare (`spec.md` §4.5).
pub fn find_child_naive(store: &NodeStore, parent: NodeId, name: &[u8]) -> Option<NodeId> {
    let parent_hash = store.get(parent).hash;
    let want_hash = crate::hash::mix(crate::hash::h32(name), parent_hash, name.len());

    let mut front = store.get(parent).first_child;
    let mut back = store.get(parent).last_child;
    let mut seen = std::collections::HashSet::new();
    loop {
        if let Some(id) = front {
            if seen.contains(&id) {
                break;
            }
            seen.insert(id);
            let n = store.get(id);
            if n.hash == want_hash && n.name.as_ref() == name {
                return Some(id);
            }
            front = n.next_sibling;
        }
        if front.is_none() && back.is_none() {
            break;
        }
        if let Some(id) = back {
            if seen.contains(&id) {
                break;
            }
            seen.insert(id);
            let n = store.get(id);
            if n.hash == want_hash && n.name.as_ref() == name {
                return Some(id);
            }
            back = n.prev_sibling;
        }
        if front.is_none() && back.is_none() {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    #[test]
    fn put_then_get_child_round_trips() {
        let mut store = NodeStore::new();
        let a = store.create_node(
            NodeId::ROOT,
            NodeType::Leaf,
            b"a".to_vec(),
            None,
            NodeFlags::empty(),
        );
        let mut idx = PathIndex::new();
        idx.put(&mut store, a);
        assert_eq!(idx.get_child(&store, NodeId::ROOT, b"a"), Some(a));
    }

    #[test]
    fn delete_removes_from_chain() {
        let mut store = NodeStore::new();
        let a = store.create_node(
            NodeId::ROOT,
            NodeType::Leaf,
            b"a".to_vec(),
            None,
            NodeFlags::empty(),
        );
        let mut idx = PathIndex::new();
        idx.put(&mut store, a);
        idx.delete(&mut store, a);
        assert_eq!(idx.get_child(&store, NodeId::ROOT, b"a"), None);
    }

    #[test]
    fn collision_chain_keeps_both_entries() {
        let mut store = NodeStore::new();
        let a = store.create_node(
            NodeId::ROOT,
            NodeType::Leaf,
            b"a".to_vec(),
            None,
            NodeFlags::empty(),
        );
        let b = store.create_node(
            NodeId::ROOT,
            NodeType::Leaf,
            b"b".to_vec(),
            None,
            NodeFlags::empty(),
        );
        // Force a collision by giving `b` the same hash as `a`.
        store.get_mut(b).hash = store.get(a).hash;
        let mut idx = PathIndex::new();
        idx.put(&mut store, a);
        idx.put(&mut store, b);
        let chain = idx.chain(&store, store.get(a).hash);
        assert_eq!(chain, vec![a, b]);
    }

    #[test]
    fn naive_lookup_finds_child_without_index() {
        let mut store = NodeStore::new();
        let a = store.create_node(
            NodeId::ROOT,
            NodeType::Leaf,
            b"a".to_vec(),
            None,
            NodeFlags::empty(),
        );
        assert_eq!(find_child_naive(&store, NodeId::ROOT, b"a"), Some(a));
        assert_eq!(find_child_naive(&store, NodeId::ROOT, b"missing"), None);
    }
}
