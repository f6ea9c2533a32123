//! [`NodeStore`]: the arena that owns every [`Node`] in a dictionary.
//!
//! Nodes are addressed by stable [`NodeId`] handles into a `Vec` of slots
//! with a free list, rather than through raw pointers or an intrusive
//! ownership graph -- the arena-of-nodes-with-stable-indices approach
//! `spec.md` §9 calls out as the idiomatic target-language rendering of the
//! source's macro-embedded doubly-linked lists. Parent/child/sibling links
//! live as `NodeId`s inside `Node` itself, giving O(1) append and O(1)
//! unlink given a handle.

use crate::hash::{self, ROOT_HASH};
use crate::index::PathIndex;
use crate::node::{Node, NodeFlags, NodeId, NodeType};

enum Slot {
    Occupied(Node),
    Free(Option<NodeId>),
}

pub struct NodeStore {
    slots: Vec<Slot>,
    free_head: Option<NodeId>,
}

impl NodeStore {
    /// Creates a store with its unique, permanent root already allocated at
    /// [`NodeId::ROOT`] (`spec.md` §3 invariant 6).
    pub fn new() -> Self {
        let root = Node {
            name: Box::from(&b""[..]),
            value: None,
            node_type: NodeType::Root,
            flags: NodeFlags::empty(),
            hash: ROOT_HASH,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            child_count: 0,
            index_next: None,
        };
        Self {
            slots: vec![Slot::Occupied(root)],
            free_head: None,
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        match &self.slots[id.0] {
            Slot::Occupied(n) => n,
            Slot::Free(_) => panic!("dangling NodeId {id}"),
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        match &mut self.slots[id.0] {
            Slot::Occupied(n) => n,
            Slot::Free(_) => panic!("dangling NodeId {id}"),
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.slots.len() && matches!(self.slots[id.0], Slot::Occupied(_))
    }

    /// Ordered children of `parent`, following the sibling chain.
    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.get(parent).child_count);
        let mut cur = self.get(parent).first_child;
        while let Some(id) = cur {
            out.push(id);
            cur = self.get(id).next_sibling;
        }
        out
    }

    pub fn nth_child(&self, parent: NodeId, ordinal: usize) -> Option<NodeId> {
        let mut cur = self.get(parent).first_child;
        let mut i = 0;
        while let Some(id) = cur {
            if i == ordinal {
                return Some(id);
            }
            i += 1;
            cur = self.get(id).next_sibling;
        }
        None
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free_head {
            let next_free = match &self.slots[id.0] {
                Slot::Free(next) => *next,
                Slot::Occupied(_) => unreachable!(),
            };
            self.free_head = next_free;
            self.slots[id.0] = Slot::Occupied(node);
            id
        } else {
            let id = NodeId(self.slots.len());
            self.slots.push(Slot::Occupied(node));
            id
        }
    }

    /// Appends `child` to `parent`'s children list. O(1).
    fn link_child(&mut self, parent: NodeId, child: NodeId) {
        let prev_tail = self.get(parent).last_child;
        if let Some(tail) = prev_tail {
            self.get_mut(tail).next_sibling = Some(child);
        } else {
            self.get_mut(parent).first_child = Some(child);
        }
        self.get_mut(parent).last_child = Some(child);
        self.get_mut(child).prev_sibling = prev_tail;
        self.get_mut(child).next_sibling = None;
        self.get_mut(child).parent = Some(parent);
        self.get_mut(parent).child_count += 1;
    }

    /// Removes `child` from its current parent's children list. O(1).
    fn unlink_child(&mut self, child: NodeId) {
        let (parent, prev, next) = {
            let n = self.get(child);
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        let Some(parent) = parent else { return };
        match prev {
            Some(p) => self.get_mut(p).next_sibling = next,
            None => self.get_mut(parent).first_child = next,
        }
        match next {
            Some(n) => self.get_mut(n).prev_sibling = prev,
            None => self.get_mut(parent).last_child = prev,
        }
        self.get_mut(parent).child_count -= 1;
        let child_node = self.get_mut(child);
        child_node.prev_sibling = None;
        child_node.next_sibling = None;
        child_node.parent = None;
    }

    /// Creates a node under `parent`, computing its hash and inherited flags
    /// (`spec.md` §3, §4.3).
    pub fn create_node(
        &mut self,
        parent: NodeId,
        node_type: NodeType,
        name: Vec<u8>,
        value: Option<Vec<u8>>,
        self_flags: NodeFlags,
    ) -> NodeId {
        let parent_node = self.get(parent);
        let inherited = parent_node.flags.child_inherited();
        let hash = hash::mix(hash::h32(&name), parent_node.hash, name.len());

        let node = Node {
            name: name.into_boxed_slice(),
            value: value.map(|v| v.into_boxed_slice()),
            node_type,
            flags: self_flags | inherited,
            hash,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            child_count: 0,
            index_next: None,
        };
        let id = self.alloc(node);
        self.link_child(parent, id);
        id
    }

    /// Depth-first delete of `id` and all its descendants. Unlinks from the
    /// parent, removes from `index` if present, frees the subtree's storage.
    /// Refuses to delete the root.
    pub fn delete_node(&mut self, id: NodeId, index: Option<&mut PathIndex>) -> bool {
        if id == NodeId::ROOT {
            return false;
        }
        self.unlink_child(id);
        if let Some(idx) = index {
            self.delete_subtree(id, Some(idx));
        } else {
            self.delete_subtree(id, None);
        }
        true
    }

    fn delete_subtree(&mut self, id: NodeId, mut index: Option<&mut PathIndex>) {
        let children = self.children(id);
        for child in children {
            self.delete_subtree(child, index.as_deref_mut());
        }
        if let Some(idx) = index {
            if self.get(id).is_indexed() {
                idx.delete(self, id);
            }
        }
        self.free(id);
    }

    fn free(&mut self, id: NodeId) {
        self.slots[id.0] = Slot::Free(self.free_head);
        self.free_head = Some(id);
    }

    /// Renames a non-array node, recomputing its hash and, if it changed,
    /// the hash of every descendant, reindexing each in `index` if present.
    /// Returns `false` (no-op) for array children, per `spec.md` §3 invariant 2.
    pub fn rename_node(
        &mut self,
        id: NodeId,
        new_name: Vec<u8>,
        quoted: bool,
        index: Option<&mut PathIndex>,
    ) -> bool {
        if let Some(parent) = self.get(id).parent {
            if self.get(parent).node_type == NodeType::Array {
                return false;
            }
        }
        let parent_hash = self
            .get(id)
            .parent
            .map(|p| self.get(p).hash)
            .unwrap_or(ROOT_HASH);
        let new_hash = hash::mix(hash::h32(&new_name), parent_hash, new_name.len());
        let old_hash = self.get(id).hash;

        let node = self.get_mut(id);
        node.name = new_name.into_boxed_slice();
        if quoted {
            node.flags.set(NodeFlags::QUOTED_NAME);
        } else {
            node.flags.unset(NodeFlags::QUOTED_NAME);
        }
        node.hash = new_hash;

        if old_hash != new_hash {
            self.rehash_subtree(id, index);
        }
        true
    }

    /// Moves `id` under `new_parent`, optionally renaming it in the same
    /// step. Degenerates to a rename if `new_parent` is the current parent.
    pub fn move_node(
        &mut self,
        id: NodeId,
        new_parent: NodeId,
        new_name: Option<Vec<u8>>,
        mut index: Option<&mut PathIndex>,
    ) -> bool {
        if id == NodeId::ROOT {
            return false;
        }
        let current_parent = self.get(id).parent;
        if current_parent != Some(new_parent) {
            self.unlink_child(id);
            self.link_child(new_parent, id);
        }
        if let Some(name) = new_name {
            let quoted = self.get(id).flags.contains(NodeFlags::QUOTED_NAME);
            self.rename_node(id, name, quoted, index.as_deref_mut());
        } else {
            self.rehash_subtree(id, index);
        }
        true
    }

    /// Recomputes `id`'s hash from its (possibly new) parent and name, then
    /// recurses into every descendant, reindexing each as it goes.
    fn rehash_subtree(&mut self, id: NodeId, mut index: Option<&mut PathIndex>) {
        let was_indexed = self.get(id).is_indexed();
        if was_indexed {
            if let Some(idx) = index.as_deref_mut() {
                idx.delete(self, id);
            }
        }
        let parent_hash = self
            .get(id)
            .parent
            .map(|p| self.get(p).hash)
            .unwrap_or(ROOT_HASH);
        let name = self.get(id).name.to_vec();
        let new_hash = hash::mix(hash::h32(&name), parent_hash, name.len());
        self.get_mut(id).hash = new_hash;
        if was_indexed {
            if let Some(idx) = index.as_deref_mut() {
                idx.put(self, id);
            }
        }
        for child in self.children(id) {
            self.rehash_subtree(child, index.as_deref_mut());
        }
    }

    /// Renumbers an `Array` node's children to base-10 ordinals after a
    /// structural change (insert/delete among array members). Bypasses
    /// `rename_node`'s array-child no-op guard, which exists to keep callers
    /// from renaming array children directly -- this is the one legitimate
    /// internal case that must.
    pub fn renumber_array(&mut self, array: NodeId, mut index: Option<&mut PathIndex>) {
        for (i, child) in self.children(array).into_iter().enumerate() {
            let ordinal = i.to_string().into_bytes();
            if self.get(child).name.as_ref() == ordinal.as_slice() {
                continue;
            }
            self.get_mut(child).name = ordinal.into_boxed_slice();
            self.rehash_subtree(child, index.as_deref_mut());
        }
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}
