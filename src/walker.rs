//! Depth-first traversal primitives (`spec.md` §4.7): the foundation for
//! dump, duplicate, filter, reindex, and index-build.

use crate::escape;
use crate::index::PathIndex;
use crate::node::{NodeFlags, NodeId, NodeType};
use crate::query;
use crate::store::NodeStore;

/// Depth-first preorder walk. `callback` receives the node and the feedback
/// its parent produced (the walk's own root receives `init_feedback`) and
/// returns the feedback to thread to its children. Returns the node that
/// asked to stop, if any, via `*stop = true`.
pub fn walk<FB, F>(store: &NodeStore, start: NodeId, init_feedback: FB, callback: &mut F) -> Option<NodeId>
where
    FB: Clone,
    F: FnMut(&NodeStore, NodeId, &FB, &mut bool) -> FB,
{
    let mut stop = false;
    walk_rec(store, start, init_feedback, callback, &mut stop)
}

fn walk_rec<FB, F>(
    store: &NodeStore,
    node: NodeId,
    feedback: FB,
    callback: &mut F,
    stop: &mut bool,
) -> Option<NodeId>
where
    FB: Clone,
    F: FnMut(&NodeStore, NodeId, &FB, &mut bool) -> FB,
{
    let next_feedback = callback(store, node, &feedback, stop);
    if *stop {
        return Some(node);
    }
    for child in store.children(node) {
        if let Some(hit) = walk_rec(store, child, next_feedback.clone(), callback, stop) {
            return Some(hit);
        }
        if *stop {
            return None;
        }
    }
    None
}

/// Path-threaded walk: before invoking `callback`, builds the node's path
/// (escaped if `escape` is set) and passes it alongside.
pub fn path_walk<F>(store: &NodeStore, start: NodeId, escape_path: bool, callback: &mut F)
where
    F: FnMut(&NodeStore, NodeId, &[u8]),
{
    fn rec<F: FnMut(&NodeStore, NodeId, &[u8])>(
        store: &NodeStore,
        node: NodeId,
        escape_path: bool,
        callback: &mut F,
    ) {
        let path = if escape_path {
            query::get_escaped_path(store, node)
        } else {
            query::get_path(store, node)
        };
        callback(store, node, &path);
        for child in store.children(node) {
            rec(store, child, escape_path, callback);
        }
    }
    rec(store, start, escape_path, callback);
}

/// Returns every node under `start` (inclusive) for which `predicate`
/// returns `true`, in preorder. The "filter/accept" counterpart to
/// [`walk`]'s early-termination "stop" (`spec.md` §4.7).
pub fn filter<F>(store: &NodeStore, start: NodeId, predicate: &mut F) -> Vec<NodeId>
where
    F: FnMut(&NodeStore, NodeId) -> bool,
{
    let mut out = Vec::new();
    filter_rec(store, start, predicate, &mut out);
    out
}

fn filter_rec<F: FnMut(&NodeStore, NodeId) -> bool>(
    store: &NodeStore,
    node: NodeId,
    predicate: &mut F,
    out: &mut Vec<NodeId>,
) {
    if predicate(store, node) {
        out.push(node);
    }
    for child in store.children(node) {
        filter_rec(store, child, predicate, out);
    }
}

/// Path-threaded filter: same as [`filter`], but `predicate` also receives
/// each node's path.
pub fn path_filter<F>(store: &NodeStore, start: NodeId, escape_path: bool, predicate: &mut F) -> Vec<NodeId>
where
    F: FnMut(&NodeStore, NodeId, &[u8]) -> bool,
{
    let mut out = Vec::new();
    path_walk(store, start, escape_path, &mut |store, node, path| {
        if predicate(store, node, path) {
            out.push(node);
        }
    });
    out
}

/// Indexes every non-`INDEXED` node under `start` (a plain walk calling
/// `put`). Used to switch a dictionary from unindexed to indexed.
pub fn build_index(store: &mut NodeStore, index: &mut PathIndex, start: NodeId) {
    let all = filter(store, start, &mut |store, node| !store.get(node).is_indexed());
    for id in all {
        index.put(store, id);
    }
}

/// Reindexes every node under `start` (delete-then-put), used after a
/// structural change that left hashes stale.
pub fn reindex(store: &mut NodeStore, index: &mut PathIndex, start: NodeId) {
    let all = filter(store, start, &mut |store, node| store.get(node).is_indexed());
    for id in &all {
        index.delete(store, *id);
    }
    for id in all {
        index.put(store, id);
    }
}

/// Deep-copies `src` (and all its descendants, in order) as a new child of
/// `new_parent`, optionally renaming the copy. Inheritable flags are not
/// copied directly -- they re-derive from the copy's new ancestry
/// (`spec.md` §4.3 Copy).
pub fn copy_node(
    store: &mut NodeStore,
    mut index: Option<&mut PathIndex>,
    src: NodeId,
    new_parent: NodeId,
    new_name: Option<Vec<u8>>,
) -> NodeId {
    let (node_type, value, self_flags) = {
        let n = store.get(src);
        (n.node_type, n.value.as_ref().map(|v| v.to_vec()), n.flags.self_only())
    };
    let name = new_name.unwrap_or_else(|| store.get(src).name.to_vec());
    let id = store.create_node(new_parent, node_type, name, value, self_flags);
    if let Some(idx) = index.as_deref_mut() {
        idx.put(store, id);
    }
    for child in store.children(src) {
        copy_node(store, index.as_deref_mut(), child, id, None);
    }
    id
}

fn format_name(store: &NodeStore, id: NodeId) -> Vec<u8> {
    let n = store.get(id);
    if n.flags.contains(NodeFlags::QUOTED_NAME) {
        let mut out = vec![b'"'];
        out.extend(escape::escape_into(&n.name, b'"'));
        out.push(b'"');
        out
    } else {
        n.name.to_vec()
    }
}

fn format_value(store: &NodeStore, id: NodeId) -> Option<Vec<u8>> {
    let n = store.get(id);
    let value = n.value.as_ref()?;
    if n.flags.contains(NodeFlags::QUOTED_VALUE) {
        let mut out = vec![b'"'];
        out.extend(escape::escape_into(value, b'"'));
        out.push(b'"');
        Some(out)
    } else {
        Some(value.to_vec())
    }
}

fn is_inactive_root(store: &NodeStore, id: NodeId) -> bool {
    store.get(id).flags.contains(NodeFlags::INACTIVE)
}

/// Pretty-prints the dictionary rooted at `root` (typically `NodeId::ROOT`)
/// to a sink. The exact whitespace is free per `spec.md` §4.8; this
/// implementation fixes one round-tripping choice: one statement per line,
/// two-space indents, and the compact `a b c value;` form for an `INSTANCE`
/// whose only child is a `BRANCH` with exactly one `LEAF` child.
pub fn dump(store: &NodeStore, root: NodeId, out: &mut String) {
    for child in store.children(root) {
        dump_statement(store, child, 0, out);
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn dump_statement(store: &NodeStore, id: NodeId, depth: usize, out: &mut String) {
    push_indent(out, depth);
    if is_inactive_root(store, id) {
        out.push_str("inactive: ");
    }
    let n = store.get(id);
    match n.node_type {
        NodeType::Root => unreachable!("root is never dumped as a statement"),
        NodeType::Leaf => {
            out.push_str(&String::from_utf8_lossy(&format_name(store, id)));
            if let Some(v) = format_value(store, id) {
                out.push(' ');
                out.push_str(&String::from_utf8_lossy(&v));
            }
            out.push_str(";\n");
        }
        NodeType::Branch => {
            out.push_str(&String::from_utf8_lossy(&format_name(store, id)));
            out.push_str(" {\n");
            for child in store.children(id) {
                dump_statement(store, child, depth + 1, out);
            }
            push_indent(out, depth);
            out.push_str("}\n");
        }
        NodeType::Array => {
            out.push_str(&String::from_utf8_lossy(&format_name(store, id)));
            let children = store.children(id);
            let all_simple_leaves = children
                .iter()
                .all(|c| store.get(*c).node_type == NodeType::Leaf);
            if all_simple_leaves {
                out.push_str(" [ ");
                for c in &children {
                    if let Some(v) = format_value(store, *c) {
                        out.push_str(&String::from_utf8_lossy(&v));
                        out.push(' ');
                    }
                }
                out.push_str("];\n");
            } else {
                out.push_str(" [\n");
                for c in &children {
                    dump_array_item(store, *c, depth + 1, out);
                }
                push_indent(out, depth);
                out.push_str("];\n");
            }
        }
        NodeType::Instance => {
            let children = store.children(id);
            if children.len() == 1 && store.get(children[0]).node_type == NodeType::Branch {
                let branch = children[0];
                let bchildren = store.children(branch);
                if bchildren.len() == 1 && store.get(bchildren[0]).node_type == NodeType::Leaf {
                    let leaf = bchildren[0];
                    out.push_str(&String::from_utf8_lossy(&format_name(store, id)));
                    out.push(' ');
                    out.push_str(&String::from_utf8_lossy(&format_name(store, branch)));
                    out.push(' ');
                    out.push_str(&String::from_utf8_lossy(&format_name(store, leaf)));
                    if let Some(v) = format_value(store, leaf) {
                        out.push(' ');
                        out.push_str(&String::from_utf8_lossy(&v));
                    }
                    out.push_str(";\n");
                    return;
                }
            }
            out.push_str(&String::from_utf8_lossy(&format_name(store, id)));
            out.push_str(" {\n");
            for child in children {
                dump_statement(store, child, depth + 1, out);
            }
            push_indent(out, depth);
            out.push_str("}\n");
        }
    }
}

fn dump_array_item(store: &NodeStore, id: NodeId, depth: usize, out: &mut String) {
    push_indent(out, depth);
    let n = store.get(id);
    match n.node_type {
        NodeType::Leaf => {
            if let Some(v) = format_value(store, id) {
                out.push_str(&String::from_utf8_lossy(&v));
            }
            out.push_str(";\n");
        }
        NodeType::Branch | NodeType::Instance => {
            out.push_str("{\n");
            for child in store.children(id) {
                dump_statement(store, child, depth + 1, out);
            }
            push_indent(out, depth);
            out.push_str("};\n");
        }
        NodeType::Array => {
            out.push_str("[\n");
            for child in store.children(id) {
                dump_array_item(store, child, depth + 1, out);
            }
            push_indent(out, depth);
            out.push_str("];\n");
        }
        NodeType::Root => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn parse_and_dump(src: &str) -> String {
        let mut store = NodeStore::new();
        Parser::new(src.as_bytes(), &mut store, None).run().unwrap();
        let mut out = String::new();
        dump(&store, NodeId::ROOT, &mut out);
        out
    }

    #[test]
    fn dump_then_reparse_is_fixed_point() {
        let src = "cars { car bob { doors 3; } }";
        let dumped = parse_and_dump(src);

        let mut store2 = NodeStore::new();
        Parser::new(dumped.as_bytes(), &mut store2, None).run().unwrap();
        let dumped_again = {
            let mut out = String::new();
            dump(&store2, NodeId::ROOT, &mut out);
            out
        };
        assert_eq!(dumped, dumped_again);
    }

    #[test]
    fn copy_node_preserves_child_order() {
        let mut store = NodeStore::new();
        Parser::new(b"cars { car bob { doors 3; } }", &mut store, None)
            .run()
            .unwrap();
        let cars = store.children(NodeId::ROOT)[0];
        let copy = copy_node(&mut store, None, cars, NodeId::ROOT, Some(b"cars2".to_vec()));
        assert_eq!(store.get(copy).name.as_ref(), b"cars2");
        let orig_children: Vec<_> = store
            .children(cars)
            .iter()
            .map(|c| store.get(*c).name.to_vec())
            .collect();
        let copy_children: Vec<_> = store
            .children(copy)
            .iter()
            .map(|c| store.get(*c).name.to_vec())
            .collect();
        assert_eq!(orig_children, copy_children);
    }

    #[test]
    fn filter_collects_leaves() {
        let mut store = NodeStore::new();
        Parser::new(b"a 1; b 2; c { d 3; }", &mut store, None)
            .run()
            .unwrap();
        let leaves = filter(&store, NodeId::ROOT, &mut |store, n| {
            store.get(n).node_type == NodeType::Leaf
        });
        assert_eq!(leaves.len(), 3);
    }
}
