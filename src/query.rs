//! Path-based query/resolution (`spec.md` §4.6): tokenizes a `/`-separated,
//! escaped path, computes its compound hash, and either probes the
//! [`PathIndex`] and string-verifies candidates, or performs a naive
//! descent when the dictionary is unindexed.

use crate::hash;
use crate::index::{self, PathIndex};
use crate::node::NodeId;
use crate::store::NodeStore;

/// Splits a query path on unescaped `/`, honoring `\\` and `\/` escapes,
/// and reports whether the path was absolute (led with `/`).
pub fn tokenize(path: &[u8]) -> (bool, Vec<Vec<u8>>) {
    let (absolute, rest) = match path.first() {
        Some(b'/') => (true, &path[1..]),
        _ => (false, path),
    };
    if rest.is_empty() {
        return (absolute, Vec::new());
    }
    let mut segments = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            b'\\' if i + 1 < rest.len() && (rest[i + 1] == b'/' || rest[i + 1] == b'\\') => {
                current.push(rest[i + 1]);
                i += 2;
            }
            b'/' => {
                segments.push(std::mem::take(&mut current));
                i += 1;
            }
            b => {
                current.push(b);
                i += 1;
            }
        }
    }
    segments.push(current);
    (absolute, segments)
}

fn escape_segment(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len());
    for &b in name {
        if b == b'/' || b == b'\\' {
            out.push(b'\\');
        }
        out.push(b);
    }
    out
}

/// Walks `node`'s ancestors up to (not including) `root`'s empty name,
/// returning the raw, unescaped name sequence from top to bottom.
fn ancestor_names(store: &NodeStore, node: NodeId) -> Vec<Vec<u8>> {
    let mut names = Vec::new();
    let mut cur = node;
    while cur != NodeId::ROOT {
        let n = store.get(cur);
        names.push(n.name.to_vec());
        cur = n.parent.unwrap_or(NodeId::ROOT);
    }
    names.reverse();
    names
}

/// `spec.md` `bsGetPath`: the `/`-joined, non-escaped path from root to
/// `node`. Empty for the root itself.
pub fn get_path(store: &NodeStore, node: NodeId) -> Vec<u8> {
    let mut out = Vec::new();
    for name in ancestor_names(store, node) {
        out.push(b'/');
        out.extend(name);
    }
    out
}

/// Same as [`get_path`] but with `/` and `\` escaped inside each segment, so
/// the result round-trips through [`resolve`].
pub fn get_escaped_path(store: &NodeStore, node: NodeId) -> Vec<u8> {
    let mut out = Vec::new();
    for name in ancestor_names(store, node) {
        out.push(b'/');
        out.extend(escape_segment(&name));
    }
    out
}

/// Resolves `path` (absolute if it starts with `/`, else relative to
/// `reference`) against the tree, using `index` when present.
pub fn resolve(
    store: &NodeStore,
    index: Option<&PathIndex>,
    reference: NodeId,
    path: &[u8],
) -> Option<NodeId> {
    let (absolute, segments) = tokenize(path);
    let start = if absolute { NodeId::ROOT } else { reference };
    if segments.is_empty() {
        return Some(start);
    }

    match index {
        Some(idx) => {
            let mut compound = store.get(start).hash;
            for seg in &segments {
                compound = hash::mix(hash::h32(seg), compound, seg.len());
            }
            for candidate in idx.chain(store, compound) {
                if ancestor_names(store, candidate) == relative_names(store, start, &segments) {
                    return Some(candidate);
                }
            }
            None
        }
        None => {
            let mut cur = start;
            for seg in &segments {
                cur = index::find_child_naive(store, cur, seg)?;
            }
            Some(cur)
        }
    }
}

/// Builds the full ancestor-name sequence a match rooted at `start` with the
/// given relative `segments` would have, by prefixing `start`'s own
/// ancestor names.
fn relative_names(store: &NodeStore, start: NodeId, segments: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut names = ancestor_names(store, start);
    names.extend(segments.iter().cloned());
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeFlags, NodeType};
    use crate::parser::Parser;

    fn parse(src: &str) -> (NodeStore, PathIndex) {
        let mut store = NodeStore::new();
        let mut index = PathIndex::new();
        Parser::new(src.as_bytes(), &mut store, Some(&mut index))
            .run()
            .unwrap();
        (store, index)
    }

    #[test]
    fn tokenize_handles_escapes() {
        let (abs, segs) = tokenize(br"a\/b/c");
        assert!(!abs);
        assert_eq!(segs, vec![b"a/b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn resolve_indexed_matches_tree() {
        let (store, index) = parse("cars { car bob { doors 3; } }");
        let found = resolve(&store, Some(&index), NodeId::ROOT, b"/cars/car/bob/doors").unwrap();
        assert_eq!(store.get(found).value.as_deref(), Some(&b"3"[..]));
    }

    #[test]
    fn resolve_unindexed_matches_tree() {
        let mut store = NodeStore::new();
        Parser::new(b"cars { car bob { doors 3; } }", &mut store, None)
            .run()
            .unwrap();
        let found = resolve(&store, None, NodeId::ROOT, b"/cars/car/bob/doors").unwrap();
        assert_eq!(store.get(found).value.as_deref(), Some(&b"3"[..]));
    }

    #[test]
    fn get_path_round_trips_through_resolve() {
        let (store, index) = parse("cars { car bob { doors 3; } }");
        let doors = resolve(&store, Some(&index), NodeId::ROOT, b"/cars/car/bob/doors").unwrap();
        let path = get_path(&store, doors);
        assert_eq!(path, b"/cars/car/bob/doors");
        let again = resolve(&store, Some(&index), NodeId::ROOT, &path).unwrap();
        assert_eq!(again, doors);
    }

    #[test]
    fn escaped_segment_with_slash_round_trips() {
        let mut store = NodeStore::new();
        let mut index = PathIndex::new();
        let id = store.create_node(
            NodeId::ROOT,
            NodeType::Leaf,
            b"a/b".to_vec(),
            None,
            NodeFlags::empty(),
        );
        index.put(&mut store, id);
        let path = get_escaped_path(&store, id);
        assert_eq!(path, br"/a\/b");
        assert_eq!(resolve(&store, Some(&index), NodeId::ROOT, &path), Some(id));
    }
}
