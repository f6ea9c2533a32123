//! [`Dictionary`]: the public façade tying the lexer/parser, arena, and
//! optional path index into the single entry point `spec.md` §6 describes.

use std::borrow::Cow;

use crate::error::ParseError;
use crate::escape;
use crate::index::PathIndex;
use crate::node::{Node, NodeFlags, NodeId, NodeType};
use crate::parser::Parser;
use crate::query;
use crate::store::NodeStore;
use crate::walker;

/// Creation-time options (`spec.md` §6.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateFlags(u8);

impl CreateFlags {
    /// Skip building a [`PathIndex`]; lookups fall back to naive descent.
    pub const NOINDEX: CreateFlags = CreateFlags(1 << 0);
    /// Reject structural mutation after parsing (`create_node`, `delete_node`, ...).
    pub const READONLY: CreateFlags = CreateFlags(1 << 1);

    pub const fn empty() -> Self {
        CreateFlags(0)
    }
    pub const fn contains(&self, other: CreateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CreateFlags {
    type Output = CreateFlags;
    fn bitor(self, rhs: CreateFlags) -> CreateFlags {
        CreateFlags(self.0 | rhs.0)
    }
}

/// A parsed configuration tree: an arena of [`Node`]s plus, unless
/// [`CreateFlags::NOINDEX`] was requested, a [`PathIndex`] kept consistent
/// with every structural mutation.
pub struct Dictionary {
    store: NodeStore,
    index: Option<PathIndex>,
    flags: CreateFlags,
}

impl Dictionary {
    /// Creates an empty dictionary (just the root), per `flags`.
    pub fn create(flags: CreateFlags) -> Self {
        let store = NodeStore::new();
        let index = if flags.contains(CreateFlags::NOINDEX) {
            None
        } else {
            Some(PathIndex::new())
        };
        Self { store, index, flags }
    }

    /// Parses `src` into a fresh dictionary. A parse failure still returns
    /// whatever partial tree the parser had built, alongside the error.
    #[allow(clippy::result_large_err)]
    pub fn parse(src: &[u8], flags: CreateFlags) -> Result<Self, (Self, ParseError)> {
        let mut dict = Self::create(flags);
        let result = {
            let parser = Parser::new(src, &mut dict.store, dict.index.as_mut());
            parser.run()
        };
        match result {
            Ok(()) => Ok(dict),
            Err(e) => Err((dict, e)),
        }
    }

    /// Like [`Dictionary::parse`], but opts into step-by-step tracing of lex
    /// events and arity decisions as they're made, printed to stdout.
    #[allow(clippy::result_large_err)]
    pub fn parse_traced(
        src: &[u8],
        flags: CreateFlags,
        trace: crate::trace::Trace<&'static str>,
    ) -> Result<Self, (Self, ParseError)> {
        let mut dict = Self::create(flags);
        let result = {
            let parser = Parser::new(src, &mut dict.store, dict.index.as_mut());
            parser
                .set_trace(trace)
                .expect("trace is unset on a freshly constructed parser");
            parser.run()
        };
        match result {
            Ok(()) => Ok(dict),
            Err(e) => Err((dict, e)),
        }
    }

    fn require_writable(&self) -> Result<(), &'static str> {
        if self.flags.contains(CreateFlags::READONLY) {
            Err("dictionary is read-only")
        } else {
            Ok(())
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.store.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.store.contains(id)
    }

    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        self.store.children(parent)
    }

    pub fn nth_child(&self, parent: NodeId, ordinal: usize) -> Option<NodeId> {
        self.store.nth_child(parent, ordinal)
    }

    pub fn get_child(&self, parent: NodeId, name: &[u8]) -> Option<NodeId> {
        match &self.index {
            Some(idx) => idx.get_child(&self.store, parent, name),
            None => crate::index::find_child_naive(&self.store, parent, name),
        }
    }

    pub fn get_children(&self, parent: NodeId, name: &[u8]) -> Vec<NodeId> {
        self.store
            .children(parent)
            .into_iter()
            .filter(|c| self.store.get(*c).name.as_ref() == name)
            .collect()
    }

    /// Resolves a `/`-separated path relative to `from` (or from the root,
    /// if absolute).
    pub fn get(&self, from: NodeId, path: &[u8]) -> Option<NodeId> {
        query::resolve(&self.store, self.index.as_ref(), from, path)
    }

    pub fn get_path(&self, id: NodeId) -> Vec<u8> {
        query::get_path(&self.store, id)
    }

    pub fn get_escaped_path(&self, id: NodeId) -> Vec<u8> {
        query::get_escaped_path(&self.store, id)
    }

    pub fn escape_str(src: &[u8], quote: u8) -> Vec<u8> {
        escape::escape_into(src, quote)
    }

    pub fn unescape_str(src: &mut [u8]) -> usize {
        escape::unescape_in_place(src)
    }

    pub fn value(&self, id: NodeId) -> Option<&[u8]> {
        self.store.get(id).value.as_deref()
    }

    pub fn create_node(
        &mut self,
        parent: NodeId,
        node_type: NodeType,
        name: Vec<u8>,
        value: Option<Vec<u8>>,
        flags: NodeFlags,
    ) -> Result<NodeId, &'static str> {
        self.require_writable()?;
        let id = self.store.create_node(parent, node_type, name, value, flags);
        if let Some(idx) = self.index.as_mut() {
            idx.put(&mut self.store, id);
        }
        if self.store.get(parent).node_type == NodeType::Array {
            self.store.renumber_array(parent, self.index.as_mut());
        }
        Ok(id)
    }

    pub fn delete_node(&mut self, id: NodeId) -> Result<bool, &'static str> {
        self.require_writable()?;
        let parent = self.store.get(id).parent;
        let deleted = self.store.delete_node(id, self.index.as_mut());
        if deleted {
            if let Some(p) = parent {
                if self.store.get(p).node_type == NodeType::Array {
                    self.store.renumber_array(p, self.index.as_mut());
                }
            }
        }
        Ok(deleted)
    }

    pub fn rename_node(&mut self, id: NodeId, new_name: Vec<u8>, quoted: bool) -> Result<bool, &'static str> {
        self.require_writable()?;
        Ok(self.store.rename_node(id, new_name, quoted, self.index.as_mut()))
    }

    pub fn move_node(
        &mut self,
        id: NodeId,
        new_parent: NodeId,
        new_name: Option<Vec<u8>>,
    ) -> Result<bool, &'static str> {
        self.require_writable()?;
        Ok(self.store.move_node(id, new_parent, new_name, self.index.as_mut()))
    }

    /// Deep-copies `src` as a new child of `new_parent` (`spec.md` §4.3 Copy).
    pub fn copy_node(
        &mut self,
        src: NodeId,
        new_parent: NodeId,
        new_name: Option<Vec<u8>>,
    ) -> Result<NodeId, &'static str> {
        self.require_writable()?;
        Ok(walker::copy_node(
            &mut self.store,
            self.index.as_mut(),
            src,
            new_parent,
            new_name,
        ))
    }

    /// Copies every child of `src` as new children of `new_parent`, without
    /// copying `src` itself (the "duplicate contents" form of §4.3).
    pub fn duplicate(&mut self, src: NodeId, new_parent: NodeId) -> Result<Vec<NodeId>, &'static str> {
        self.require_writable()?;
        let children = self.store.children(src);
        Ok(children
            .into_iter()
            .map(|c| walker::copy_node(&mut self.store, self.index.as_mut(), c, new_parent, None))
            .collect())
    }

    pub fn walk<FB, F>(&self, start: NodeId, init_feedback: FB, callback: &mut F) -> Option<NodeId>
    where
        FB: Clone,
        F: FnMut(&NodeStore, NodeId, &FB, &mut bool) -> FB,
    {
        walker::walk(&self.store, start, init_feedback, callback)
    }

    pub fn path_walk<F>(&self, start: NodeId, escape_path: bool, callback: &mut F)
    where
        F: FnMut(&NodeStore, NodeId, &[u8]),
    {
        walker::path_walk(&self.store, start, escape_path, callback)
    }

    pub fn filter<F>(&self, start: NodeId, predicate: &mut F) -> Vec<NodeId>
    where
        F: FnMut(&NodeStore, NodeId) -> bool,
    {
        walker::filter(&self.store, start, predicate)
    }

    pub fn path_filter<F>(&self, start: NodeId, escape_path: bool, predicate: &mut F) -> Vec<NodeId>
    where
        F: FnMut(&NodeStore, NodeId, &[u8]) -> bool,
    {
        walker::path_filter(&self.store, start, escape_path, predicate)
    }

    /// Builds (or replaces) this dictionary's index, if it didn't already
    /// have one.
    pub fn index(&mut self) {
        if self.index.is_none() {
            self.index = Some(PathIndex::new());
        }
        let idx = self.index.as_mut().unwrap();
        walker::build_index(&mut self.store, idx, NodeId::ROOT);
    }

    /// Rebuilds the index from scratch, e.g. after a batch of moves.
    pub fn reindex(&mut self) {
        if let Some(idx) = self.index.as_mut() {
            walker::reindex(&mut self.store, idx, NodeId::ROOT);
        } else {
            self.index();
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Pretty-prints the whole dictionary (`spec.md` §4.8).
    pub fn dump(&self) -> String {
        let mut out = String::new();
        walker::dump(&self.store, NodeId::ROOT, &mut out);
        out
    }

    /// Pretty-prints the subtree rooted at `id`, as a standalone document.
    pub fn dump_node(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.store.children(id) {
            walker::dump(&self.store, child, &mut out);
        }
        out
    }

    /// Prints an interactive tree to stdout via `ptree`, the way the original
    /// AST node type does.
    pub fn print_tree(&self, start: NodeId) -> std::io::Result<()> {
        ptree::print_tree(&NodeView { store: &self.store, id: start })
    }
}

/// Borrowing adapter exposing a [`Dictionary`] node as a `ptree::TreeItem`.
struct NodeView<'a> {
    store: &'a NodeStore,
    id: NodeId,
}

impl<'a> Clone for NodeView<'a> {
    fn clone(&self) -> Self {
        NodeView { store: self.store, id: self.id }
    }
}

impl<'a> ptree::TreeItem for NodeView<'a> {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        let node = self.store.get(self.id);
        write!(f, "{}", String::from_utf8_lossy(&node.name))?;
        if let Some(v) = &node.value {
            write!(f, " {}", String::from_utf8_lossy(v))?;
        }
        Ok(())
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::from(
            self.store
                .children(self.id)
                .into_iter()
                .map(|id| NodeView { store: self.store, id })
                .collect::<Vec<_>>(),
        )
    }
}
