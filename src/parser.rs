//! The parser (`spec.md` §4.2): consumes the [`Lexer`]'s event stream,
//! maintains a token cache and a parent-node stack, applies the
//! arity-based node-creation rules, and emits a fully linked node tree into
//! a [`NodeStore`].

use crate::char_table::CHAR_TABLE;
use crate::error::{ErrorKind, ParseError};
use crate::index::PathIndex;
use crate::lex::{LexEvent, Lexer};
use crate::node::{NodeFlags, NodeId, NodeType};
use crate::store::NodeStore;
use crate::trace::Trace;
use once_cell::unsync::OnceCell;

/// Fixed cap on consecutive identifiers accumulated without a terminator in
/// a non-array context (`spec.md` §7 `TOKENS`, §9 "Token cache").
pub const TOKEN_CACHE_SIZE: usize = 20;

/// Statement-level modifiers: a first-position token ending in `:` that
/// sets an inheritable flag on the statement's resulting node.
const MODIFIERS: &[(&str, NodeFlags)] = &[("inactive", NodeFlags::INACTIVE)];

struct CachedToken {
    data: Vec<u8>,
    quoted: bool,
}

#[derive(Default)]
struct TokenCache {
    tokens: Vec<CachedToken>,
    offset: usize,
}

impl TokenCache {
    fn push(&mut self, data: Vec<u8>, quoted: bool) {
        self.tokens.push(CachedToken { data, quoted });
    }
    fn count(&self) -> usize {
        self.tokens.len()
    }
    fn arity(&self) -> usize {
        self.tokens.len() - self.offset
    }
    fn effective(&self) -> &[CachedToken] {
        &self.tokens[self.offset..]
    }
    fn clear(&mut self) {
        self.tokens.clear();
        self.offset = 0;
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    store: &'a mut NodeStore,
    index: Option<&'a mut PathIndex>,
    head: NodeId,
    stack: Vec<NodeId>,
    cache: TokenCache,
    stmt_flags: NodeFlags,
    trace: OnceCell<Trace<&'static str>>,
}

impl<'a> Parser<'a> {
    pub fn new(buf: &'a [u8], store: &'a mut NodeStore, index: Option<&'a mut PathIndex>) -> Self {
        Self {
            lexer: Lexer::new(buf),
            store,
            index,
            head: NodeId::ROOT,
            stack: Vec::new(),
            cache: TokenCache::default(),
            stmt_flags: NodeFlags::empty(),
            trace: OnceCell::new(),
        }
    }

    /// Opts into step-by-step tracing of arity decisions. May be set at most
    /// once; a second call is rejected, matching the teacher's
    /// `set_log`/`assign_debugger` contract. Also forwarded to the inner
    /// [`Lexer`] so a single call traces both lex events and arity rules.
    pub fn set_trace(&self, trace: Trace<&'static str>) -> Result<(), String> {
        self.lexer.set_trace(trace)?;
        self.trace
            .set(trace)
            .map_err(|t| format!("trace {t} is already set for this parser"))
    }

    fn trace_arity(&self, rule: &str, k: usize) {
        let Some(trace) = self.trace.get() else { return };
        if trace.order() < Trace::Default(()).order() {
            return;
        }
        println!("[{trace}; Arity]: {rule} k={k}");
    }

    pub fn run(mut self) -> Result<(), ParseError> {
        loop {
            let event = self.lexer.next_event()?;
            match event {
                LexEvent::Token(t) => self.on_token(t.data.as_bytes().to_vec(), t.quoted)?,
                LexEvent::EndVal => self.on_endval()?,
                LexEvent::BlockBegin => self.on_block_begin()?,
                LexEvent::BlockEnd => self.on_block_end()?,
                LexEvent::ArrayBegin => self.on_array_begin()?,
                LexEvent::ArrayEnd => self.on_array_end()?,
                LexEvent::Eof => return self.on_eof(),
            }
        }
    }

    fn lex_error(&self, kind: ErrorKind, detail: &'static str) -> ParseError {
        self.lexer.error(kind).with_detail(detail)
    }

    fn on_token(&mut self, data: Vec<u8>, quoted: bool) -> Result<(), ParseError> {
        if self.cache.count() == 0 && !quoted && data.last() == Some(&b':') {
            let word = &data[..data.len() - 1];
            if let Ok(word_str) = std::str::from_utf8(word) {
                if let Some((_, flag)) = MODIFIERS.iter().find(|(m, _)| *m == word_str) {
                    self.cache.push(data, quoted);
                    self.cache.offset = self.cache.count();
                    self.stmt_flags.set(*flag);
                    return Ok(());
                }
            }
        }

        if self.cache.count() == TOKEN_CACHE_SIZE {
            if self.store.get(self.head).node_type == NodeType::Array {
                self.flush_array_batch();
            } else {
                return Err(self.lex_error(ErrorKind::Tokens, "too many consecutive identifiers"));
            }
        }
        self.cache.push(data, quoted);
        Ok(())
    }

    fn flush_array_batch(&mut self) {
        let tokens: Vec<(Vec<u8>, bool)> = self
            .cache
            .effective()
            .iter()
            .map(|t| (t.data.clone(), t.quoted))
            .collect();
        for (data, quoted) in tokens {
            self.create_array_leaf(data, quoted);
        }
        self.cache.clear();
        self.stmt_flags = NodeFlags::empty();
    }

    fn create_array_leaf(&mut self, value: Vec<u8>, quoted: bool) -> NodeId {
        let ordinal = self.store.get(self.head).child_count.to_string().into_bytes();
        let mut flags = self.stmt_flags;
        if quoted {
            flags.set(NodeFlags::QUOTED_VALUE);
        }
        let id = self
            .store
            .create_node(self.head, NodeType::Leaf, ordinal, Some(value), flags);
        if let Some(idx) = self.index.as_deref_mut() {
            idx.put(self.store, id);
        }
        id
    }

    fn on_endval(&mut self) -> Result<(), ParseError> {
        self.flush_statement()
    }

    /// Applies the §4.2 arity rules for the accumulated statement.
    fn flush_statement(&mut self) -> Result<(), ParseError> {
        if self.store.get(self.head).node_type == NodeType::Array {
            self.flush_array_batch();
            return Ok(());
        }

        let k = self.cache.arity();
        self.trace_arity("ENDVAL", k);
        let created = match k {
            0 => None,
            1 => {
                let name = self.cache.effective()[0].data.clone();
                let quoted = self.cache.effective()[0].quoted;
                Some(self.create_leaf(self.head, name, quoted, None, false))
            }
            2 => {
                let name = self.cache.effective()[0].data.clone();
                let name_quoted = self.cache.effective()[0].quoted;
                let value = self.cache.effective()[1].data.clone();
                let value_quoted = self.cache.effective()[1].quoted;
                Some(self.create_leaf(self.head, name, name_quoted, Some(value), value_quoted))
            }
            3 | 4 => {
                let t0 = self.cache.effective()[0].data.clone();
                let t0q = self.cache.effective()[0].quoted;
                let t1 = self.cache.effective()[1].data.clone();
                let t1q = self.cache.effective()[1].quoted;
                let t2 = self.cache.effective()[2].data.clone();
                let t2q = self.cache.effective()[2].quoted;
                let value = if k == 4 {
                    Some((
                        self.cache.effective()[3].data.clone(),
                        self.cache.effective()[3].quoted,
                    ))
                } else {
                    None
                };
                let instance = self.get_or_create_instance(self.head, t0, t0q);
                let branch = self.get_or_create_node(instance, t1, t1q, NodeType::Branch);
                let leaf = self.create_leaf(
                    branch,
                    t2,
                    t2q,
                    value.as_ref().map(|(v, _)| v.clone()),
                    value.as_ref().is_some_and(|(_, q)| *q),
                );
                Some(leaf)
            }
            _ => {
                let t0 = self.cache.effective()[0].data.clone();
                let t0q = self.cache.effective()[0].quoted;
                let branch = self.store.create_node(
                    self.head,
                    NodeType::Branch,
                    t0,
                    None,
                    self.self_flags(t0q, false),
                );
                let eff: Vec<(Vec<u8>, bool)> = self
                    .cache
                    .effective()
                    .iter()
                    .map(|t| (t.data.clone(), t.quoted))
                    .collect();
                let mut idx_pos = 1;
                while idx_pos < k {
                    let (name, name_q) = eff[idx_pos].clone();
                    let (value, value_q) = if idx_pos + 1 < k {
                        (Some(eff[idx_pos + 1].0.clone()), eff[idx_pos + 1].1)
                    } else {
                        (None, false)
                    };
                    self.create_leaf(branch, name, name_q, value, value_q);
                    idx_pos += if idx_pos + 1 < k { 2 } else { 1 };
                }
                Some(branch)
            }
        };

        if let Some(id) = created {
            self.store.get_mut(id).flags.set(self.stmt_flags);
        }
        self.cache.clear();
        self.stmt_flags = NodeFlags::empty();
        Ok(())
    }

    fn self_flags(&self, quoted_name: bool, quoted_value: bool) -> NodeFlags {
        let mut flags = NodeFlags::empty();
        if quoted_name {
            flags.set(NodeFlags::QUOTED_NAME);
        }
        if quoted_value {
            flags.set(NodeFlags::QUOTED_VALUE);
        }
        flags
    }

    fn create_leaf(
        &mut self,
        parent: NodeId,
        name: Vec<u8>,
        name_quoted: bool,
        value: Option<Vec<u8>>,
        value_quoted: bool,
    ) -> NodeId {
        let flags = self.self_flags(name_quoted, value_quoted);
        let id = self.store.create_node(parent, NodeType::Leaf, name, value, flags);
        if let Some(idx) = self.index.as_deref_mut() {
            idx.put(self.store, id);
        }
        id
    }

    fn get_or_create_instance(&mut self, parent: NodeId, name: Vec<u8>, quoted: bool) -> NodeId {
        self.get_or_create_node(parent, name, quoted, NodeType::Instance)
    }

    /// Reuses an existing child of `parent` named `name` if the cheap probe
    /// finds one (updating its QUOTED_NAME flag), else creates a new
    /// `node_type` child. Used for both INSTANCE path segments and, per
    /// `spec.md` §4.2's `k`∈{3,4} ENDVAL rule, the BRANCH segment beneath
    /// them -- so repeated statements targeting the same compound path merge
    /// into the same node rather than shadowing it.
    fn get_or_create_node(
        &mut self,
        parent: NodeId,
        name: Vec<u8>,
        quoted: bool,
        node_type: NodeType,
    ) -> NodeId {
        let found = match self.index.as_deref() {
            Some(idx) => idx.get_child(self.store, parent, &name),
            None => crate::index::find_child_naive(self.store, parent, &name),
        };
        if let Some(id) = found {
            if quoted {
                self.store.get_mut(id).flags.set(NodeFlags::QUOTED_NAME);
            }
            id
        } else {
            let flags = self.self_flags(quoted, false);
            let id = self.store.create_node(parent, node_type, name, None, flags);
            if let Some(idx) = self.index.as_deref_mut() {
                idx.put(self.store, id);
            }
            id
        }
    }

    fn on_block_begin(&mut self) -> Result<(), ParseError> {
        if self.store.get(self.head).node_type == NodeType::Array {
            self.flush_array_batch();
            let ordinal = self.store.get(self.head).child_count.to_string().into_bytes();
            let branch = self
                .store
                .create_node(self.head, NodeType::Branch, ordinal, None, NodeFlags::empty());
            self.stack.push(self.head);
            self.head = branch;
            return Ok(());
        }

        let k = self.cache.arity();
        self.trace_arity("BLOCK_BEGIN", k);
        match k {
            0 => {
                if self.head == NodeId::ROOT && self.stack.is_empty() {
                    self.stack.push(self.head);
                } else {
                    return Err(self.lex_error(ErrorKind::ExpId, "expected an identifier before '{'"));
                }
            }
            1 => {
                let name = self.cache.effective()[0].data.clone();
                let quoted = self.cache.effective()[0].quoted;
                let branch = self.store.create_node(
                    self.head,
                    NodeType::Branch,
                    name,
                    None,
                    self.self_flags(quoted, false) | self.stmt_flags,
                );
                if let Some(idx) = self.index.as_deref_mut() {
                    idx.put(self.store, branch);
                }
                self.stack.push(self.head);
                self.head = branch;
            }
            2 => {
                let t0 = self.cache.effective()[0].data.clone();
                let t0q = self.cache.effective()[0].quoted;
                let t1 = self.cache.effective()[1].data.clone();
                let t1q = self.cache.effective()[1].quoted;
                let instance = self.get_or_create_instance(self.head, t0, t0q);
                let branch = self.store.create_node(
                    instance,
                    NodeType::Branch,
                    t1,
                    None,
                    self.self_flags(t1q, false) | self.stmt_flags,
                );
                if let Some(idx) = self.index.as_deref_mut() {
                    idx.put(self.store, branch);
                }
                self.stack.push(self.head);
                self.head = branch;
            }
            3 => {
                let t0 = self.cache.effective()[0].data.clone();
                let t0q = self.cache.effective()[0].quoted;
                let t1 = self.cache.effective()[1].data.clone();
                let t1q = self.cache.effective()[1].quoted;
                let t2 = self.cache.effective()[2].data.clone();
                let t2q = self.cache.effective()[2].quoted;
                let i0 = self.get_or_create_instance(self.head, t0, t0q);
                let i1 = self.get_or_create_instance(i0, t1, t1q);
                let branch = self.store.create_node(
                    i1,
                    NodeType::Branch,
                    t2,
                    None,
                    self.self_flags(t2q, false) | self.stmt_flags,
                );
                if let Some(idx) = self.index.as_deref_mut() {
                    idx.put(self.store, branch);
                }
                self.stack.push(self.head);
                self.head = branch;
            }
            _ => return Err(self.lex_error(ErrorKind::UnexpId, "too many identifiers before '{'")),
        }
        self.cache.clear();
        self.stmt_flags = NodeFlags::empty();
        Ok(())
    }

    fn on_block_end(&mut self) -> Result<(), ParseError> {
        if self.cache.count() > 0 {
            self.flush_statement()?;
        }
        match self.stack.pop() {
            Some(parent) => {
                self.head = parent;
                Ok(())
            }
            None => Err(self.lex_error(ErrorKind::Block, "unmatched '}'")),
        }
    }

    fn on_array_begin(&mut self) -> Result<(), ParseError> {
        if self.store.get(self.head).node_type == NodeType::Array {
            self.flush_array_batch();
            let ordinal = self.store.get(self.head).child_count.to_string().into_bytes();
            let array = self
                .store
                .create_node(self.head, NodeType::Array, ordinal, None, NodeFlags::empty());
            self.stack.push(self.head);
            self.head = array;
            return Ok(());
        }

        let k = self.cache.arity();
        self.trace_arity("ARRAY_BEGIN", k);
        if k != 1 {
            return Err(self.lex_error(ErrorKind::ExpId, "array must be named"));
        }
        let name = self.cache.effective()[0].data.clone();
        let quoted = self.cache.effective()[0].quoted;
        let array = self.store.create_node(
            self.head,
            NodeType::Array,
            name,
            None,
            self.self_flags(quoted, false) | self.stmt_flags,
        );
        if let Some(idx) = self.index.as_deref_mut() {
            idx.put(self.store, array);
        }
        self.stack.push(self.head);
        self.head = array;
        self.cache.clear();
        self.stmt_flags = NodeFlags::empty();
        Ok(())
    }

    fn on_array_end(&mut self) -> Result<(), ParseError> {
        if self.store.get(self.head).node_type != NodeType::Array {
            return Err(self.lex_error(ErrorKind::Block, "']' while not in an array"));
        }
        self.flush_array_batch();
        match self.stack.pop() {
            Some(parent) => {
                self.head = parent;
                Ok(())
            }
            None => Err(self.lex_error(ErrorKind::Block, "unmatched ']'")),
        }
    }

    fn on_eof(self) -> Result<(), ParseError> {
        if self.cache.count() > 0 {
            return Err(self.lex_error(ErrorKind::Eof, "pending tokens at end of file"));
        }
        if self.head != NodeId::ROOT || !self.stack.is_empty() {
            return Err(self.lex_error(ErrorKind::Level, "unbalanced block or array"));
        }
        Ok(())
    }
}

#[allow(dead_code)]
fn assert_colon_is_ext() {
    debug_assert!(CHAR_TABLE.classify(b':').contains(crate::char_table::ByteClass::EXT));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (NodeStore, Option<PathIndex>) {
        let mut store = NodeStore::new();
        let mut index = Some(PathIndex::new());
        {
            let parser = Parser::new(src.as_bytes(), &mut store, index.as_mut());
            parser.run().unwrap();
        }
        (store, index)
    }

    #[test]
    fn s1_leaf_with_value() {
        let (store, _) = parse("a b;");
        let children = store.children(NodeId::ROOT);
        assert_eq!(children.len(), 1);
        let leaf = store.get(children[0]);
        assert_eq!(leaf.name.as_ref(), b"a");
        assert_eq!(leaf.value.as_deref(), Some(&b"b"[..]));
    }

    #[test]
    fn s2_instance_chain() {
        let (store, _) = parse("cars { car bob { doors 3; } }");
        let cars = store.children(NodeId::ROOT)[0];
        assert_eq!(store.get(cars).name.as_ref(), b"cars");
        let car = store.children(cars)[0];
        assert_eq!(store.get(car).node_type, NodeType::Instance);
        let bob = store.children(car)[0];
        assert_eq!(store.get(bob).node_type, NodeType::Branch);
        assert_eq!(store.get(bob).name.as_ref(), b"bob");
        let doors = store.children(bob)[0];
        assert_eq!(store.get(doors).value.as_deref(), Some(&b"3"[..]));
    }

    #[test]
    fn s3_array_children_numbered() {
        let (store, _) = parse("arr [ 1 2 3 ];");
        let arr = store.children(NodeId::ROOT)[0];
        let kids = store.children(arr);
        assert_eq!(kids.len(), 3);
        for (i, k) in kids.iter().enumerate() {
            let n = store.get(*k);
            assert_eq!(n.name.as_ref(), i.to_string().as_bytes());
            assert_eq!(n.value.as_deref(), Some(format!("{}", i + 1).as_bytes()));
        }
    }

    #[test]
    fn s4_inactive_modifier_inherits() {
        let (store, _) = parse("inactive: box { side 5; }");
        let b = store.children(NodeId::ROOT)[0];
        assert!(store.get(b).flags.contains(NodeFlags::INACTIVE));
        let side = store.children(b)[0];
        assert!(store.get(side).flags.contains(NodeFlags::INACTIVE_CHILD));
        assert!(!store.get(side).flags.contains(NodeFlags::INACTIVE));
    }

    #[test]
    fn s5_quoted_value_with_escape() {
        let (store, _) = parse(r#"s "hel\nlo";"#);
        let leaf = store.children(NodeId::ROOT)[0];
        assert_eq!(store.get(leaf).value.as_deref(), Some(&b"hel\nlo"[..]));
        assert!(store.get(leaf).flags.contains(NodeFlags::QUOTED_VALUE));
    }

    #[test]
    fn s6_outer_wrapper_tolerated() {
        let (store, _) = parse("{ a { b { c 1; } } }");
        let a = store.children(NodeId::ROOT)[0];
        assert_eq!(store.get(a).name.as_ref(), b"a");
    }

    #[test]
    fn s6_bare_close_brace_is_block_error() {
        let mut store = NodeStore::new();
        let mut index = PathIndex::new();
        let parser = Parser::new(b"}", &mut store, Some(&mut index));
        let err = parser.run().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Block);
    }

    #[test]
    fn empty_input_is_empty_root() {
        let (store, _) = parse("");
        assert_eq!(store.children(NodeId::ROOT).len(), 0);
    }

    #[test]
    fn bare_braces_parse_to_empty_root() {
        let (store, _) = parse("{}");
        assert_eq!(store.children(NodeId::ROOT).len(), 0);
    }

    #[test]
    fn too_many_tokens_errors_outside_array() {
        let mut src = String::new();
        for i in 0..25 {
            src.push_str(&format!("t{} ", i));
        }
        let mut store = NodeStore::new();
        let mut index = PathIndex::new();
        let parser = Parser::new(src.as_bytes(), &mut store, Some(&mut index));
        let err = parser.run().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Tokens);
    }
}
