//! Barser ("Bastard Parser"): a general-purpose, format-flexible parser and
//! in-memory dictionary for hierarchical curly-brace configuration data.
//!
//! Barser accepts a permissive superset covering JSON, C-like config, and
//! Juniper/gated-style configuration, and produces a mutable tree of named
//! [`Node`]s that can be dumped, queried by path, walked with callbacks,
//! duplicated, renamed, moved, and merged.
//!
//! # Example
//! ```
//! use barser::{CreateFlags, Dictionary};
//!
//! let dict = Dictionary::parse(b"cars { car bob { doors 3; } }", CreateFlags::empty())
//!     .unwrap_or_else(|(_, e)| panic!("{e}"));
//! let root = dict.root();
//! let doors = dict.get(root, b"/cars/car/bob/doors").unwrap();
//! assert_eq!(dict.value(doors), Some(&b"3"[..]));
//! ```

pub mod char_table;
pub mod error;
pub mod escape;
pub mod hash;
pub mod index;
pub mod lex;
pub mod node;
pub mod parser;
pub mod query;
pub mod store;
pub mod trace;
pub mod walker;

mod dict;

pub use dict::{CreateFlags, Dictionary};
pub use error::{ErrorKind, ParseError};
pub use node::{Node, NodeFlags, NodeId, NodeType};
pub use trace::Trace;

#[cfg(test)]
mod integration {
    use super::*;

    fn parse(src: &str) -> Dictionary {
        Dictionary::parse(src.as_bytes(), CreateFlags::empty()).unwrap_or_else(|(_, e)| panic!("{e}"))
    }

    #[test]
    fn s1_two_tokens_is_leaf_with_value() {
        let dict = parse("a b;");
        let root = dict.root();
        let children = dict.children(root);
        assert_eq!(children.len(), 1);
        let a = children[0];
        assert_eq!(dict.node(a).node_type, NodeType::Leaf);
        assert_eq!(dict.node(a).name.as_ref(), b"a");
        assert_eq!(dict.value(a), Some(&b"b"[..]));
    }

    #[test]
    fn s2_compound_path_and_query() {
        let dict = parse("cars { car bob { doors 3; } }");
        let root = dict.root();
        let doors = dict.get(root, b"/cars/car/bob/doors").unwrap();
        assert_eq!(dict.value(doors), Some(&b"3"[..]));
        let car = dict.get(root, b"/cars/car").unwrap();
        assert_eq!(dict.node(car).node_type, NodeType::Instance);
        let bob = dict.get(root, b"/cars/car/bob").unwrap();
        assert_eq!(dict.node(bob).node_type, NodeType::Branch);
    }

    #[test]
    fn s3_array_children_are_base10_named() {
        let dict = parse("arr [ 1 2 3 ];");
        let root = dict.root();
        let arr = dict.get(root, b"/arr").unwrap();
        let kids = dict.children(arr);
        assert_eq!(kids.len(), 3);
        for (i, k) in kids.iter().enumerate() {
            assert_eq!(dict.node(*k).name.as_ref(), i.to_string().as_bytes());
            assert_eq!(dict.value(*k), Some(format!("{}", i + 1).as_bytes()));
        }
    }

    #[test]
    fn s4_inactive_modifier_is_not_inherited_as_self_flag() {
        let dict = parse("inactive: box { side 5; }");
        let root = dict.root();
        let b = dict.get(root, b"/box").unwrap();
        assert!(dict.node(b).flags.contains(NodeFlags::INACTIVE));
        let side = dict.get(root, b"/box/side").unwrap();
        assert!(dict.node(side).flags.contains(NodeFlags::INACTIVE_CHILD));
        assert!(!dict.node(side).flags.contains(NodeFlags::INACTIVE));
    }

    #[test]
    fn s5_quoted_value_round_trips_through_dump() {
        let dict = parse(r#"s "hel\nlo";"#);
        let root = dict.root();
        let s = dict.get(root, b"/s").unwrap();
        assert_eq!(dict.value(s), Some(&b"hel\nlo"[..]));
        let dumped = dict.dump();
        assert!(dumped.contains(r#""hel\nlo""#));
    }

    #[test]
    fn s6_outer_brace_wrapper_tolerated_bare_close_is_error() {
        let dict = parse("{ a { b { c 1; } } }");
        let root = dict.root();
        let c = dict.get(root, b"/a/b/c").unwrap();
        assert_eq!(dict.value(c), Some(&b"1"[..]));

        let err = match Dictionary::parse(b"}", CreateFlags::empty()) {
            Ok(_) => panic!("expected parse error"),
            Err((_, e)) => e,
        };
        assert_eq!(err.kind, ErrorKind::Block);
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 2);
    }

    #[test]
    fn invariant_every_indexed_node_is_findable_by_its_own_hash() {
        let dict = parse("a { b 1; c 2; } d [ 1 2 3 ];");
        let mut ok = true;
        dict.walk(dict.root(), (), &mut |store, id, _fb, _stop| {
            if store.get(id).is_indexed() {
                let hash = store.get(id).hash;
                // Rebuilding via `get` from root must reach the same node.
                let path = crate::query::get_escaped_path(store, id);
                if crate::query::resolve(store, None, dict.root(), &path) != Some(id) {
                    ok = false;
                }
                let _ = hash;
            }
        });
        assert!(ok);
    }

    #[test]
    fn invariant_array_children_always_base10_numbered() {
        let mut dict = Dictionary::create(CreateFlags::empty());
        let root = dict.root();
        let arr = dict
            .create_node(root, NodeType::Array, b"a".to_vec(), None, NodeFlags::empty())
            .unwrap();
        for v in [b"x".to_vec(), b"y".to_vec(), b"z".to_vec()] {
            dict.create_node(arr, NodeType::Leaf, b"_".to_vec(), Some(v), NodeFlags::empty())
                .unwrap();
        }
        for (i, c) in dict.children(arr).iter().enumerate() {
            assert_eq!(dict.node(*c).name.as_ref(), i.to_string().as_bytes());
        }
        let middle = dict.children(arr)[1];
        dict.delete_node(middle).unwrap();
        for (i, c) in dict.children(arr).iter().enumerate() {
            assert_eq!(dict.node(*c).name.as_ref(), i.to_string().as_bytes());
        }
    }

    #[test]
    fn boundary_empty_input_and_bare_braces() {
        let empty = parse("");
        assert_eq!(empty.children(empty.root()).len(), 0);
        let wrapped = parse("{}");
        assert_eq!(wrapped.children(wrapped.root()).len(), 0);
    }

    #[test]
    fn boundary_too_many_identifiers_errors_outside_array() {
        let mut src = String::new();
        for i in 0..25 {
            src.push_str(&format!("t{} ", i));
        }
        let err = match Dictionary::parse(src.as_bytes(), CreateFlags::empty()) {
            Ok(_) => panic!("expected parse error"),
            Err((_, e)) => e,
        };
        assert_eq!(err.kind, ErrorKind::Tokens);
    }

    #[test]
    fn boundary_unterminated_quote_reports_opening_position() {
        let err = match Dictionary::parse(br#""foo"#, CreateFlags::empty()) {
            Ok(_) => panic!("expected parse error"),
            Err((_, e)) => e,
        };
        assert_eq!(err.kind, ErrorKind::Eof);
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 1);
    }

    #[test]
    fn boundary_unbalanced_block_reports_real_eof_position() {
        let err = match Dictionary::parse(b"a {\nb {\nc 1;\n", CreateFlags::empty()) {
            Ok(_) => panic!("expected parse error"),
            Err((_, e)) => e,
        };
        assert_eq!(err.kind, ErrorKind::Level);
        assert_eq!(err.line, 4);
        assert_eq!(err.column, 1);
    }

    #[test]
    fn boundary_root_delete_is_refused() {
        let mut dict = Dictionary::create(CreateFlags::empty());
        let root = dict.root();
        assert!(!dict.delete_node(root).unwrap());
    }

    #[test]
    fn roundtrip_dump_then_reparse_matches_structurally() {
        let dict = parse("cars { car bob { doors 3; } } arr [ 1 2 ];");
        let dumped = dict.dump();
        let dict2 = Dictionary::parse(dumped.as_bytes(), CreateFlags::empty())
            .unwrap_or_else(|(_, e)| panic!("{e}"));
        assert_eq!(dict2.dump(), dumped);
    }

    #[test]
    fn roundtrip_get_path_resolves_back_to_same_node() {
        let dict = parse("a { b { c 1; } }");
        let root = dict.root();
        let c = dict.get(root, b"/a/b/c").unwrap();
        let path = dict.get_path(c);
        assert_eq!(dict.get(root, &path), Some(c));
    }
}
