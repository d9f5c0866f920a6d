//! Ordered-character prefix index.
//!
//! [`PrefixIndex`] maps string keys to values and answers two kinds of
//! questions: "was exactly this key inserted?" and "which inserted key is
//! the longest prefix of this input?". The second one is what lets a
//! callback token such as `queue|1234|ООП` resolve to the handler
//! registered under `queue` without decoding its parameters first.
//!
//! Keys are walked per `char`, not per byte, so multi-byte input never
//! splits a code point.

use std::collections::BTreeMap;

/// A single node of a [`PrefixIndex`].
///
/// Values are only observable on leaf nodes, i.e. on nodes where some
/// [`PrefixIndex::insert`] call ended.
#[derive(Debug)]
pub struct PrefixNode<V> {
    children: BTreeMap<char, PrefixNode<V>>,
    leaf: bool,
    value: Option<V>,
}

impl<V> PrefixNode<V> {
    fn new() -> Self {
        Self {
            children: BTreeMap::new(),
            leaf: false,
            value: None,
        }
    }

    /// Whether an inserted key ends at this node.
    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    /// The value attached to this node, if it is a leaf.
    pub fn value(&self) -> Option<&V> {
        if self.leaf {
            self.value.as_ref()
        } else {
            None
        }
    }

    /// The child reached by `c`, if any.
    pub fn child(&self, c: char) -> Option<&PrefixNode<V>> {
        self.children.get(&c)
    }

    fn has_leaf_below(&self) -> bool {
        self.children
            .values()
            .any(|child| child.leaf || child.has_leaf_below())
    }

    fn collect_keys(&self, prefix: &mut String, out: &mut Vec<String>) {
        if self.leaf {
            out.push(prefix.clone());
        }
        for (c, child) in &self.children {
            prefix.push(*c);
            child.collect_keys(prefix, out);
            prefix.pop();
        }
    }
}

/// Character trie with exact and longest-prefix lookup.
///
/// Built once at startup and read-only afterwards; lookups never fail and
/// report absence as `None`.
#[derive(Debug)]
pub struct PrefixIndex<V> {
    root: PrefixNode<V>,
    len: usize,
}

impl<V> PrefixIndex<V> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            root: PrefixNode::new(),
            len: 0,
        }
    }

    /// Insert `value` under `key`, returning the value previously stored
    /// under exactly this key.
    ///
    /// Keys sharing a prefix with existing keys never disturb them.
    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        let mut node = &mut self.root;
        for c in key.chars() {
            node = node.children.entry(c).or_insert_with(PrefixNode::new);
        }
        if !node.leaf {
            self.len += 1;
        }
        node.leaf = true;
        node.value.replace(value)
    }

    /// Look up exactly `key`.
    pub fn search_exact(&self, key: &str) -> Option<&V> {
        let mut node = &self.root;
        for c in key.chars() {
            node = node.children.get(&c)?;
        }
        node.value()
    }

    /// Return the value of the longest inserted key that is a prefix of
    /// `key`, or `None` when no inserted key prefixes it.
    pub fn search(&self, key: &str) -> Option<&V> {
        self.iter_path(key).filter_map(PrefixNode::value).last()
    }

    /// Lazily walk the nodes from the root toward `key`.
    ///
    /// The first item is always the root. The walk stops at the first
    /// character without a matching child. Each call starts a fresh walk.
    pub fn iter_path<'a, 'k>(&'a self, key: &'k str) -> PathIter<'a, 'k, V> {
        PathIter {
            next: Some(&self.root),
            chars: key.chars(),
        }
    }

    /// Report an inserted key that collides with `key` as a strict prefix
    /// in either direction.
    ///
    /// Returns the colliding key, or `None` when `key` can be inserted
    /// without shadowing (or being shadowed by) a different key.
    pub fn prefix_conflict(&self, key: &str) -> Option<String> {
        let mut node = &self.root;
        let mut walked = String::new();
        for c in key.chars() {
            if node.leaf {
                return Some(walked);
            }
            match node.children.get(&c) {
                Some(child) => {
                    walked.push(c);
                    node = child;
                }
                None => return None,
            }
        }

        if node.has_leaf_below() {
            let mut keys = Vec::new();
            let mut prefix = walked.clone();
            for (c, child) in &node.children {
                prefix.push(*c);
                child.collect_keys(&mut prefix, &mut keys);
                prefix.pop();
            }
            return keys.into_iter().next();
        }
        None
    }

    /// All inserted keys in lexicographic (char) order.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len);
        self.root.collect_keys(&mut String::new(), &mut out);
        out
    }

    /// Number of distinct inserted keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<V> Default for PrefixIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the chain of nodes from the root toward a key.
///
/// Returned by [`PrefixIndex::iter_path`].
pub struct PathIter<'a, 'k, V> {
    next: Option<&'a PrefixNode<V>>,
    chars: std::str::Chars<'k>,
}

impl<'a, V> Iterator for PathIter<'a, '_, V> {
    type Item = &'a PrefixNode<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = self.chars.next().and_then(|c| current.child(c));
        Some(current)
    }
}
