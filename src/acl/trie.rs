use std::collections::HashMap;

use crate::acl::types::PathRule;

/// Byte-level trie mapping normalized path strings to rules.
///
/// Rule prefixes are not segment-aligned (`auth/token/create` prefixes
/// `auth/token/create-orphan`), so the walk is per byte rather than per
/// path segment. Lookup cost is bounded by the request path length, not by
/// the number of rules.
#[derive(Debug, Default)]
pub struct PathTrie {
    root: Node,
    len: usize,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<u8, Node>,
    rule: Option<PathRule>,
}

impl PathTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a rule under `key`, replacing any existing rule. The empty
    /// string is a valid key and lands on the root node.
    pub fn insert(&mut self, key: &str, rule: PathRule) {
        let mut node = &mut self.root;
        for byte in key.bytes() {
            node = node.children.entry(byte).or_default();
        }
        if node.rule.replace(rule).is_none() {
            self.len += 1;
        }
    }

    /// Exact-key lookup.
    pub fn get(&self, key: &str) -> Option<&PathRule> {
        let mut node = &self.root;
        for byte in key.bytes() {
            node = node.children.get(&byte)?;
        }
        node.rule.as_ref()
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PathRule> {
        let mut node = &mut self.root;
        for byte in key.bytes() {
            node = node.children.get_mut(&byte)?;
        }
        node.rule.as_mut()
    }

    /// The rule stored under the longest key that is a prefix of `path`.
    /// The empty key matches every path.
    pub fn longest_prefix(&self, path: &str) -> Option<&PathRule> {
        let mut node = &self.root;
        let mut best = node.rule.as_ref();
        for byte in path.bytes() {
            match node.children.get(&byte) {
                Some(child) => node = child,
                None => break,
            }
            if node.rule.is_some() {
                best = node.rule.as_ref();
            }
        }
        best
    }
}
