//! Arena-backed counting trie over reversed tag contexts.
//!
//! A path `root -> t_k -> .. -> t_1` stores the context `(t_1, .., t_k)`
//! with the most recent tag nearest the root, so lookups walk the context
//! back to front. Every node keeps a multiset of emitted elements plus the
//! running total `num`; the two are always updated together.
//!
//! Nodes live in one flat `Vec` and children are integer indices, which
//! keeps the deep interpolation traversal free of pointer chasing and makes
//! the structure trivially serializable.

use std::hash::Hash;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::vocab::TagId;

pub const ROOT: usize = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrieNode<T: Eq + Hash> {
    words: AHashMap<T, u32>,
    num: u32,
    children: AHashMap<TagId, usize>,
}

impl<T: Eq + Hash> TrieNode<T> {
    fn new() -> Self {
        Self {
            words: AHashMap::new(),
            num: 0,
            children: AHashMap::new(),
        }
    }

    pub fn count(&self, word: &T) -> u32 {
        self.words.get(word).copied().unwrap_or(0)
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn words(&self) -> &AHashMap<T, u32> {
        &self.words
    }

    pub fn children(&self) -> &AHashMap<TagId, usize> {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Relative frequency of `word` at this node, 0.0 when absent.
    pub fn relative_frequency(&self, word: &T) -> f64 {
        if self.num == 0 {
            return 0.0;
        }
        match self.words.get(word) {
            Some(&c) => c as f64 / self.num as f64,
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountTrie<T: Eq + Hash> {
    nodes: Vec<TrieNode<T>>,
}

impl<T: Eq + Hash + Clone> CountTrie<T> {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::new()],
        }
    }

    pub fn node(&self, idx: usize) -> &TrieNode<T> {
        &self.nodes[idx]
    }

    pub fn root(&self) -> &TrieNode<T> {
        &self.nodes[ROOT]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn child(&self, idx: usize, tag: TagId) -> Option<usize> {
        self.nodes[idx].children.get(&tag).copied()
    }

    fn record(&mut self, idx: usize, word: T) {
        let node = &mut self.nodes[idx];
        *node.words.entry(word).or_insert(0) += 1;
        node.num += 1;
    }

    fn ensure_child(&mut self, idx: usize, tag: TagId) -> usize {
        if let Some(&child) = self.nodes[idx].children.get(&tag) {
            return child;
        }
        let child = self.nodes.len();
        self.nodes.push(TrieNode::new());
        self.nodes[idx].children.insert(tag, child);
        child
    }

    /// Count `word` under the root and under every context prefix, walking
    /// `context` from its most recent element, down to `max_depth` levels.
    pub fn add(&mut self, context: &[TagId], word: T, max_depth: usize) {
        self.record(ROOT, word.clone());
        let mut idx = ROOT;
        for (depth, &tag) in context.iter().rev().enumerate() {
            if depth >= max_depth {
                break;
            }
            idx = self.ensure_child(idx, tag);
            self.record(idx, word.clone());
        }
    }
}

impl<T: Eq + Hash + Clone> Default for CountTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_updates_all_levels() {
        let mut trie: CountTrie<u32> = CountTrie::new();
        trie.add(&[5, 7], 42, 2);
        trie.add(&[5, 7], 42, 2);
        trie.add(&[9, 7], 43, 2);

        assert_eq!(trie.root().count(&42), 2);
        assert_eq!(trie.root().count(&43), 1);
        assert_eq!(trie.root().num(), 3);

        // Most recent context tag (7) sits directly under the root.
        let level1 = trie.child(ROOT, 7).unwrap();
        assert_eq!(trie.node(level1).count(&42), 2);
        assert_eq!(trie.node(level1).num(), 3);

        let via5 = trie.child(level1, 5).unwrap();
        assert_eq!(trie.node(via5).count(&42), 2);
        let via9 = trie.child(level1, 9).unwrap();
        assert_eq!(trie.node(via9).count(&43), 1);
    }

    #[test]
    fn depth_limit_is_honored() {
        let mut trie: CountTrie<u32> = CountTrie::new();
        trie.add(&[1, 2, 3], 9, 1);
        let level1 = trie.child(ROOT, 3).unwrap();
        assert!(trie.node(level1).is_leaf());
    }

    #[test]
    fn num_equals_sum_of_word_counts() {
        let mut trie: CountTrie<u32> = CountTrie::new();
        for (ctx, w) in [(vec![1u32, 2], 10u32), (vec![1, 2], 10), (vec![2, 2], 11)] {
            trie.add(&ctx, w, 2);
        }
        for idx in 0..trie.node_count() {
            let node = trie.node(idx);
            let total: u32 = node.words().values().sum();
            assert_eq!(node.num(), total);
        }
    }
}
