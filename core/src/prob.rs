//! Smoothed probability model derived from a counting trie.
//!
//! Structurally isomorphic to the `CountTrie` it was built from, but node
//! values are interpolated probabilities instead of counts: the value of
//! element `w` at depth `d` is
//! `lambda_0 + lambda_1 * P(w|root) + .. + lambda_d * P(w|context_d)`,
//! accumulated top-down so each level adds its own weighted relative
//! frequency onto the parent's running value.
//!
//! Lookups return natural-log probabilities; zero or missing entries yield
//! the `UNKNOWN_VALUE` sentinel (or a caller-chosen default).

use std::borrow::Borrow;
use std::hash::Hash;

use ahash::AHashMap;

use crate::config::UNKNOWN_VALUE;
use crate::mapper::TagMapper;
use crate::trie::{CountTrie, ROOT};
use crate::vocab::TagId;

#[derive(Debug, Clone)]
struct ProbNode<T: Eq + Hash> {
    probs: AHashMap<T, f64>,
    children: AHashMap<TagId, usize>,
}

#[derive(Debug, Clone)]
pub struct ProbModel<T: Eq + Hash> {
    nodes: Vec<ProbNode<T>>,
    pub context_mapper: Option<TagMapper>,
    pub element_mapper: Option<TagMapper>,
}

impl<T: Eq + Hash + Clone> ProbModel<T> {
    pub fn from_counts(trie: &CountTrie<T>, lambdas: &[f64]) -> Self {
        let l0 = lambdas.first().copied().unwrap_or(0.0);
        let l1 = lambdas.get(1).copied().unwrap_or(0.0);

        let root_probs: AHashMap<T, f64> = trie
            .root()
            .words()
            .keys()
            .map(|w| (w.clone(), l0 + l1 * trie.root().relative_frequency(w)))
            .collect();

        let mut model = Self {
            nodes: vec![ProbNode {
                probs: root_probs,
                children: AHashMap::new(),
            }],
            context_mapper: None,
            element_mapper: None,
        };
        model.build_children(trie, ROOT, ROOT, 2, lambdas);
        model
    }

    fn build_children(
        &mut self,
        trie: &CountTrie<T>,
        src: usize,
        dst: usize,
        level: usize,
        lambdas: &[f64],
    ) {
        if lambdas.len() <= level {
            return;
        }
        let lambda = lambdas[level];
        for (&tag, &child_src) in trie.node(src).children() {
            let child_node = trie.node(child_src);
            let probs: AHashMap<T, f64> = child_node
                .words()
                .keys()
                .map(|w| {
                    let parent = self.nodes[dst].probs.get(w).copied().unwrap_or(0.0);
                    (w.clone(), parent + lambda * child_node.relative_frequency(w))
                })
                .collect();
            let child_dst = self.nodes.len();
            self.nodes.push(ProbNode {
                probs,
                children: AHashMap::new(),
            });
            self.nodes[dst].children.insert(tag, child_dst);
            self.build_children(trie, child_src, child_dst, level + 1, lambdas);
        }
    }

    /// Walk the trie as deep as both the context tag and the element stay
    /// present and return the stored probability of the deepest node
    /// reached, as a linear value.
    fn lookup<Q>(&self, context: &[TagId], word: &Q) -> Option<f64>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mapped;
        let context: &[TagId] = match &self.context_mapper {
            Some(m) => {
                mapped = m.map_context(context);
                &mapped
            }
            None => context,
        };
        let mut idx = ROOT;
        for &prev in context.iter().rev() {
            match self.nodes[idx].children.get(&prev) {
                Some(&child) if self.nodes[child].probs.contains_key(word) => idx = child,
                _ => break,
            }
        }
        self.nodes[idx].probs.get(word).copied()
    }

    fn log_prob_with_default<Q>(&self, context: &[TagId], word: &Q, default: f64) -> f64
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.lookup(context, word) {
            Some(p) if p > 0.0 => p.ln(),
            _ => default,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl ProbModel<TagId> {
    /// Log-probability of a tag transition; the element mapper is applied
    /// to the looked-up tag first.
    pub fn log_prob(&self, context: &[TagId], tag: TagId) -> f64 {
        self.log_prob_or(context, tag, UNKNOWN_VALUE)
    }

    pub fn log_prob_or(&self, context: &[TagId], tag: TagId, default: f64) -> f64 {
        let tag = match &self.element_mapper {
            Some(m) => m.map(tag),
            None => tag,
        };
        self.log_prob_with_default(context, &tag, default)
    }
}

impl ProbModel<String> {
    /// Log-probability of emitting `word` in the given tag context.
    pub fn log_prob(&self, context: &[TagId], word: &str) -> f64 {
        self.log_prob_with_default(context, word, UNKNOWN_VALUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trie() -> CountTrie<String> {
        let mut trie = CountTrie::new();
        // Emissions of "a" in context ending with tag 2, "b" under tag 3.
        trie.add(&[2], "a".to_string(), 1);
        trie.add(&[2], "a".to_string(), 1);
        trie.add(&[3], "b".to_string(), 1);
        trie.add(&[3], "a".to_string(), 1);
        trie
    }

    #[test]
    fn deeper_context_sharpens_probability() {
        let trie = sample_trie();
        let model = ProbModel::from_counts(&trie, &[0.0, 0.4, 0.6]);

        // Root only: P(a) = 3/4 -> 0.4 * 0.75
        let shallow = model.log_prob(&[], "a");
        assert!((shallow - (0.4f64 * 0.75).ln()).abs() < 1e-9);

        // Context tag 2: adds 0.6 * P(a | 2) = 0.6 * 1.0
        let deep = model.log_prob(&[2], "a");
        assert!((deep - (0.4f64 * 0.75 + 0.6).ln()).abs() < 1e-9);
        assert!(deep > shallow);
    }

    #[test]
    fn missing_element_backs_off_to_shallower_node() {
        let trie = sample_trie();
        let model = ProbModel::from_counts(&trie, &[0.0, 0.4, 0.6]);
        // "b" was never emitted under tag 2, so the walk stops at the root.
        let p = model.log_prob(&[2], "b");
        assert!((p - (0.4f64 * 0.25).ln()).abs() < 1e-9);
    }

    #[test]
    fn unknown_element_is_sentinel() {
        let trie = sample_trie();
        let model = ProbModel::from_counts(&trie, &[0.0, 0.4, 0.6]);
        assert_eq!(model.log_prob(&[2], "zzz"), UNKNOWN_VALUE);
    }
}
