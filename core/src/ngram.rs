//! N-gram counting model with deleted-interpolation smoothing.
//!
//! Counts go into a `CountTrie` during training; afterwards the lambda
//! vector is estimated with Brants-style deleted interpolation and the
//! counts are converted into a smoothed `ProbModel`.

use std::hash::Hash;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::prob::ProbModel;
use crate::trie::{CountTrie, TrieNode, ROOT};
use crate::vocab::TagId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NGramCounter<T: Eq + Hash> {
    n: usize,
    trie: CountTrie<T>,
    lambdas: Vec<f64>,
}

impl<T: Eq + Hash + Clone> NGramCounter<T> {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            trie: CountTrie::new(),
            lambdas: Vec::new(),
        }
    }

    pub fn order(&self) -> usize {
        self.n
    }

    pub fn trie(&self) -> &CountTrie<T> {
        &self.trie
    }

    /// Record one emission of `word` after `context`. The context is
    /// consumed from its most recent element, at most `n - 1` levels deep.
    pub fn add(&mut self, context: &[TagId], word: T) {
        self.trie.add(context, word, self.n.saturating_sub(1));
    }

    /// Relative frequencies at the trie root.
    pub fn apriori_probs(&self) -> AHashMap<T, f64> {
        let root = self.trie.root();
        let num = root.num() as f64;
        root.words()
            .iter()
            .map(|(w, &c)| (w.clone(), if num > 0.0 { c as f64 / num } else { 0.0 }))
            .collect()
    }

    /// `(count - 1) / (num - 1)` at one node of the context path, with a
    /// `-1` sentinel when either count is 1 (deleted interpolation removes
    /// one observation, so singletons carry no evidence).
    fn modified_frequency(node: &TrieNode<T>, word: &T) -> f64 {
        let num = node.num();
        let count = node.count(word);
        if num <= 1 || count <= 1 {
            -1.0
        } else {
            (count - 1) as f64 / (num - 1) as f64
        }
    }

    fn collect_lambdas(trie: &CountTrie<T>, idx: usize, path: &mut Vec<usize>, lambdas: &mut [f64]) {
        path.push(idx);
        let node = trie.node(idx);
        if node.is_leaf() {
            for (word, &count) in node.words() {
                let mut best_pos: Option<usize> = None;
                let mut best_val = 0.0;
                for (depth, &node_idx) in path.iter().enumerate() {
                    let val = Self::modified_frequency(trie.node(node_idx), word);
                    if val > best_val {
                        best_val = val;
                        best_pos = Some(depth);
                    }
                }
                if let Some(pos) = best_pos {
                    if pos + 1 < lambdas.len() {
                        lambdas[pos + 1] += count as f64;
                    }
                }
            }
        } else {
            for &child in node.children().values() {
                Self::collect_lambdas(trie, child, path, lambdas);
            }
        }
        path.pop();
    }

    /// Deleted-interpolation estimate of the lambda vector. `lambda_0` is
    /// always zero and the vector is normalized to sum 1.
    pub fn estimate_lambdas(&mut self) {
        let mut lambdas = vec![0.0; self.n + 1];
        let mut path = Vec::with_capacity(self.n + 1);
        Self::collect_lambdas(&self.trie, ROOT, &mut path, &mut lambdas);
        lambdas[0] = 0.0;
        let sum: f64 = lambdas.iter().sum();
        if sum > 0.0 {
            for l in &mut lambdas {
                *l /= sum;
            }
        }
        self.lambdas = lambdas;
    }

    pub fn lambdas(&self) -> &[f64] {
        &self.lambdas
    }

    /// Estimate lambdas and derive the smoothed probability model.
    pub fn build_prob_model(&mut self) -> ProbModel<T> {
        self.estimate_lambdas();
        ProbModel::from_counts(&self.trie, &self.lambdas)
    }
}
