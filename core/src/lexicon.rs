//! Word form lexicons.
//!
//! `Lexicon` is the mutable training-time table mapping a word form (or a
//! special-token class name) to its per-tag counts. At `compile()` it is
//! frozen into a `FrozenLexicon`: an `fst::Map` keyed by word mapping to an
//! index into a payload vector of `(tag, count)` rows. Decoding only ever
//! touches the frozen form.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::vocab::TagId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lexicon {
    entries: AHashMap<String, AHashMap<TagId, u32>>,
    size: u64,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(&mut self, word: &str, tag: TagId) {
        *self
            .entries
            .entry(word.to_string())
            .or_default()
            .entry(tag)
            .or_insert(0) += 1;
        self.size += 1;
    }

    pub fn tags(&self, word: &str) -> Vec<TagId> {
        self.entries
            .get(word)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Total count of `word` across all of its tags.
    pub fn word_count(&self, word: &str) -> u32 {
        self.entries
            .get(word)
            .map(|m| m.values().sum())
            .unwrap_or(0)
    }

    pub fn count(&self, word: &str, tag: TagId) -> u32 {
        self.entries
            .get(word)
            .and_then(|m| m.get(&tag).copied())
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AHashMap<TagId, u32>)> {
        self.entries.iter()
    }

    /// Number of distinct word forms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tokens counted into the lexicon.
    pub fn token_count(&self) -> u64 {
        self.size
    }
}

/// Read-only compiled view of a `Lexicon`.
#[derive(Debug)]
pub struct FrozenLexicon {
    index: fst::Map<Vec<u8>>,
    payloads: Vec<Vec<(TagId, u32)>>,
    totals: Vec<u32>,
}

impl FrozenLexicon {
    pub fn freeze(lexicon: &Lexicon) -> Self {
        let mut sorted: Vec<(&String, &AHashMap<TagId, u32>)> = lexicon.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut payloads = Vec::with_capacity(sorted.len());
        let mut totals = Vec::with_capacity(sorted.len());
        let index = fst::Map::from_iter(sorted.iter().enumerate().map(|(i, (word, _))| {
            (word.as_str(), i as u64)
        }))
        .expect("lexicon keys are sorted and unique");
        for (_, tag_counts) in sorted {
            let mut row: Vec<(TagId, u32)> = tag_counts.iter().map(|(&t, &c)| (t, c)).collect();
            row.sort_by_key(|&(t, _)| t);
            totals.push(row.iter().map(|&(_, c)| c).sum());
            payloads.push(row);
        }
        Self {
            index,
            payloads,
            totals,
        }
    }

    fn row(&self, word: &str) -> Option<usize> {
        self.index.get(word).map(|i| i as usize)
    }

    /// Cheap existence probe on the fst index alone.
    pub fn contains(&self, word: &str) -> bool {
        self.index.get(word).is_some()
    }

    pub fn tags(&self, word: &str) -> Vec<TagId> {
        self.row(word)
            .map(|i| self.payloads[i].iter().map(|&(t, _)| t).collect())
            .unwrap_or_default()
    }

    pub fn word_count(&self, word: &str) -> u32 {
        self.row(word).map(|i| self.totals[i]).unwrap_or(0)
    }

    pub fn count(&self, word: &str, tag: TagId) -> u32 {
        self.row(word)
            .and_then(|i| {
                self.payloads[i]
                    .iter()
                    .find(|&&(t, _)| t == tag)
                    .map(|&(_, c)| c)
            })
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Lexicon {
        let mut lx = Lexicon::new();
        lx.add_token("alma", 2);
        lx.add_token("alma", 2);
        lx.add_token("alma", 3);
        lx.add_token("fa", 4);
        lx
    }

    #[test]
    fn counting_and_queries() {
        let lx = sample();
        let mut tags = lx.tags("alma");
        tags.sort_unstable();
        assert_eq!(tags, vec![2, 3]);
        assert_eq!(lx.word_count("alma"), 3);
        assert_eq!(lx.count("alma", 2), 2);
        assert_eq!(lx.count("alma", 9), 0);
        assert_eq!(lx.word_count("nincs"), 0);
        assert_eq!(lx.token_count(), 4);
    }

    #[test]
    fn frozen_view_matches_mutable_table() {
        let lx = sample();
        let frozen = FrozenLexicon::freeze(&lx);
        assert!(frozen.contains("alma"));
        assert!(!frozen.contains("nincs"));
        assert_eq!(frozen.word_count("alma"), lx.word_count("alma"));
        assert_eq!(frozen.count("alma", 2), 2);
        let mut tags = frozen.tags("alma");
        tags.sort_unstable();
        assert_eq!(tags, vec![2, 3]);
        assert_eq!(frozen.len(), 2);
    }
}
