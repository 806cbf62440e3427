//! Hash-based suffix tries with successive-abstraction smoothing.
//!
//! The same table serves two purposes: the word guesser counts tag ids per
//! suffix (two case-split instances), the lemma guesser counts lemma
//! transformations per suffix. Probability estimation follows Brants
//! (2000): walking from the empty suffix towards the longest matching one,
//! each level refines the accumulated estimate with
//! `p = (p_prev + theta * relfreq) / (theta + 1)`.

use std::borrow::Borrow;
use std::hash::Hash;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::config::UNKNOWN_VALUE;
use crate::mapper::TagMapper;
use crate::vocab::TagId;

/// Smoothing weight derived from the apriori tag distribution, following
/// the libmoot variant of Brants' formulas 10/11.
pub fn calculate_theta(apriori_probs: &AHashMap<TagId, f64>) -> f64 {
    let pav: f64 = apriori_probs.values().map(|p| p * p).sum();
    apriori_probs
        .values()
        .map(|p| p * (p - pav) * (p - pav))
        .sum::<f64>()
        .sqrt()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SuffixEntry<T: Eq + Hash> {
    counts: AHashMap<T, u32>,
    total: u32,
}

impl<T: Eq + Hash> Default for SuffixEntry<T> {
    fn default() -> Self {
        Self {
            counts: AHashMap::new(),
            total: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuffixTable<T: Eq + Hash> {
    max_suffix_length: usize,
    total_count: u64,
    table: AHashMap<String, SuffixEntry<T>>,
}

impl<T: Eq + Hash + Clone> SuffixTable<T> {
    pub fn new(max_suffix_length: usize) -> Self {
        Self {
            max_suffix_length,
            total_count: 0,
            table: AHashMap::new(),
        }
    }

    /// Count every suffix of `word` between `min_len` and
    /// `max_suffix_length` chars (inclusive, plus the empty suffix when
    /// `min_len` is 0) for `element`.
    pub fn add_word(&mut self, word: &str, element: T, count: u32, min_len: usize) {
        self.add_impl(word, element, count, min_len, false);
    }

    /// Like `add_word`, but skips cut points that would sit right after a
    /// hyphen. Used by the lemma-transformation table so no transformation
    /// is learned that leaves a dangling hyphen in the output lemma.
    pub fn add_word_skipping_hyphens(&mut self, word: &str, element: T, count: u32, min_len: usize) {
        self.add_impl(word, element, count, min_len, true);
    }

    fn add_impl(&mut self, word: &str, element: T, count: u32, min_len: usize, skip_hyphens: bool) {
        let chars: Vec<char> = word.chars().collect();
        let end = chars.len().saturating_sub(min_len);
        let start = end.saturating_sub(self.max_suffix_length);
        for cut in start..=end {
            if skip_hyphens && cut > 0 && chars[cut - 1] == '-' {
                continue;
            }
            let suffix: String = chars[cut..].iter().collect();
            let entry = self.table.entry(suffix).or_default();
            *entry.counts.entry(element.clone()).or_insert(0) += count;
            entry.total += count;
        }
        self.total_count += count as u64;
    }

    /// Smoothed log-probability distribution over all elements reachable
    /// from the suffixes of `word`.
    pub fn log_probabilities(&self, word: &str, theta: f64) -> AHashMap<T, f64> {
        let chars: Vec<char> = word.chars().collect();
        let theta_plus_one = theta + 1.0;
        let mut acc: AHashMap<T, f64> = AHashMap::new();
        // Shortest (empty) suffix first, so every longer level refines the
        // more general estimate.
        for cut in (0..=chars.len()).rev() {
            let suffix: String = chars[cut..].iter().collect();
            let Some(entry) = self.table.get(&suffix) else {
                continue;
            };
            let total = entry.total as f64;
            if total <= 0.0 {
                continue;
            }
            for (element, &c) in &entry.counts {
                let prev = acc.get(element).copied().unwrap_or(0.0);
                let refined = (prev + (c as f64 / total) * theta) / theta_plus_one;
                acc.insert(element.clone(), refined);
            }
        }
        acc.into_iter()
            .filter(|&(_, p)| p > 0.0)
            .map(|(t, p)| (t, p.ln()))
            .collect()
    }

    pub fn log_probability<Q>(&self, word: &str, element: &Q, theta: f64) -> f64
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.log_probabilities(word, theta)
            .get(element)
            .copied()
            .unwrap_or(UNKNOWN_VALUE)
    }

    /// Distribution pruned the TnT way: entries below
    /// `max - suf_theta` are dropped, then at most `max_guessed` of the
    /// highest remain, sorted by descending log-probability.
    pub fn log_probabilities_pruned(
        &self,
        word: &str,
        theta: f64,
        max_guessed: usize,
        suf_theta: f64,
    ) -> Vec<(T, f64)> {
        let probs = self.log_probabilities(word, theta);
        let Some(max) = probs.values().copied().fold(None, |m: Option<f64>, p| {
            Some(m.map_or(p, |m| m.max(p)))
        }) else {
            return Vec::new();
        };
        let min_val = max - suf_theta;
        let mut kept: Vec<(T, f64)> = probs.into_iter().filter(|&(_, p)| p > min_val).collect();
        kept.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        kept.truncate(max_guessed);
        kept
    }

    pub fn entry(&self, suffix: &str) -> Option<(&AHashMap<T, u32>, u32)> {
        self.table.get(suffix).map(|e| (&e.counts, e.total))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn max_suffix_length(&self) -> usize {
        self.max_suffix_length
    }
}

/// Inference-side view of a suffix table with its cached theta.
#[derive(Debug, Clone)]
pub struct SuffixGuesser<T: Eq + Hash> {
    table: SuffixTable<T>,
    theta: f64,
    pub mapper: Option<TagMapper>,
}

impl<T: Eq + Hash + Clone> SuffixGuesser<T> {
    pub fn new(table: SuffixTable<T>, theta: f64) -> Self {
        Self {
            table,
            theta,
            mapper: None,
        }
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn table(&self) -> &SuffixTable<T> {
        &self.table
    }

    pub fn tag_log_probabilities(&self, word: &str) -> AHashMap<T, f64> {
        self.table.log_probabilities(word, self.theta)
    }

    pub fn tag_log_probabilities_pruned(
        &self,
        word: &str,
        max_guessed: usize,
        suf_theta: f64,
    ) -> Vec<(T, f64)> {
        self.table
            .log_probabilities_pruned(word, self.theta, max_guessed, suf_theta)
    }

    /// Log-probability of an arbitrary element (used by the lemma guesser,
    /// where elements are transformations and no tag mapping applies).
    pub fn element_log_probability(&self, word: &str, element: &T) -> f64 {
        self.table.log_probability(word, element, self.theta)
    }
}

impl SuffixGuesser<TagId> {
    /// Log-probability of one tag; the tag mapper is applied first so
    /// analyzer-supplied tags resolve to their trained counterparts.
    pub fn tag_log_probability(&self, word: &str, tag: TagId) -> f64 {
        let tag = match &self.mapper {
            Some(m) => m.map(tag),
            None => tag,
        };
        self.table.log_probability(word, &tag, self.theta)
    }

    pub fn map_tag(&self, tag: TagId) -> TagId {
        match &self.mapper {
            Some(m) => m.map(tag),
            None => tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_stay_consistent() {
        let mut table: SuffixTable<TagId> = SuffixTable::new(4);
        table.add_word("houses", 2, 3, 0);
        table.add_word("cases", 2, 1, 0);
        table.add_word("runs", 3, 2, 0);
        for suffix in ["", "s", "es", "ses"] {
            let (counts, total) = table.entry(suffix).unwrap();
            assert_eq!(total, counts.values().sum::<u32>(), "suffix '{}'", suffix);
        }
    }

    #[test]
    fn min_len_restricts_short_suffixes() {
        let mut table: SuffixTable<TagId> = SuffixTable::new(10);
        table.add_word("falak", 2, 1, 2);
        // Suffixes shorter than two chars must not be counted.
        assert!(table.entry("k").is_none());
        assert!(table.entry("").is_none());
        assert!(table.entry("ak").is_some());
    }

    #[test]
    fn hyphen_cut_points_are_skipped() {
        let mut table: SuffixTable<u32> = SuffixTable::new(10);
        table.add_word_skipping_hyphens("e-mail", 1, 1, 0);
        assert!(table.entry("mail").is_none());
        assert!(table.entry("ail").is_some());
    }

    #[test]
    fn known_ending_dominates_distribution() {
        let mut table: SuffixTable<TagId> = SuffixTable::new(3);
        table.add_word("bars", 2, 5, 0);
        table.add_word("cars", 2, 5, 0);
        table.add_word("run", 3, 4, 0);
        let apriori: AHashMap<TagId, f64> =
            [(2, 10.0 / 14.0), (3, 4.0 / 14.0)].into_iter().collect();
        let theta = calculate_theta(&apriori);
        let probs = table.log_probabilities("stars", theta);
        assert!(probs[&2] > probs[&3]);
    }

    #[test]
    fn zero_suffix_length_degenerates_to_prior() {
        let mut table: SuffixTable<TagId> = SuffixTable::new(0);
        table.add_word("abc", 2, 3, 0);
        table.add_word("xyz", 3, 1, 0);
        // Only the empty suffix exists, so every word gets the unigram
        // distribution.
        let pa = table.log_probabilities("something", 1.0);
        let pb = table.log_probabilities("else", 1.0);
        assert_eq!(pa.len(), 2);
        assert!((pa[&2] - pb[&2]).abs() < 1e-12);
        assert!(pa[&2] > pa[&3]);
    }

    #[test]
    fn pruning_keeps_top_entries_sorted() {
        let mut table: SuffixTable<TagId> = SuffixTable::new(2);
        table.add_word("aa", 1, 8, 0);
        table.add_word("ba", 2, 4, 0);
        table.add_word("ca", 3, 2, 0);
        table.add_word("da", 4, 1, 0);
        let pruned = table.log_probabilities_pruned("za", 0.5, 2, 50.0);
        assert_eq!(pruned.len(), 2);
        assert!(pruned[0].1 >= pruned[1].1);
        assert_eq!(pruned[0].0, 1);
    }

    #[test]
    fn theta_of_uniform_distribution() {
        let apriori: AHashMap<TagId, f64> = [(1, 0.5), (2, 0.5)].into_iter().collect();
        // pav = 0.5, every term is 0.5 * 0 = 0.
        assert!(calculate_theta(&apriori).abs() < 1e-12);
    }
}
