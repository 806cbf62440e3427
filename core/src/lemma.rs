//! Lemma transformations and the lemma unigram model.
//!
//! A `LemmaTransform` is the structured diff between a word form and its
//! lemma: optionally flip the case of the first character, chop characters
//! off both ends, then glue new material on. The training side only ever
//! produces the suffix-shaped encoding (common prefix kept, differing tail
//! swapped), but `apply` honors all six attributes.

use std::cmp::min;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::config::UNKNOWN_VALUE;
use crate::corpus::Token;
use crate::vocab::{TagId, TagVocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseFlag {
    Identity,
    /// The word starts uppercase but its lemma starts lowercase
    /// (sentence-initial capitalization).
    LowerFirst,
    /// The word starts lowercase but its lemma starts uppercase.
    UpperFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LemmaTransform {
    remove_start: u32,
    remove_end: u32,
    add_start: String,
    add_end: String,
    case: CaseFlag,
    tag: TagId,
}

fn flip_first(s: &str, upper: bool) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => {
            let flipped: String = if upper {
                first.to_uppercase().collect()
            } else {
                first.to_lowercase().collect()
            };
            format!("{}{}", flipped, chars.as_str())
        }
        None => String::new(),
    }
}

impl LemmaTransform {
    /// Learn the suffix transformation turning `word` into `lemma`.
    pub fn new(word: &str, lemma: &str, tag: TagId) -> Self {
        let wchars: Vec<char> = word.chars().collect();
        let mut lchars: Vec<char> = lemma.chars().collect();

        let mut case = CaseFlag::Identity;
        let first_pair = (wchars.first().copied(), lchars.first().copied());
        if let (Some(w0), Some(l0)) = first_pair {
            if w0.is_uppercase() && l0.is_lowercase() {
                case = CaseFlag::LowerFirst;
                // Neutralize the case difference so it is not re-encoded
                // into the suffix diff.
                if let Some(u) = l0.to_uppercase().next() {
                    lchars[0] = u;
                }
            } else if w0.is_lowercase() && l0.is_uppercase() {
                case = CaseFlag::UpperFirst;
                if let Some(l) = l0.to_lowercase().next() {
                    lchars[0] = l;
                }
            }
        }

        let mut common = 0;
        while common < min(wchars.len(), lchars.len()) && wchars[common] == lchars[common] {
            common += 1;
        }

        Self {
            remove_start: 0,
            remove_end: (wchars.len() - common) as u32,
            add_start: String::new(),
            add_end: lchars[common..].iter().collect(),
            case,
            tag,
        }
    }

    pub fn tag(&self) -> TagId {
        self.tag
    }

    /// The shortest word suffix this transformation depends on.
    pub fn min_cut_length(&self) -> usize {
        self.remove_end as usize
    }

    /// Derive the lemma of `word`.
    pub fn apply(&self, word: &str) -> String {
        let chars: Vec<char> = word.chars().collect();
        let keep = chars.len().saturating_sub(self.remove_end as usize);
        let mut lemma: String = chars[..keep].iter().collect();
        lemma.push_str(&self.add_end);
        if self.remove_start > 0 {
            let lchars: Vec<char> = lemma.chars().collect();
            let skip = min(self.remove_start as usize, lchars.len());
            lemma = lchars[skip..].iter().collect();
        }
        if !self.add_start.is_empty() {
            lemma = format!("{}{}", self.add_start, lemma);
        }

        let word_first = word.chars().next();
        match self.case {
            CaseFlag::LowerFirst if word_first.map_or(false, |c| c.is_uppercase()) => {
                flip_first(&lemma, false)
            }
            CaseFlag::UpperFirst if word_first.map_or(false, |c| c.is_lowercase()) => {
                flip_first(&lemma, true)
            }
            _ => lemma,
        }
    }

    /// Materialize a full token from this transformation.
    pub fn decode(&self, word: &str, vocab: &TagVocabulary) -> Token {
        let tag = vocab.tag(self.tag).unwrap_or_default();
        Token::new(word, &self.apply(word), tag)
    }
}

/// Collapse a transformation distribution into lemma candidates: apply each
/// transformation to `word` and keep, per distinct result, the entry with
/// the highest log-probability.
pub fn batch_convert(
    probs: &AHashMap<LemmaTransform, f64>,
    word: &str,
    vocab: &TagVocabulary,
) -> AHashMap<Token, (LemmaTransform, f64)> {
    let mut out: AHashMap<Token, (LemmaTransform, f64)> = AHashMap::new();
    for (transform, &log_prob) in probs {
        let token = transform.decode(word, vocab);
        match out.get(&token) {
            Some(&(_, existing)) if existing >= log_prob => {}
            _ => {
                out.insert(token, (transform.clone(), log_prob));
            }
        }
    }
    out
}

/// Lemma frequencies over the training corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LemmaUnigramModel {
    counts: AHashMap<String, u64>,
    total: u64,
}

impl LemmaUnigramModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, lemma: &str, count: u64) {
        *self.counts.entry(lemma.to_string()).or_insert(0) += count;
        self.total += count;
    }

    pub fn count(&self, lemma: &str) -> u64 {
        self.counts.get(lemma).copied().unwrap_or(0)
    }

    pub fn log_prob(&self, lemma: &str) -> f64 {
        let count = self.count(lemma);
        if count == 0 || self.total == 0 {
            UNKNOWN_VALUE
        } else {
            (count as f64 / self.total as f64).ln()
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(word: &str, lemma: &str) {
        let t = LemmaTransform::new(word, lemma, 2);
        assert_eq!(t.apply(word), lemma, "{} -> {}", word, lemma);
    }

    #[test]
    fn roundtrips_plain_suffix_change() {
        roundtrip("walking", "walk");
        roundtrip("houses", "house");
        roundtrip("went", "go");
        roundtrip("alma", "alma");
    }

    #[test]
    fn roundtrips_case_changes() {
        // Sentence-initial capitalization.
        roundtrip("Houses", "house");
        // Lowercased proper noun.
        roundtrip("budapesti", "Budapest");
        roundtrip("Éves", "éves");
    }

    #[test]
    fn min_cut_is_removed_suffix_length() {
        let t = LemmaTransform::new("walking", "walk", 2);
        assert_eq!(t.min_cut_length(), 3);
        let id = LemmaTransform::new("alma", "alma", 2);
        assert_eq!(id.min_cut_length(), 0);
    }

    #[test]
    fn equality_covers_all_attributes() {
        let a = LemmaTransform::new("walking", "walk", 2);
        let b = LemmaTransform::new("talking", "talk", 2);
        // Same edit script from different words.
        assert_eq!(a, b);
        let c = LemmaTransform::new("walking", "walk", 3);
        assert_ne!(a, c);
    }

    #[test]
    fn case_flag_only_fires_on_matching_word_shape() {
        // Learned from a capitalized word; applying to an already
        // lowercase word must not lowercase anything further.
        let t = LemmaTransform::new("Houses", "house", 2);
        assert_eq!(t.apply("houses"), "house");
    }

    #[test]
    fn batch_convert_keeps_best_per_lemma() {
        let mut vocab = TagVocabulary::with_sentence_markers();
        let n = vocab.add("N");
        let mut probs = AHashMap::new();
        // Two distinct edit scripts that both turn "runs" into "run":
        // chop one char, or chop two and append "n".
        probs.insert(LemmaTransform::new("runs", "run", n), -2.0);
        probs.insert(LemmaTransform::new("aac", "an", n), -1.0);
        let out = batch_convert(&probs, "runs", &vocab);
        assert_eq!(out.len(), 1);
        let (token, (_, p)) = out.iter().next().unwrap();
        assert_eq!(token.lemma, "run");
        assert!((*p - -1.0).abs() < 1e-12);
    }

    #[test]
    fn unigram_log_probs() {
        let mut m = LemmaUnigramModel::new();
        m.add("alma", 3);
        m.add("fa", 1);
        assert!((m.log_prob("alma") - (0.75f64).ln()).abs() < 1e-12);
        assert_eq!(m.log_prob("nincs"), UNKNOWN_VALUE);
    }
}
