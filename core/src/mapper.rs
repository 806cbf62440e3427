//! Regex-based tag and lemma rewriting.
//!
//! A `TagMapper` bridges the gap between the tagset of an external
//! morphological analyzer and the tagset seen in training: when a lookup
//! hits a tag id that was added after the vocabulary was frozen, the tag
//! string is rewritten with the first matching pattern and, if the result
//! is a known tag, its id is used instead.

use regex::Regex;

use crate::vocab::{SharedVocab, TagId};

/// Applies the first matching `(pattern, replacement)` pair to a string.
#[derive(Debug, Clone)]
pub struct StringMapper {
    mappings: Vec<(Regex, String)>,
}

impl StringMapper {
    pub fn new(mappings: Vec<(Regex, String)>) -> Self {
        Self { mappings }
    }

    pub fn map(&self, value: &str) -> String {
        for (pattern, replacement) in &self.mappings {
            if pattern.is_match(value) {
                return pattern.replace_all(value, replacement.as_str()).into_owned();
            }
        }
        value.to_string()
    }
}

/// Maps unseen tag ids onto in-vocabulary ids via configured rewrites.
#[derive(Debug, Clone)]
pub struct TagMapper {
    vocab: SharedVocab,
    mappings: Vec<(Regex, String)>,
}

impl TagMapper {
    pub fn new(vocab: SharedVocab, mappings: Vec<(Regex, String)>) -> Self {
        Self { vocab, mappings }
    }

    /// Map one tag id. Ids at or below the training horizon pass through
    /// untouched; unseen ids are rewritten when a pattern matches the whole
    /// tag string and the rewritten form is a known tag.
    pub fn map(&self, tag: TagId) -> TagId {
        let vocab = self.vocab.borrow();
        if !vocab.is_unseen(tag) {
            return tag;
        }
        let Some(name) = vocab.tag(tag) else {
            return tag;
        };
        for (pattern, replacement) in &self.mappings {
            if !full_match(pattern, name) {
                continue;
            }
            let rewritten = pattern.replace_all(name, replacement.as_str());
            if let Some(id) = vocab.id(rewritten.as_ref()) {
                return id;
            }
        }
        tag
    }

    pub fn map_context(&self, context: &[TagId]) -> Vec<TagId> {
        context.iter().map(|&t| self.map(t)).collect()
    }

    /// Subset of `analysis_tags` whose mapped form occurs in
    /// `admissible_tags`.
    pub fn filter(&self, analysis_tags: &[TagId], admissible_tags: &[TagId]) -> Vec<TagId> {
        analysis_tags
            .iter()
            .copied()
            .filter(|&t| admissible_tags.contains(&self.map(t)))
            .collect()
    }
}

fn full_match(pattern: &Regex, value: &str) -> bool {
    pattern
        .find(value)
        .map(|m| m.start() == 0 && m.end() == value.len())
        .unwrap_or(false)
}
