//! Tag vocabulary: a dense bijection between tag strings and integer ids.
//!
//! Ids are assigned in insertion order and never recycled. Two ids are
//! reserved and inserted first: `BOS_ID` and `EOS_ID`, the sentence
//! boundary sentinels. After training the vocabulary is frozen by storing
//! `max_known_index`; ids added later (e.g. tags produced by a
//! morphological analyzer at inference time) compare greater than that
//! index and are treated as unknown by every probability lookup.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::config::{BOS_TAG, EOS_TAG};

pub type TagId = u32;

/// Id of the beginning-of-sentence sentinel tag.
pub const BOS_ID: TagId = 0;
/// Id of the end-of-sentence sentinel tag.
pub const EOS_ID: TagId = 1;

/// Shared, append-only vocabulary handle used during decoding.
///
/// Decoding may extend the vocabulary when the analyzer returns a tag that
/// was never seen in training. The crate is single-threaded, hence
/// `Rc<RefCell<..>>`; replace with `Arc<Mutex<..>>` if decoders ever share
/// one model across threads.
pub type SharedVocab = Rc<RefCell<TagVocabulary>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagVocabulary {
    by_name: AHashMap<String, TagId>,
    by_id: Vec<String>,
    max_known_index: Option<TagId>,
}

impl TagVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty vocabulary pre-seeded with the BOS and EOS sentinels at
    /// ids 0 and 1.
    pub fn with_sentence_markers() -> Self {
        let mut v = Self::new();
        v.add(BOS_TAG);
        v.add(EOS_TAG);
        v
    }

    /// Insert a tag, returning its id. Idempotent: an already known tag
    /// keeps its original id.
    pub fn add(&mut self, tag: &str) -> TagId {
        if let Some(&id) = self.by_name.get(tag) {
            return id;
        }
        let id = self.by_id.len() as TagId;
        self.by_name.insert(tag.to_string(), id);
        self.by_id.push(tag.to_string());
        id
    }

    pub fn id(&self, tag: &str) -> Option<TagId> {
        self.by_name.get(tag).copied()
    }

    pub fn tag(&self, id: TagId) -> Option<&str> {
        self.by_id.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Record the current highest id as the training horizon.
    pub fn freeze(&mut self) {
        if !self.by_id.is_empty() {
            self.max_known_index = Some(self.by_id.len() as TagId - 1);
        }
    }

    pub fn max_known_index(&self) -> Option<TagId> {
        self.max_known_index
    }

    /// True for ids introduced after `freeze()`.
    pub fn is_unseen(&self, id: TagId) -> bool {
        match self.max_known_index {
            Some(max) => id > max,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut v = TagVocabulary::with_sentence_markers();
        assert_eq!(v.id(BOS_TAG), Some(BOS_ID));
        assert_eq!(v.id(EOS_TAG), Some(EOS_ID));
        let n = v.add("N");
        let vb = v.add("V");
        assert_eq!(n, 2);
        assert_eq!(vb, 3);
        // idempotent add
        assert_eq!(v.add("N"), n);
        assert_eq!(v.len(), 4);
    }

    #[test]
    fn roundtrip_maps() {
        let mut v = TagVocabulary::with_sentence_markers();
        for tag in ["N", "V", "ADJ", "DET"] {
            v.add(tag);
        }
        for id in 0..v.len() as TagId {
            let s = v.tag(id).unwrap().to_string();
            assert_eq!(v.id(&s), Some(id));
        }
    }

    #[test]
    fn freeze_marks_later_ids_unseen() {
        let mut v = TagVocabulary::with_sentence_markers();
        v.add("N");
        v.freeze();
        assert!(!v.is_unseen(2));
        let late = v.add("X[late]");
        assert!(v.is_unseen(late));
    }
}
