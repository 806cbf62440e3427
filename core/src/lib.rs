//! morphtag-core
//!
//! Model, decoder and lemmatizer logic of the morphtag hybrid statistical
//! POS tagger. Training reads an analysed corpus of `word#lemma#tag`
//! triples into a second-order hidden Markov model with Brants-style
//! deleted-interpolation smoothing; tagging runs a beamed Viterbi decoder
//! that reconciles the trained lexicon, an external morphological
//! analyzer, special-token classes and a case-split suffix guesser, then
//! picks lemmas with a learned log-linear combiner.
//!
//! Public API:
//! - `Model` / `CompiledModel` - trainable container and its frozen form
//! - `MorphTagger` - line-oriented tagging front end
//! - `BeamedViterbi` - decoder over a compiled model
//! - `CorpusReader` / `Token` - analysed-corpus IO
//! - `Configuration` - run-time XML configuration
//! - `MorphAnalyzer` - external analyzer interface

pub mod analysis;
pub mod combiner;
pub mod config;
pub mod corpus;
pub mod decoder;
pub mod error;
pub mod lemma;
pub mod lexicon;
pub mod mapper;
pub mod model;
pub mod morph;
pub mod ngram;
pub mod prob;
pub mod spectoken;
pub mod suffix;
pub mod tagger;
pub mod trie;
pub mod vocab;

pub use analysis::{AnalysisQueue, OneWordLexicalModel};
pub use combiner::BiCombiner;
pub use config::{Configuration, InputSeparators};
pub use corpus::{CorpusReader, Document, Sentence, Token};
pub use decoder::{BeamedViterbi, NGram, PruneStrategy};
pub use error::{Error, Result};
pub use lemma::{LemmaTransform, LemmaUnigramModel};
pub use lexicon::{FrozenLexicon, Lexicon};
pub use mapper::{StringMapper, TagMapper};
pub use model::{CompiledModel, Model, RareFilter, Statistics};
pub use morph::{MorphAnalyzer, NullAnalyzer, TableAnalyzer};
pub use ngram::NGramCounter;
pub use prob::ProbModel;
pub use spectoken::SpecTokenMatcher;
pub use suffix::{calculate_theta, SuffixGuesser, SuffixTable};
pub use tagger::{MorphTagger, StemFilter};
pub use vocab::{TagId, TagVocabulary, BOS_ID, EOS_ID};

/// Utility helpers.
pub mod utils {
    /// NFC-normalize input text so char-based suffix arithmetic sees one
    /// code point per letter regardless of how the input was composed.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect()
    }
}
