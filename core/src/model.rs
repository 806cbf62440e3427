//! Trainable model container and its compiled, inference-ready form.
//!
//! `Model` accumulates raw counts from an analysed corpus and is the
//! on-disk artifact (bincode). `compile()` freezes the tag vocabulary,
//! turns the count tries into smoothed probability models, derives theta
//! and the suffix guessers, and attaches the configured tag mappers. After
//! compilation the model is read-only for decoding, except for the
//! append-only tag vocabulary.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::rc::Rc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::combiner::BiCombiner;
use crate::config::{Configuration, BOS_TAG, BOS_TOKEN, EOS_TOKEN};
use crate::corpus::{Document, Sentence, Token};
use crate::error::{Error, Result};
use crate::lemma::{LemmaTransform, LemmaUnigramModel};
use crate::lexicon::{FrozenLexicon, Lexicon};
use crate::mapper::{StringMapper, TagMapper};
use crate::ngram::NGramCounter;
use crate::prob::ProbModel;
use crate::spectoken::SpecTokenMatcher;
use crate::suffix::{calculate_theta, SuffixGuesser, SuffixTable};
use crate::vocab::{SharedVocab, TagId, TagVocabulary, EOS_ID};

/// Which items feed the word-suffix guessers at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RareFilter {
    /// Word forms whose total count is at most `rare_frequency`.
    WordFrequency,
    /// Word forms whose lemma's total count is at most `rare_frequency`.
    LemmaFrequency,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub sentences: u64,
    pub tokens: u64,
    pub lower_guesser_items: u64,
    pub upper_guesser_items: u64,
    pub skipped_sentences: u64,
    pub theta: Option<f64>,
}

impl Statistics {
    pub fn report(&self, distinct_tags: usize) -> String {
        format!(
            "Training corpus:\n\
             {} tokens\n\
             {} sentences\n\
             {} skipped sentences\n\
             {} different tags\n\
             \n\
             Guesser trained with\n\
             {} lowercase\n\
             {} uppercase tokens\n\
             theta {}",
            self.tokens,
            self.sentences,
            self.skipped_sentences,
            distinct_tags,
            self.lower_guesser_items,
            self.upper_guesser_items,
            self.theta
                .map(|t| format!("{:.6}", t))
                .unwrap_or_else(|| "-".to_string()),
        )
    }
}

/// Maximum suffix length of the lemma-transformation table; lemmas do not
/// get longer than this.
const LEMMA_SUFFIX_LENGTH: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub tag_order: usize,
    pub emission_order: usize,
    pub suffix_length: usize,
    pub rare_frequency: u32,
    pub rare_filter: RareFilter,

    tag_vocabulary: TagVocabulary,
    standard_tokens_lexicon: Lexicon,
    spec_tokens_lexicon: Lexicon,

    tag_transitions: NGramCounter<TagId>,
    standard_emissions: NGramCounter<String>,
    spec_emissions: NGramCounter<String>,

    lemma_suffix_tree: SuffixTable<LemmaTransform>,
    lemma_unigrams: LemmaUnigramModel,
    lemma_types: AHashMap<Token, u32>,
    word_lemmas: AHashMap<String, Vec<String>>,

    lower_suffix_tree: SuffixTable<TagId>,
    upper_suffix_tree: SuffixTable<TagId>,

    combiner: BiCombiner,
    stat: Statistics,
}

impl Model {
    pub fn new(
        tag_order: usize,
        emission_order: usize,
        suffix_length: usize,
        rare_frequency: u32,
    ) -> Self {
        Self {
            tag_order,
            emission_order,
            suffix_length,
            rare_frequency,
            rare_filter: RareFilter::WordFrequency,
            tag_vocabulary: TagVocabulary::with_sentence_markers(),
            standard_tokens_lexicon: Lexicon::new(),
            spec_tokens_lexicon: Lexicon::new(),
            tag_transitions: NGramCounter::new(tag_order + 1),
            standard_emissions: NGramCounter::new(emission_order + 1),
            spec_emissions: NGramCounter::new(2),
            lemma_suffix_tree: SuffixTable::new(LEMMA_SUFFIX_LENGTH),
            lemma_unigrams: LemmaUnigramModel::new(),
            lemma_types: AHashMap::new(),
            word_lemmas: AHashMap::new(),
            lower_suffix_tree: SuffixTable::new(suffix_length),
            upper_suffix_tree: SuffixTable::new(suffix_length),
            combiner: BiCombiner::default(),
            stat: Statistics::default(),
        }
    }

    pub fn stats(&self) -> &Statistics {
        &self.stat
    }

    pub fn record_skipped_sentences(&mut self, count: u64) {
        self.stat.skipped_sentences += count;
    }

    pub fn distinct_tags(&self) -> usize {
        self.tag_vocabulary.len()
    }

    pub fn vocabulary(&self) -> &TagVocabulary {
        &self.tag_vocabulary
    }

    /// Count the whole document into the model, then rebuild the suffix
    /// guessers and re-estimate the lemma combiner weights.
    pub fn train(&mut self, document: &Document, lemma_mapper: Option<&StringMapper>) {
        let matcher = SpecTokenMatcher::new();
        for sentence in document.sentences() {
            self.add_sentence(sentence, lemma_mapper, &matcher);
        }
        self.build_suffix_trees();

        let apriori = self.tag_transitions.apriori_probs();
        let theta = calculate_theta(&apriori);
        self.stat.theta = Some(theta);
        self.combiner = BiCombiner::learn(
            &self.lemma_types,
            &self.lemma_suffix_tree,
            theta,
            &self.lemma_unigrams,
            &self.tag_vocabulary,
        );
        info!(
            sentences = self.stat.sentences,
            tokens = self.stat.tokens,
            tags = self.tag_vocabulary.len(),
            "training pass finished"
        );
    }

    fn add_sentence(
        &mut self,
        sentence: &Sentence,
        lemma_mapper: Option<&StringMapper>,
        matcher: &SpecTokenMatcher,
    ) {
        self.stat.sentences += 1;

        let mut sent: Vec<Token> = Vec::with_capacity(sentence.len() + 1);
        sent.push(Token::new(BOS_TOKEN, "", BOS_TAG));
        for token in sentence {
            let lemma = match lemma_mapper {
                Some(m) => m.map(&token.lemma),
                None => token.lemma.clone(),
            };
            sent.push(Token::new(&token.word, &lemma, &token.tag));
        }

        // Tag ids are assigned walking the sentence right to left; the
        // resulting id order feeds the trie exactly like the counts do.
        let mut tags: Vec<TagId> = sent
            .iter()
            .rev()
            .map(|t| self.tag_vocabulary.add(&t.tag))
            .collect();
        tags.reverse();

        // The sentence-final transition emits the EOS sentinel.
        self.tag_transitions.add(&tags, EOS_ID);

        for i in (0..sent.len()).rev() {
            let token = &sent[i];
            if token.word == BOS_TOKEN || token.word == EOS_TOKEN {
                continue;
            }
            let tag = tags[i];
            let context = &tags[..=i];
            let prev_tags = &tags[..i];

            self.stat.tokens += 1;
            self.lemma_unigrams.add(&token.lemma, 1);
            let transform = LemmaTransform::new(&token.word, &token.lemma, tag);
            let min_cut = transform.min_cut_length();
            self.lemma_suffix_tree
                .add_word_skipping_hyphens(&token.word, transform, 1, min_cut);
            *self.lemma_types.entry(token.clone()).or_insert(0) += 1;
            let lemmas = self.word_lemmas.entry(token.word.clone()).or_default();
            if !lemmas.contains(&token.lemma) {
                lemmas.push(token.lemma.clone());
            }

            self.tag_transitions.add(prev_tags, tag);
            self.standard_tokens_lexicon.add_token(&token.word, tag);
            self.standard_emissions.add(context, token.word.clone());
            if let Some(class) = matcher.match_token(&token.word) {
                self.spec_emissions.add(context, class.to_string());
                self.spec_tokens_lexicon.add_token(class, tag);
            }
        }
    }

    /// Rebuild the case-split word-suffix tables from the rare entries of
    /// the standard lexicon.
    fn build_suffix_trees(&mut self) {
        let mut lower = SuffixTable::new(self.suffix_length);
        let mut upper = SuffixTable::new(self.suffix_length);
        let mut lower_items: u64 = 0;
        let mut upper_items: u64 = 0;

        for (word, tag_counts) in self.standard_tokens_lexicon.iter() {
            let rare = match self.rare_filter {
                RareFilter::WordFrequency => {
                    self.standard_tokens_lexicon.word_count(word) <= self.rare_frequency
                }
                RareFilter::LemmaFrequency => self
                    .word_lemmas
                    .get(word)
                    .map(|lemmas| {
                        lemmas
                            .iter()
                            .any(|l| self.lemma_unigrams.count(l) <= self.rare_frequency as u64)
                    })
                    .unwrap_or(false),
            };
            if !rare {
                continue;
            }
            let lower_word = word.to_lowercase();
            let is_lower = lower_word == *word;
            for (&tag, &count) in tag_counts {
                if is_lower {
                    lower.add_word(&lower_word, tag, count, 0);
                    lower_items += count as u64;
                } else {
                    upper.add_word(&lower_word, tag, count, 0);
                    upper_items += count as u64;
                }
            }
        }

        self.lower_suffix_tree = lower;
        self.upper_suffix_tree = upper;
        self.stat.lower_guesser_items = lower_items;
        self.stat.upper_guesser_items = upper_items;
    }

    /// Freeze into the inference-ready form.
    pub fn compile(self, conf: &Configuration) -> CompiledModel {
        let Model {
            tag_order,
            emission_order,
            mut tag_vocabulary,
            standard_tokens_lexicon,
            spec_tokens_lexicon,
            mut tag_transitions,
            mut standard_emissions,
            mut spec_emissions,
            lemma_suffix_tree,
            lemma_unigrams,
            lower_suffix_tree,
            upper_suffix_tree,
            combiner,
            ..
        } = self;

        tag_vocabulary.freeze();
        let vocab: SharedVocab = Rc::new(RefCell::new(tag_vocabulary));
        let mapper = TagMapper::new(vocab.clone(), conf.tag_mappings.clone());

        let apriori_tag_probs = tag_transitions.apriori_probs();
        let theta = calculate_theta(&apriori_tag_probs);

        let mut transition_model = tag_transitions.build_prob_model();
        transition_model.context_mapper = Some(mapper.clone());
        transition_model.element_mapper = Some(mapper.clone());
        let mut standard_emission_model = standard_emissions.build_prob_model();
        standard_emission_model.context_mapper = Some(mapper.clone());
        let mut spec_emission_model = spec_emissions.build_prob_model();
        spec_emission_model.context_mapper = Some(mapper.clone());

        let mut lower_guesser = SuffixGuesser::new(lower_suffix_tree, theta);
        lower_guesser.mapper = Some(mapper.clone());
        let mut upper_guesser = SuffixGuesser::new(upper_suffix_tree, theta);
        upper_guesser.mapper = Some(mapper);
        let lemma_guesser = SuffixGuesser::new(lemma_suffix_tree, theta);

        CompiledModel {
            tag_order,
            emission_order,
            vocab,
            standard_lexicon: FrozenLexicon::freeze(&standard_tokens_lexicon),
            spec_lexicon: FrozenLexicon::freeze(&spec_tokens_lexicon),
            tag_transitions: transition_model,
            standard_emissions: standard_emission_model,
            spec_emissions: spec_emission_model,
            apriori_tag_probs,
            theta,
            lower_guesser,
            upper_guesser,
            lemma_guesser,
            lemma_unigrams,
            combiner,
            spec_matcher: SpecTokenMatcher::new(),
            guessed_lemma_marker: conf.guessed_lemma_marker.clone(),
            suffix_model_weight: conf.suffix_model_weight,
            lemma_mapper: conf.lemma_mapper(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self).map_err(|e| Error::ModelLoad {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| Error::ModelLoad {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })?;
        let reader = BufReader::new(file);
        bincode::deserialize_from(reader).map_err(|e| Error::ModelLoad {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Inference-ready model, owned by one tagger.
#[derive(Debug)]
pub struct CompiledModel {
    pub tag_order: usize,
    pub emission_order: usize,
    pub vocab: SharedVocab,
    pub standard_lexicon: FrozenLexicon,
    pub spec_lexicon: FrozenLexicon,
    pub tag_transitions: ProbModel<TagId>,
    pub standard_emissions: ProbModel<String>,
    pub spec_emissions: ProbModel<String>,
    pub apriori_tag_probs: AHashMap<TagId, f64>,
    pub theta: f64,
    pub lower_guesser: SuffixGuesser<TagId>,
    pub upper_guesser: SuffixGuesser<TagId>,
    pub lemma_guesser: SuffixGuesser<LemmaTransform>,
    pub lemma_unigrams: LemmaUnigramModel,
    pub combiner: BiCombiner,
    pub spec_matcher: SpecTokenMatcher,
    pub guessed_lemma_marker: String,
    pub suffix_model_weight: Option<f64>,
    pub lemma_mapper: Option<StringMapper>,
}

impl CompiledModel {
    /// Natural log of the apriori probability of a known tag.
    pub fn apriori_log_prob(&self, tag: TagId) -> Option<f64> {
        self.apriori_tag_probs
            .get(&tag)
            .filter(|&&p| p > 0.0)
            .map(|p| p.ln())
    }
}
