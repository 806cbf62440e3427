//! Beamed Viterbi decoding over the compiled model.
//!
//! The trellis state is the sequence of the most recent `tag_order` tags;
//! the beam keeps the single best-weight node per state. For every input
//! token the decoder reconciles up to four evidence sources: the trained
//! lexicon, the external morphological analyzer, the special-token class,
//! and the suffix guesser, with per-position user analyses overriding all
//! of them. Pruning is a strategy choice made at construction time.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::rc::Rc;

use ahash::AHashMap;
use lru::LruCache;
use tracing::warn;

use crate::analysis::OneWordLexicalModel;
use crate::config::{
    EOS_EMISSION_PROB, EOS_TOKEN, SINGLE_EMISSION_PROB, UNKNOWN_TAG_WEIGHT, UNKNOWN_VALUE,
    UNK_TAG_TRANS,
};
use crate::model::CompiledModel;
use crate::morph::MorphAnalyzer;
use crate::vocab::{TagId, BOS_ID, EOS_ID};

/// Decoder state: the tag history of one partial path. Equality and
/// hashing only consider the last `compare_len` (= tag order) elements, so
/// paths that agree on their recent history collapse into one beam slot.
#[derive(Debug, Clone)]
pub struct NGram {
    tags: Vec<TagId>,
    compare_len: usize,
}

impl NGram {
    pub fn new(tags: Vec<TagId>, compare_len: usize) -> Self {
        Self { tags, compare_len }
    }

    pub fn add(&self, tag: TagId) -> Self {
        let mut tags = self.tags.clone();
        tags.push(tag);
        Self {
            tags,
            compare_len: self.compare_len,
        }
    }

    pub fn tags(&self) -> &[TagId] {
        &self.tags
    }

    pub fn last(&self) -> TagId {
        self.tags.last().copied().unwrap_or(BOS_ID)
    }

    fn suffix(&self) -> &[TagId] {
        let skip = self.tags.len().saturating_sub(self.compare_len);
        &self.tags[skip..]
    }
}

impl PartialEq for NGram {
    fn eq(&self, other: &Self) -> bool {
        self.suffix() == other.suffix()
    }
}

impl Eq for NGram {}

impl Hash for NGram {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for tag in self.suffix() {
            tag.hash(state);
        }
    }
}

#[derive(Debug)]
struct Node {
    state: NGram,
    weight: f64,
    prev: Option<Rc<Node>>,
}

/// Beam pruning policy.
#[derive(Debug, Clone, Copy)]
pub enum PruneStrategy {
    /// Drop states more than `log_theta` below the best one.
    Threshold(f64),
    /// Keep the best `n` states.
    FixedBeam(usize),
}

enum Emitter<'a> {
    /// End-of-sentence pseudo token: transition-only.
    Eos,
    /// Exactly one admissible tag: emission is certain.
    Single,
    /// Known word form scored by an emission trie.
    Seen {
        model: &'a crate::prob::ProbModel<String>,
        word_form: String,
    },
    /// User-supplied analysis with probabilities.
    User {
        model: &'a OneWordLexicalModel,
        word_form: String,
    },
    /// Unknown word with analyzer-proposed tags: suffix guesser score,
    /// normalized by the tag prior.
    GuessedVoc { upper: bool, lword: String },
    /// Fully out-of-vocabulary word: pruned guesser distribution (the
    /// candidate payload carries the guesser log-prob).
    GuessedOov,
}

struct NextProbs<'a> {
    default_trans: f64,
    candidates: Vec<(TagId, f64)>,
    emitter: Emitter<'a>,
}

pub struct BeamedViterbi<'a> {
    model: &'a CompiledModel,
    analyzer: &'a dyn MorphAnalyzer,
    suf_theta: f64,
    max_guessed: usize,
    prune: PruneStrategy,
    // The suffix walk is the hot path on unknown-word-heavy input; the
    // pruned distribution only depends on the cased word form.
    oov_cache: RefCell<LruCache<(bool, String), Rc<Vec<(TagId, f64)>>>>,
}

const OOV_CACHE_SIZE: usize = 4096;

impl<'a> BeamedViterbi<'a> {
    pub fn new(
        model: &'a CompiledModel,
        analyzer: &'a dyn MorphAnalyzer,
        log_theta: f64,
        suf_theta: f64,
        max_guessed: usize,
        beam_size: Option<usize>,
    ) -> Self {
        let prune = match beam_size {
            Some(n) => PruneStrategy::FixedBeam(n.max(1)),
            None => PruneStrategy::Threshold(log_theta),
        };
        Self {
            model,
            analyzer,
            suf_theta,
            max_guessed,
            prune,
            oov_cache: RefCell::new(LruCache::new(
                NonZeroUsize::new(OOV_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Best tag sequences for one sentence, ordered by descending
    /// log-weight. Each sequence is as long as the input.
    pub fn decode(
        &self,
        words: &[String],
        max_results: usize,
        user_anals: &[Option<OneWordLexicalModel>],
    ) -> Vec<(Vec<TagId>, f64)> {
        if words.is_empty() {
            return Vec::new();
        }

        let start = NGram::new(vec![BOS_ID; self.model.tag_order], self.model.tag_order);
        let mut beam: AHashMap<NGram, Rc<Node>> = AHashMap::new();
        beam.insert(
            start.clone(),
            Rc::new(Node {
                state: start,
                weight: 0.0,
                prev: None,
            }),
        );

        for pos in 0..=words.len() {
            let word: &str = if pos < words.len() {
                &words[pos]
            } else {
                EOS_TOKEN
            };
            let next = self.next_probs(word, pos, user_anals);
            let mut new_beam: AHashMap<NGram, Rc<Node>> = AHashMap::new();
            for (context, node) in &beam {
                for &(tag, payload) in &next.candidates {
                    let trans = self.model.tag_transitions.log_prob_or(
                        context.tags(),
                        tag,
                        next.default_trans,
                    );
                    let emit = self.emission(&next.emitter, tag, payload, context.tags());
                    let weight = node.weight + trans + emit;
                    let state = context.add(tag);
                    match new_beam.get(&state) {
                        Some(existing) if existing.weight >= weight => {}
                        _ => {
                            new_beam.insert(
                                state.clone(),
                                Rc::new(Node {
                                    state,
                                    weight,
                                    prev: Some(node.clone()),
                                }),
                            );
                        }
                    }
                }
            }
            beam = self.prune_beam(new_beam);
        }

        let mut nodes: Vec<Rc<Node>> = beam.into_values().collect();
        nodes.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));
        nodes.truncate(max_results);
        nodes
            .into_iter()
            .map(|node| {
                let mut seq = decompose(&node);
                // Drop the tag of the appended end-of-sentence position.
                seq.pop();
                (seq, node.weight)
            })
            .collect()
    }

    fn prune_beam(&self, beam: AHashMap<NGram, Rc<Node>>) -> AHashMap<NGram, Rc<Node>> {
        match self.prune {
            PruneStrategy::Threshold(log_theta) => {
                let max_w = beam
                    .values()
                    .map(|n| n.weight)
                    .fold(f64::NEG_INFINITY, f64::max);
                beam.into_iter()
                    .filter(|(_, n)| n.weight >= max_w - log_theta)
                    .collect()
            }
            PruneStrategy::FixedBeam(size) => {
                let mut nodes: Vec<(NGram, Rc<Node>)> = beam.into_iter().collect();
                nodes.sort_by(|a, b| {
                    b.1.weight
                        .partial_cmp(&a.1.weight)
                        .unwrap_or(Ordering::Equal)
                });
                nodes.truncate(size);
                nodes.into_iter().collect()
            }
        }
    }

    /// Classify one token and produce its candidate tags together with the
    /// matching emission computation.
    fn next_probs<'s>(
        &'s self,
        word: &str,
        pos: usize,
        user_anals: &'s [Option<OneWordLexicalModel>],
    ) -> NextProbs<'s> {
        if word == EOS_TOKEN {
            return NextProbs {
                default_trans: 0.0,
                candidates: vec![(EOS_ID, 0.0)],
                emitter: Emitter::Eos,
            };
        }

        let lword = word.to_lowercase();
        let mut isupper = lword != word;
        let mut word_form = word.to_string();
        let mut use_spec_model = false;

        let morph_tags: Vec<TagId> = {
            let analyses = self.analyzer.tags(word);
            let mut vocab = self.model.vocab.borrow_mut();
            analyses.iter().map(|t| vocab.add(t)).collect()
        };

        let mut tags = self.model.standard_lexicon.tags(word);
        let mut seen = !tags.is_empty();
        if !seen {
            let lower_tags = self.model.standard_lexicon.tags(&lword);
            if pos == 0 && isupper && !lower_tags.is_empty() {
                // Sentence-initial capitalization of a word only seen in
                // lowercase.
                word_form = lword.clone();
                isupper = false;
                seen = true;
                tags = lower_tags;
            } else if let Some(class) = self.model.spec_matcher.match_token(word) {
                use_spec_model = true;
                tags = self.model.spec_lexicon.tags(class);
                word_form = class.to_string();
                if !tags.is_empty() {
                    seen = true;
                } else {
                    warn!(
                        "'{}' is identified as special token ({}), but not seen in the \
                         training set; using guesser",
                        word, class
                    );
                }
            }
        }

        if let Some(user) = user_anals.get(pos).and_then(Option::as_ref) {
            let user_tags = user.word_tags();
            if user.use_probabilities {
                return NextProbs {
                    default_trans: UNK_TAG_TRANS,
                    candidates: with_zero_payload(user_tags),
                    emitter: Emitter::User {
                        model: user,
                        word_form,
                    },
                };
            }
            if seen {
                // User tags override the lexicon entry, no morphology
                // filtering.
                let model = if use_spec_model {
                    &self.model.spec_emissions
                } else {
                    &self.model.standard_emissions
                };
                return NextProbs {
                    default_trans: UNK_TAG_TRANS,
                    candidates: with_zero_payload(user_tags),
                    emitter: Emitter::Seen { model, word_form },
                };
            }
            return self.guessed_probs(user_tags, isupper, lword);
        }

        if seen {
            let model = if use_spec_model {
                &self.model.spec_emissions
            } else {
                &self.model.standard_emissions
            };
            let tags = self.filter_with_morphology(tags, &morph_tags, model);
            return NextProbs {
                default_trans: UNK_TAG_TRANS,
                candidates: with_zero_payload(tags),
                emitter: Emitter::Seen { model, word_form },
            };
        }
        if !morph_tags.is_empty() {
            return self.guessed_probs(morph_tags, isupper, lword);
        }

        // Fully out of vocabulary: the guesser always produces a
        // distribution, from the empty-suffix row at worst.
        let key = (isupper, lword.clone());
        let pruned = {
            let mut cache = self.oov_cache.borrow_mut();
            let cached = cache.get(&key).cloned();
            match cached {
                Some(hit) => hit,
                None => {
                    let guesser = if isupper {
                        &self.model.upper_guesser
                    } else {
                        &self.model.lower_guesser
                    };
                    let computed = Rc::new(guesser.tag_log_probabilities_pruned(
                        &lword,
                        self.max_guessed,
                        self.suf_theta,
                    ));
                    cache.put(key, computed.clone());
                    computed
                }
            }
        };
        NextProbs {
            default_trans: UNK_TAG_TRANS,
            candidates: pruned.as_ref().clone(),
            emitter: Emitter::GuessedOov,
        }
    }

    fn guessed_probs<'s>(&'s self, tags: Vec<TagId>, upper: bool, lword: String) -> NextProbs<'s> {
        if tags.len() == 1 {
            // A single admissible tag is taken as certain; even an unseen
            // transition costs nothing.
            return NextProbs {
                default_trans: 0.0,
                candidates: with_zero_payload(tags),
                emitter: Emitter::Single,
            };
        }
        NextProbs {
            default_trans: UNK_TAG_TRANS,
            candidates: with_zero_payload(tags),
            emitter: Emitter::GuessedVoc { upper, lword },
        }
    }

    fn filter_with_morphology(
        &self,
        tags: Vec<TagId>,
        morph_tags: &[TagId],
        model: &crate::prob::ProbModel<String>,
    ) -> Vec<TagId> {
        if morph_tags.is_empty() {
            return tags;
        }
        let common: Vec<TagId> = match &model.context_mapper {
            Some(mapper) => mapper.filter(morph_tags, &tags),
            None => morph_tags
                .iter()
                .copied()
                .filter(|t| tags.contains(t))
                .collect(),
        };
        if common.is_empty() {
            tags
        } else {
            common
        }
    }

    fn emission(&self, emitter: &Emitter<'_>, tag: TagId, payload: f64, context: &[TagId]) -> f64 {
        match emitter {
            Emitter::Eos => EOS_EMISSION_PROB,
            Emitter::Single => SINGLE_EMISSION_PROB,
            Emitter::Seen { model, word_form } => {
                let mut ctx = context.to_vec();
                ctx.push(tag);
                model.log_prob(&ctx, word_form)
            }
            Emitter::User { model, word_form } => {
                let mut ctx = context.to_vec();
                ctx.push(tag);
                model.log_prob(&ctx, word_form, UNKNOWN_VALUE)
            }
            Emitter::GuessedVoc { upper, lword } => {
                let guesser = if *upper {
                    &self.model.upper_guesser
                } else {
                    &self.model.lower_guesser
                };
                let mapped = guesser.map_tag(tag);
                if self.model.vocab.borrow().is_unseen(mapped) {
                    return UNKNOWN_TAG_WEIGHT;
                }
                let Some(apriori) = self.model.apriori_log_prob(mapped) else {
                    return UNKNOWN_TAG_WEIGHT;
                };
                let guessed = guesser.tag_log_probability(lword, tag);
                if guessed == UNKNOWN_VALUE {
                    UNKNOWN_TAG_WEIGHT
                } else {
                    guessed - apriori
                }
            }
            Emitter::GuessedOov => match self.model.apriori_log_prob(tag) {
                Some(apriori) => payload - apriori,
                None => UNKNOWN_TAG_WEIGHT,
            },
        }
    }
}

fn with_zero_payload(tags: Vec<TagId>) -> Vec<(TagId, f64)> {
    tags.into_iter().map(|t| (t, 0.0)).collect()
}

fn decompose(node: &Rc<Node>) -> Vec<TagId> {
    let mut seq = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        // The start node carries no emitted tag.
        if n.prev.is_some() {
            seq.push(n.state.last());
        }
        current = n.prev.as_ref();
    }
    seq.reverse();
    seq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::corpus::CorpusReader;
    use crate::model::Model;
    use crate::morph::NullAnalyzer;

    fn compiled(corpus: &str) -> CompiledModel {
        let reader = CorpusReader::new("#", "\n");
        let (doc, _) = reader.read(corpus);
        let mut model = Model::new(2, 2, 10, 10);
        model.train(&doc, None);
        model.compile(&Configuration::default())
    }

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn tag_names(model: &CompiledModel, seq: &[TagId]) -> Vec<String> {
        let vocab = model.vocab.borrow();
        seq.iter()
            .map(|&t| vocab.tag(t).unwrap_or("?").to_string())
            .collect()
    }

    #[test]
    fn ngram_equality_ignores_old_history() {
        let a = NGram::new(vec![9, 1, 2], 2);
        let b = NGram::new(vec![7, 1, 2], 2);
        assert_eq!(a, b);
        let c = NGram::new(vec![9, 3, 2], 2);
        assert_ne!(a, c);
        assert_eq!(a.add(5).last(), 5);
    }

    #[test]
    fn empty_sentence_decodes_to_nothing() {
        let model = compiled("A#a#X\n");
        let decoder = BeamedViterbi::new(&model, &NullAnalyzer, 1000f64.ln(), 10f64.ln(), 10, None);
        assert!(decoder.decode(&[], 1, &[]).is_empty());
    }

    #[test]
    fn seen_sentence_gets_its_training_tags() {
        let model = compiled(
            "A#a#X B#b#Y C#c#Z\n\
             A#a#X D#d#W\n\
             B#b#Y C#c#Z\n",
        );
        let decoder = BeamedViterbi::new(&model, &NullAnalyzer, 1000f64.ln(), 10f64.ln(), 10, None);
        let input = words("A B C");
        let results = decoder.decode(&input, 1, &vec![None; 3]);
        assert_eq!(results.len(), 1);
        let (seq, _weight) = &results[0];
        assert_eq!(seq.len(), 3);
        assert_eq!(tag_names(&model, seq), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn results_are_sorted_and_sized() {
        let model = compiled(
            "a#a#X b#b#Y\n\
             a#a#Y b#b#X\n\
             a#a#X b#b#X\n",
        );
        let decoder = BeamedViterbi::new(&model, &NullAnalyzer, 1000f64.ln(), 10f64.ln(), 10, None);
        let input = words("a b");
        let results = decoder.decode(&input, 3, &vec![None; 2]);
        assert!(results.len() >= 2);
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        for (seq, _) in &results {
            assert_eq!(seq.len(), 2);
        }
    }

    #[test]
    fn unknown_word_is_guessed_from_suffix() {
        let model = compiled(
            "foo#foo#N bar#bar#N bars#bar#N\n\
             foo#foo#N\n",
        );
        let decoder = BeamedViterbi::new(&model, &NullAnalyzer, 1000f64.ln(), 10f64.ln(), 10, None);
        let input = words("cars");
        let results = decoder.decode(&input, 1, &vec![None; 1]);
        assert_eq!(tag_names(&model, &results[0].0), vec!["N"]);
    }

    #[test]
    fn special_token_class_is_used_for_unseen_numbers() {
        let model = compiled("1998#1998#NUM jött#jön#V\n2000#2000#NUM ment#megy#V\n");
        let decoder = BeamedViterbi::new(&model, &NullAnalyzer, 1000f64.ln(), 10f64.ln(), 10, None);
        let input = words("1999");
        let results = decoder.decode(&input, 1, &vec![None; 1]);
        assert_eq!(tag_names(&model, &results[0].0), vec!["NUM"]);
    }

    #[test]
    fn fixed_beam_never_grows_past_its_size() {
        let model = compiled(
            "a#a#X b#b#Y\n\
             a#a#Y b#b#X\n\
             a#a#Z b#b#Z\n",
        );
        let decoder = BeamedViterbi::new(&model, &NullAnalyzer, 1000f64.ln(), 10f64.ln(), 10, Some(2));
        let input = words("a b");
        // With beam size 2 at most two survivors remain per position, so
        // at most two full sequences can come back.
        let results = decoder.decode(&input, 10, &vec![None; 2]);
        assert!(results.len() <= 2);
    }

    #[test]
    fn user_analysis_with_probabilities_overrides_model() {
        let model = compiled(
            "dog#dog#N runs#run#V\n\
             cat#cat#N runs#run#V\n\
             flux#fluere#V\n",
        );
        let mut vocab = model.vocab.borrow_mut();
        let queue = crate::analysis::AnalysisQueue::default();
        let user = queue
            .parse("flux{{fluxus[N]$$0.7||fluere[V]$$0.3}}", &mut vocab)
            .unwrap();
        drop(vocab);
        let decoder = BeamedViterbi::new(&model, &NullAnalyzer, 1000f64.ln(), 10f64.ln(), 10, None);
        let input = words("flux");
        let results = decoder.decode(&input, 1, &[Some(user)]);
        // The higher user probability wins although training only ever saw V.
        assert_eq!(tag_names(&model, &results[0].0), vec!["N"]);
    }

    #[test]
    fn first_word_capitalization_falls_back_to_lowercase_entry() {
        let model = compiled(
            "alma#alma#N esik#esik#V\n\
             alma#alma#N\n",
        );
        let decoder = BeamedViterbi::new(&model, &NullAnalyzer, 1000f64.ln(), 10f64.ln(), 10, None);
        let input = words("Alma esik");
        let results = decoder.decode(&input, 1, &vec![None; 2]);
        assert_eq!(tag_names(&model, &results[0].0), vec!["N", "V"]);
    }
}
